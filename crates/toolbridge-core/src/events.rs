//! Bridge lifecycle events.
//!
//! Events are emitted through the [`crate::ports::BridgeEventEmitter`] port;
//! transports (channels, SSE, UI) live in adapter crates.

use serde::{Deserialize, Serialize};

use crate::domain::InstallMode;

/// Something observable happened to a managed server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeEvent {
    /// A server was installed (either mode).
    ServerInstalled {
        /// Server name.
        name: String,
        /// Installation mode.
        mode: InstallMode,
    },
    /// A bridge-mode server started and its tools were discovered.
    ServerStarted {
        /// Server name.
        name: String,
        /// Number of tools the child advertised.
        tool_count: usize,
    },
    /// A bridge-mode server was stopped.
    ServerStopped {
        /// Server name.
        name: String,
    },
    /// A server was removed (either mode).
    ServerRemoved {
        /// Server name.
        name: String,
    },
    /// A lifecycle operation failed.
    ServerError {
        /// Server name.
        name: String,
        /// User-safe error message.
        message: String,
    },
}

impl BridgeEvent {
    /// A server was installed.
    pub fn installed(name: impl Into<String>, mode: InstallMode) -> Self {
        Self::ServerInstalled {
            name: name.into(),
            mode,
        }
    }

    /// A server started.
    pub fn started(name: impl Into<String>, tool_count: usize) -> Self {
        Self::ServerStarted {
            name: name.into(),
            tool_count,
        }
    }

    /// A server stopped.
    pub fn stopped(name: impl Into<String>) -> Self {
        Self::ServerStopped { name: name.into() }
    }

    /// A server was removed.
    pub fn removed(name: impl Into<String>) -> Self {
        Self::ServerRemoved { name: name.into() }
    }

    /// A lifecycle operation failed.
    pub fn error(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ServerError {
            name: name.into(),
            message: message.into(),
        }
    }
}
