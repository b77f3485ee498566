//! Managed server domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where a managed server's code comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerOrigin {
    /// A prebuilt container image, run as-is.
    ContainerImage,
    /// An npm package, installed into a sandbox container at start.
    NpmPackage,
}

/// How a server is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallMode {
    /// toolbridge supervises the child process and proxies its tools
    /// through the front-facing protocol server.
    Bridge,
    /// The external client launches and owns the child itself; toolbridge
    /// only edits the client's persisted configuration.
    Direct,
}

/// Runtime status of a managed server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    /// Added to the registry but never successfully started.
    #[default]
    Installing,
    /// Live session established, tools discovered.
    Running,
    /// Session torn down; last-known tool list retained for display.
    Stopped,
    /// Launch or handshake failed; entry kept for diagnosis.
    Error,
    /// Terminal. The name may be reused by a later install.
    Removed,
}

impl ServerStatus {
    /// Whether a start is permitted from this status.
    pub const fn can_start(self) -> bool {
        matches!(self, Self::Installing | Self::Stopped)
    }
}

/// Immutable install-time description of a bridge-mode server.
///
/// The launch command is built once at install time and never mutated;
/// changing it requires a reinstall. The environment map may contain
/// secrets and must not be logged wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedServerSpec {
    /// Globally unique key chosen by the operator at install time.
    pub name: String,

    /// Where the server's code comes from.
    pub origin: ServerOrigin,

    /// Full argv used to launch the child (first element is the program).
    pub launch_command: Vec<String>,

    /// Environment passed to the child. A `BTreeMap` keeps iteration
    /// key-sorted so derived command lines are deterministic.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// Network address, present only for network-transport children.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// When the server was installed.
    pub installed_at: DateTime<Utc>,
}

impl ManagedServerSpec {
    /// Create a spec for a server launched from an argv.
    pub fn new(name: impl Into<String>, origin: ServerOrigin, launch_command: Vec<String>) -> Self {
        Self {
            name: name.into(),
            origin,
            launch_command,
            env: BTreeMap::new(),
            endpoint: None,
            installed_at: Utc::now(),
        }
    }

    /// Replace the environment map.
    #[must_use]
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Add a single environment variable.
    #[must_use]
    pub fn with_env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the network endpoint for an HTTP-transport child.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// The program (argv\[0\]) of the launch command, if any.
    pub fn program(&self) -> Option<&str> {
        self.launch_command.first().map(String::as_str)
    }
}

/// Point-in-time health of a managed server. No side effects to produce.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerHealth {
    /// Current lifecycle status.
    pub status: ServerStatus,
    /// Number of tools last advertised by the child.
    pub tool_count: usize,
    /// Most recent launch or runtime error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}
