//! Child-server connection ports.
//!
//! A [`ServerConnector`] turns an immutable server spec into a live
//! [`ServerConnection`] (the opaque handle of the data model). The registry
//! owns connections exclusively and tears them down on stop/restart/remove.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::domain::{ManagedServerSpec, ToolDescriptor, ToolResponse};

/// Errors crossing the child-server transport boundary.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The child process or container failed to launch.
    #[error("failed to launch server: {0}")]
    Launch(String),

    /// I/O failure on the transport.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Payload could not be serialized or parsed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The child violated the request/response protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// No response within the configured deadline.
    #[error("timed out waiting for server response")]
    Timeout,

    /// The child returned a protocol-level error object.
    #[error("server returned error: code={code}, message={message}")]
    Remote {
        /// Protocol error code.
        code: i64,
        /// Protocol error message.
        message: String,
    },

    /// Operation requires a live session and there is none.
    #[error("server not connected")]
    NotConnected,
}

/// A live session with one child server.
///
/// Exists only while the owning registry entry is `Running`. Dropping or
/// shutting down the connection ends the session; for process-transport
/// children it also reaps the child.
#[async_trait]
pub trait ServerConnection: std::fmt::Debug + Send + Sync {
    /// Ask the child for its current tool list.
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ConnectionError>;

    /// Invoke a tool by its unprefixed name.
    async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<ToolResponse, ConnectionError>;

    /// Tear down the transport and reap any child process.
    async fn shutdown(&mut self);
}

/// Factory for child-server connections.
///
/// The production implementation spawns the spec's launch command (stdio
/// transport) or dials its endpoint (HTTP transport). Tests inject fakes
/// with controllable delays and tool sets.
#[async_trait]
pub trait ServerConnector: Send + Sync {
    /// Establish a session: launch/dial, perform the protocol handshake.
    async fn connect(
        &self,
        spec: &ManagedServerSpec,
    ) -> Result<Box<dyn ServerConnection>, ConnectionError>;
}
