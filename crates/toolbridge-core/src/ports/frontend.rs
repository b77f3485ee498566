//! Front-facing protocol server boundary.
//!
//! The bridge registers namespaced tool handlers on a single front-facing
//! server shared by every bridged child. The boundary is registration-only:
//! protocol-server SDKs offer no supported unregister primitive, so a
//! registration outlives its backing server. Handlers must therefore consult
//! live state on every invocation and fail cleanly once their server is gone.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::domain::ToolResponse;

/// Future returned by a tool handler.
pub type ToolFuture = Pin<Box<dyn Future<Output = ToolResponse> + Send>>;

/// Handler invoked by the front-facing server with the caller's arguments.
///
/// Must never panic or return a transport error: failures are expressed as
/// error-shaped [`ToolResponse`] values.
pub type ToolHandler = Arc<dyn Fn(Value) -> ToolFuture + Send + Sync>;

/// A tool registration handed to the front-facing server.
#[derive(Clone)]
pub struct ToolRegistration {
    /// Namespaced tool name (`{server}_{tool}`).
    pub name: String,
    /// Human-readable description.
    pub description: Option<String>,
    /// JSON Schema for input parameters.
    pub input_schema: Option<Value>,
    /// Invocation handler.
    pub handler: ToolHandler,
}

impl fmt::Debug for ToolRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistration")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .finish_non_exhaustive()
    }
}

/// The single front-facing protocol server.
pub trait ToolFrontend: Send + Sync {
    /// Register a named tool handler.
    ///
    /// Registration is permanent for the life of the front server; callers
    /// that stop routing to a handler must make the handler itself fail
    /// cleanly instead of expecting removal.
    fn register_tool(&self, registration: ToolRegistration);
}

/// A front server that discards registrations.
///
/// Suitable for tests and for contexts (config-only runs) where no
/// front-facing server is attached.
#[derive(Debug, Clone, Default)]
pub struct NoopFrontend;

impl NoopFrontend {
    /// Create a new no-op frontend.
    pub const fn new() -> Self {
        Self
    }
}

impl ToolFrontend for NoopFrontend {
    fn register_tool(&self, _registration: ToolRegistration) {
        // Intentionally do nothing
    }
}
