//! Port definitions (trait abstractions) for external systems.
//!
//! Ports define the interfaces the bridge core expects from infrastructure.
//! They contain no implementation details and use only domain types.
//!
//! # Design Rules
//!
//! - No process/filesystem implementation details in any signature
//! - Connector methods express intent (connect, list, call), not transport
//! - The front-facing server boundary is registration-only: there is no
//!   unregister primitive to mirror, because the underlying SDKs do not
//!   offer one

pub mod connector;
pub mod event_emitter;
pub mod frontend;

pub use connector::{ConnectionError, ServerConnection, ServerConnector};
pub use event_emitter::{BridgeEventEmitter, NoopEmitter};
pub use frontend::{NoopFrontend, ToolFrontend, ToolFuture, ToolHandler, ToolRegistration};
