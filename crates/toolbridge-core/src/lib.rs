//! Core domain types and port definitions for toolbridge.
//!
//! This crate holds the pure domain model of the bridge (managed server
//! descriptions, tool shapes, lifecycle status) and the port traits the
//! adapter crates implement. It contains no process spawning, no filesystem
//! access beyond types, and no protocol plumbing.

#![deny(unsafe_code)]

pub mod domain;
pub mod events;
pub mod ports;

// Re-export commonly used types for convenience
pub use domain::{
    InstallMode, ManagedServerSpec, ServerHealth, ServerOrigin, ServerStatus, ToolContent,
    ToolDescriptor, ToolResponse,
};
pub use events::BridgeEvent;
pub use ports::{
    BridgeEventEmitter, ConnectionError, NoopEmitter, NoopFrontend, ServerConnection,
    ServerConnector, ToolFrontend, ToolFuture, ToolHandler, ToolRegistration,
};
