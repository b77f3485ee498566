//! MCP bridge core.
//!
//! Supervises an arbitrary number of child tool servers (local processes or
//! containers) and exposes their tools through one front-facing protocol
//! server under namespaced names.
//!
//! - [`client`] - JSON-RPC 2.0 client for child servers (stdio and HTTP)
//! - [`registry`] - authoritative table of bridge-mode servers and their
//!   lifecycle state machine
//! - [`tool_registry`] - binds discovered tools onto the front-facing
//!   server and routes invocations back to the owning child
//! - [`installer`] - the use-case layer resolving install requests into
//!   bridge or direct mode

#![deny(unsafe_code)]

pub mod client;
pub mod installer;
pub mod registry;
pub mod tool_registry;

// Re-export domain types from core for convenience
pub use toolbridge_core::{
    BridgeEvent, InstallMode, ManagedServerSpec, ServerHealth, ServerOrigin, ServerStatus,
    ToolDescriptor, ToolResponse,
};

// Re-export this crate's public types
pub use client::BridgeConnector;
pub use installer::{InstallError, InstallReport, InstallRequest, Installer};
pub use registry::{ManagedServerRegistry, RegistryError, ServerSnapshot};
pub use tool_registry::{DynamicToolRegistry, ToolRegistryStats, namespaced_tool_name};
