//! Access to the external client's persisted server configuration.
//!
//! The direct-mode client owns this JSON document and its schema; toolbridge
//! only reads, appends, updates, or deletes entries, always through a full
//! read-modify-write cycle so unrelated keys written by the client survive
//! our edits. No cross-process locking is assumed available.

#![deny(unsafe_code)]

pub mod paths;
pub mod store;

pub use paths::{HOST_CONFIG_ENV, discover_host_config_path};
pub use store::{
    ConfigStoreError, HostConfigDocument, HostConfigStore, HostServerEntry, ValidationReport,
};
