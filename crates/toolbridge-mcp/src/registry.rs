//! Managed server lifecycle registry.
//!
//! Owns the authoritative in-memory table of all bridge-mode servers:
//! identity, lifecycle status, the live connection handle, and the tools
//! the child last advertised.
//!
//! State machine per name:
//!
//! ```text
//!  (none) --add--> installing --start ok--> running
//!  installing --start fail--> error
//!  running --stop--> stopped ; stopped --start--> running
//!  running --restart--> running (tools refreshed)
//!  any non-removed --remove--> removed (terminal; name reusable)
//! ```
//!
//! Operations on a single name are serialized through a per-entry mutex;
//! operations on different names run fully concurrently. A slow child must
//! never block work on unrelated servers.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

use toolbridge_core::{
    BridgeEvent, BridgeEventEmitter, ConnectionError, ManagedServerSpec, ServerConnection,
    ServerConnector, ServerHealth, ServerStatus, ToolDescriptor, ToolResponse,
};

/// Errors from registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The name is already taken by a non-removed entry.
    #[error("server name already in use: {0}")]
    DuplicateName(String),

    /// No entry under this name.
    #[error("unknown server: {0}")]
    NotFound(String),

    /// The operation requires a live session.
    #[error("server not running: {0}")]
    NotRunning(String),

    /// Start requested on a server that is already running.
    #[error("server already running: {0}")]
    AlreadyRunning(String),

    /// Start requested on a faulted entry; it stays in the registry for
    /// diagnosis and must be removed before the name is used again.
    #[error("server {0} is in error state; remove it and reinstall")]
    Faulted(String),

    /// The child failed to launch or complete its handshake.
    #[error("failed to launch server {name}: {reason}")]
    LaunchFailure {
        /// Server name.
        name: String,
        /// What went wrong.
        reason: String,
    },

    /// A proxied tool call failed at the transport or on the child.
    #[error("tool invocation failed on {server}: {source}")]
    Invocation {
        /// Server name.
        server: String,
        /// Underlying failure.
        #[source]
        source: ConnectionError,
    },
}

/// One registry entry. The connection handle is exclusively owned here and
/// exists iff the status is `Running`.
struct ServerEntry {
    spec: ManagedServerSpec,
    status: ServerStatus,
    advertised_tools: Vec<ToolDescriptor>,
    last_error: Option<String>,
    connection: Option<Box<dyn ServerConnection>>,
    last_started_at: Option<DateTime<Utc>>,
}

impl ServerEntry {
    fn new(spec: ManagedServerSpec) -> Self {
        Self {
            spec,
            status: ServerStatus::Installing,
            advertised_tools: Vec::new(),
            last_error: None,
            connection: None,
            last_started_at: None,
        }
    }
}

/// Point-in-time copy of one entry. Snapshots do not stay live.
#[derive(Debug, Clone, Serialize)]
pub struct ServerSnapshot {
    /// Install-time description.
    pub spec: ManagedServerSpec,
    /// Lifecycle status at snapshot time.
    pub status: ServerStatus,
    /// Tools last reported by the child.
    pub advertised_tools: Vec<ToolDescriptor>,
    /// Most recent error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Whether a live connection handle existed at snapshot time.
    pub connected: bool,
    /// Last successful start.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_started_at: Option<DateTime<Utc>>,
}

/// Authoritative registry of bridge-mode servers.
///
/// Dependency-injected and explicitly owned: constructed once at process
/// start and passed to every component that needs it. There is no ambient
/// singleton.
pub struct ManagedServerRegistry {
    connector: Arc<dyn ServerConnector>,
    emitter: Arc<dyn BridgeEventEmitter>,
    entries: RwLock<HashMap<String, Arc<Mutex<ServerEntry>>>>,
}

impl ManagedServerRegistry {
    /// Create a registry over the given connector and event emitter.
    pub fn new(connector: Arc<dyn ServerConnector>, emitter: Arc<dyn BridgeEventEmitter>) -> Self {
        Self {
            connector,
            emitter,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Add a server in `installing` state.
    ///
    /// Fails with [`RegistryError::DuplicateName`] when the name is taken
    /// by any non-removed entry. Removed entries leave the table entirely,
    /// so their names are free for reuse.
    pub async fn add(&self, spec: ManagedServerSpec) -> Result<(), RegistryError> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&spec.name) {
            return Err(RegistryError::DuplicateName(spec.name.clone()));
        }

        let name = spec.name.clone();
        entries.insert(name.clone(), Arc::new(Mutex::new(ServerEntry::new(spec))));
        tracing::info!(server_name = %name, "added server to registry");
        Ok(())
    }

    /// Whether a non-removed entry exists under this name.
    pub async fn contains(&self, name: &str) -> bool {
        self.entries.read().await.contains_key(name)
    }

    /// Start a server: launch/dial the child, discover its tools.
    ///
    /// Valid from `installing` and `stopped`. On failure the entry moves to
    /// `error` with the failure recorded, and stays in the registry for
    /// diagnosis; the error is also returned to the caller.
    pub async fn start(&self, name: &str) -> Result<Vec<ToolDescriptor>, RegistryError> {
        let entry = self.entry(name).await?;
        let mut entry = entry.lock().await;
        self.start_locked(name, &mut entry).await
    }

    /// Stop a server, tearing down its connection handle.
    ///
    /// Idempotent: stopping a server that is not running is a successful
    /// no-op. The advertised tool list is kept for display; only the live
    /// session is gone. An unknown name is still [`RegistryError::NotFound`].
    pub async fn stop(&self, name: &str) -> Result<(), RegistryError> {
        let entry = self.entry(name).await?;
        let mut entry = entry.lock().await;
        self.stop_locked(name, &mut entry).await;
        Ok(())
    }

    /// Stop then start under one per-name critical section.
    ///
    /// The tool list is re-fetched: the new child instance may expose a
    /// different tool set than the one it replaced.
    pub async fn restart(&self, name: &str) -> Result<Vec<ToolDescriptor>, RegistryError> {
        let entry = self.entry(name).await?;
        let mut entry = entry.lock().await;
        self.stop_locked(name, &mut entry).await;
        self.start_locked(name, &mut entry).await
    }

    /// Remove a server. Terminal: stops the child if running and frees the
    /// name for a later `add`.
    pub async fn remove(&self, name: &str) -> Result<(), RegistryError> {
        let entry = self.entry(name).await?;
        {
            let mut entry = entry.lock().await;
            if let Some(mut connection) = entry.connection.take() {
                connection.shutdown().await;
            }
            entry.advertised_tools.clear();
            entry.status = ServerStatus::Removed;
        }

        self.entries.write().await.remove(name);
        self.emitter.emit(BridgeEvent::removed(name));
        tracing::info!(server_name = %name, "removed server from registry");
        Ok(())
    }

    /// Health snapshot for one server. No side effects.
    pub async fn health(&self, name: &str) -> Result<ServerHealth, RegistryError> {
        let entry = self.entry(name).await?;
        let entry = entry.lock().await;
        Ok(ServerHealth {
            status: entry.status,
            tool_count: entry.advertised_tools.len(),
            last_error: entry.last_error.clone(),
        })
    }

    /// Snapshot of all non-removed entries. Copies, not live views.
    pub async fn list(&self) -> Vec<ServerSnapshot> {
        let handles: Vec<Arc<Mutex<ServerEntry>>> =
            self.entries.read().await.values().cloned().collect();

        let mut snapshots = Vec::with_capacity(handles.len());
        for handle in handles {
            let entry = handle.lock().await;
            if entry.status == ServerStatus::Removed {
                continue;
            }
            snapshots.push(ServerSnapshot {
                spec: entry.spec.clone(),
                status: entry.status,
                advertised_tools: entry.advertised_tools.clone(),
                last_error: entry.last_error.clone(),
                connected: entry.connection.is_some(),
                last_started_at: entry.last_started_at,
            });
        }
        snapshots
    }

    /// Tools a running server currently advertises.
    ///
    /// Unlike [`Self::list`], this requires a live session: binding tools
    /// onto the front server is only meaningful for a running child.
    pub async fn advertised_tools(&self, name: &str) -> Result<Vec<ToolDescriptor>, RegistryError> {
        let entry = self.entry(name).await?;
        let entry = entry.lock().await;
        if entry.status != ServerStatus::Running {
            return Err(RegistryError::NotRunning(name.to_string()));
        }
        Ok(entry.advertised_tools.clone())
    }

    /// Forward a tool call to a running server.
    ///
    /// Consults live state on every call: once the server stops, this fails
    /// with [`RegistryError::NotRunning`] rather than reaching a dead pipe.
    pub async fn call_tool(
        &self,
        name: &str,
        tool: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolResponse, RegistryError> {
        let entry = self.entry(name).await?;
        let entry = entry.lock().await;

        let connection = match (&entry.status, &entry.connection) {
            (ServerStatus::Running, Some(connection)) => connection,
            _ => return Err(RegistryError::NotRunning(name.to_string())),
        };

        connection
            .call_tool(tool, arguments)
            .await
            .map_err(|source| RegistryError::Invocation {
                server: name.to_string(),
                source,
            })
    }

    /// Connect to a spec without registering it: start, list tools, tear
    /// down. Used to test a configuration before committing to an install.
    pub async fn probe(
        &self,
        spec: &ManagedServerSpec,
    ) -> Result<Vec<ToolDescriptor>, RegistryError> {
        let mut connection =
            self.connector
                .connect(spec)
                .await
                .map_err(|e| RegistryError::LaunchFailure {
                    name: spec.name.clone(),
                    reason: e.to_string(),
                })?;

        let tools = connection.list_tools().await;
        connection.shutdown().await;

        tools.map_err(|e| RegistryError::LaunchFailure {
            name: spec.name.clone(),
            reason: format!("failed to list tools: {e}"),
        })
    }

    /// Stop every running server. Used on process shutdown.
    pub async fn stop_all(&self) {
        let names: Vec<String> = self.entries.read().await.keys().cloned().collect();
        for name in names {
            if let Err(e) = self.stop(&name).await {
                tracing::warn!(server_name = %name, error = %e, "failed to stop server");
            }
        }
    }

    async fn entry(&self, name: &str) -> Result<Arc<Mutex<ServerEntry>>, RegistryError> {
        self.entries
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    async fn start_locked(
        &self,
        name: &str,
        entry: &mut ServerEntry,
    ) -> Result<Vec<ToolDescriptor>, RegistryError> {
        match entry.status {
            ServerStatus::Running => return Err(RegistryError::AlreadyRunning(name.to_string())),
            ServerStatus::Error => return Err(RegistryError::Faulted(name.to_string())),
            ServerStatus::Removed => return Err(RegistryError::NotFound(name.to_string())),
            ServerStatus::Installing | ServerStatus::Stopped => {}
        }

        let mut connection = match self.connector.connect(&entry.spec).await {
            Ok(connection) => connection,
            Err(e) => return Err(self.fail_start(name, entry, e.to_string())),
        };

        let tools = match connection.list_tools().await {
            Ok(tools) => tools,
            Err(e) => {
                connection.shutdown().await;
                return Err(self.fail_start(name, entry, format!("failed to list tools: {e}")));
            }
        };

        entry.connection = Some(connection);
        entry.advertised_tools = tools.clone();
        entry.status = ServerStatus::Running;
        entry.last_error = None;
        entry.last_started_at = Some(Utc::now());

        self.emitter.emit(BridgeEvent::started(name, tools.len()));
        tracing::info!(
            server_name = %name,
            tool_count = tools.len(),
            "server started"
        );

        Ok(tools)
    }

    /// Record a start failure: the entry moves to `error` and stays in the
    /// table, visible for inspection, rather than being silently rolled back.
    fn fail_start(&self, name: &str, entry: &mut ServerEntry, reason: String) -> RegistryError {
        entry.status = ServerStatus::Error;
        entry.last_error = Some(reason.clone());
        entry.connection = None;
        entry.advertised_tools.clear();

        self.emitter.emit(BridgeEvent::error(name, reason.clone()));
        tracing::error!(server_name = %name, error = %reason, "server failed to start");

        RegistryError::LaunchFailure {
            name: name.to_string(),
            reason,
        }
    }

    async fn stop_locked(&self, name: &str, entry: &mut ServerEntry) {
        let Some(mut connection) = entry.connection.take() else {
            tracing::debug!(server_name = %name, "stop on non-running server is a no-op");
            return;
        };

        connection.shutdown().await;
        // advertised_tools intentionally survives the stop for display
        entry.status = ServerStatus::Stopped;

        self.emitter.emit(BridgeEvent::stopped(name));
        tracing::info!(server_name = %name, "server stopped");
    }
}
