//! Installation orchestrator.
//!
//! The use-case layer: resolves an install request into bridge or direct
//! mode, drives the command builder, registries, host config store, and
//! container runtime in order, and produces a structured result telling the
//! caller what happened and what to do next.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use toolbridge_config::{ConfigStoreError, HostConfigStore};
use toolbridge_core::{
    BridgeEvent, BridgeEventEmitter, InstallMode, ManagedServerSpec, ServerOrigin,
};
use toolbridge_docker::{DockerCli, DockerError, container_name_for, package_run_command, split_for_host_config};

use crate::registry::{ManagedServerRegistry, RegistryError};
use crate::tool_registry::DynamicToolRegistry;

/// Errors from the installation use-case layer.
#[derive(Debug, Error)]
pub enum InstallError {
    /// The request itself is malformed.
    #[error("invalid install request: {0}")]
    InvalidRequest(String),

    /// The name is taken in the target mode's namespace.
    #[error("server name already in use: {0}")]
    DuplicateName(String),

    /// No entry under this name in the target mode's namespace.
    #[error("unknown server: {0}")]
    NotFound(String),

    /// A registry operation failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The host config store failed.
    #[error(transparent)]
    Config(#[from] ConfigStoreError),

    /// The container runtime is unavailable or failed.
    #[error(transparent)]
    Runtime(#[from] DockerError),

    /// The server started but its tools could not be bound.
    #[error("failed to bind tools for {name}: {reason}")]
    ToolBinding {
        /// Server name.
        name: String,
        /// What went wrong.
        reason: String,
    },
}

/// What to install and how.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallRequest {
    /// Operator-chosen server name (tool prefix, container name, config key).
    pub name: String,
    /// Bridge (supervised, proxied) or direct (external client owns it).
    pub mode: InstallMode,
    /// Where the server's code comes from.
    pub origin: ServerOrigin,
    /// npm package identifier or container image reference.
    pub source: String,
    /// Environment for the child, merged into the launch command.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Start immediately after a bridge install.
    #[serde(default)]
    pub auto_start: bool,
    /// Network endpoint for an HTTP-transport child (bridge mode only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl InstallRequest {
    /// Create a bridge-mode request.
    pub fn bridge(name: impl Into<String>, origin: ServerOrigin, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: InstallMode::Bridge,
            origin,
            source: source.into(),
            env: BTreeMap::new(),
            auto_start: false,
            endpoint: None,
        }
    }

    /// Create a direct-mode request.
    pub fn direct(name: impl Into<String>, origin: ServerOrigin, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: InstallMode::Direct,
            origin,
            source: source.into(),
            env: BTreeMap::new(),
            auto_start: false,
            endpoint: None,
        }
    }

    /// Add an environment variable.
    #[must_use]
    pub fn with_env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Start the server right after installing (bridge mode).
    #[must_use]
    pub const fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    /// Connect over HTTP to an already-reachable child instead of spawning.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }
}

/// Structured outcome of an install.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallReport {
    /// Installed server name.
    pub name: String,
    /// Mode it was installed in.
    pub mode: InstallMode,
    /// Whether the server is running now.
    pub started: bool,
    /// Tools bound on the front server (bridge mode with auto-start).
    pub tools_registered: usize,
    /// What the caller (human or automation) must do next.
    pub next_steps: Vec<String>,
}

/// Orchestrates installs, uninstalls, and process-wide shutdown.
///
/// Explicitly owned and dependency-injected; constructed once at process
/// start with the shared registries.
pub struct Installer {
    servers: Arc<ManagedServerRegistry>,
    tools: Arc<DynamicToolRegistry>,
    host_config: HostConfigStore,
    docker: DockerCli,
    emitter: Arc<dyn BridgeEventEmitter>,
}

impl Installer {
    /// Create an installer over the shared components.
    pub fn new(
        servers: Arc<ManagedServerRegistry>,
        tools: Arc<DynamicToolRegistry>,
        host_config: HostConfigStore,
        docker: DockerCli,
        emitter: Arc<dyn BridgeEventEmitter>,
    ) -> Self {
        Self {
            servers,
            tools,
            host_config,
            docker,
            emitter,
        }
    }

    /// Install a server. Any step failure aborts the remaining steps; a
    /// bridge entry whose start failed is left visible in `error` state for
    /// inspection rather than rolled back.
    pub async fn install(&self, request: InstallRequest) -> Result<InstallReport, InstallError> {
        validate_request(&request)?;

        match request.mode {
            InstallMode::Bridge => self.install_bridge(request).await,
            InstallMode::Direct => self.install_direct(request).await,
        }
    }

    async fn install_bridge(&self, request: InstallRequest) -> Result<InstallReport, InstallError> {
        if self.servers.contains(&request.name).await {
            return Err(InstallError::DuplicateName(request.name));
        }

        // Spawned children run in containers; probe the runtime up front so
        // the failure is a clear diagnosis instead of a failed start later.
        if request.endpoint.is_none() {
            let version = self.docker.is_available().await?;
            tracing::debug!(runtime_version = %version, "container runtime available");
        }

        let launch_command = package_run_command(
            request.origin,
            &request.source,
            &container_name_for(&request.name),
            InstallMode::Bridge,
            &request.env,
        );

        let mut spec = ManagedServerSpec::new(&request.name, request.origin, launch_command)
            .with_env(request.env.clone());
        if let Some(endpoint) = &request.endpoint {
            spec = spec.with_endpoint(endpoint.clone());
        }

        self.servers.add(spec).await?;
        self.emitter
            .emit(BridgeEvent::installed(&request.name, InstallMode::Bridge));

        let mut started = false;
        let mut tools_registered = 0;
        if request.auto_start {
            self.servers.start(&request.name).await?;
            started = true;

            tools_registered = self
                .tools
                .add_server_tools(&request.name)
                .await
                .map_err(|e| InstallError::ToolBinding {
                    name: request.name.clone(),
                    reason: e.to_string(),
                })?;
        }

        let next_steps = if started {
            vec![format!(
                "Tools from '{0}' are available under the '{0}_' prefix.",
                request.name
            )]
        } else {
            vec![format!(
                "Start '{}' to discover and expose its tools.",
                request.name
            )]
        };

        tracing::info!(
            server_name = %request.name,
            started,
            tools_registered,
            "installed bridge-mode server"
        );

        Ok(InstallReport {
            name: request.name,
            mode: InstallMode::Bridge,
            started,
            tools_registered,
            next_steps,
        })
    }

    async fn install_direct(&self, request: InstallRequest) -> Result<InstallReport, InstallError> {
        if self.host_config.get(&request.name)?.is_some() {
            return Err(InstallError::DuplicateName(request.name));
        }

        let version = self.docker.is_available().await?;
        tracing::debug!(runtime_version = %version, "container runtime available");

        // Direct-mode containers run unsupervised for the life of the
        // external client; hardening is always applied.
        let launch_command = package_run_command(
            request.origin,
            &request.source,
            &container_name_for(&request.name),
            InstallMode::Direct,
            &request.env,
        );

        let (command, args) = split_for_host_config(&launch_command)
            .ok_or_else(|| InstallError::InvalidRequest("empty launch command".to_string()))?;

        // env is already baked into the argv as -e flags; the config entry
        // carries no separate env block to avoid drift between the two
        self.host_config.add(&request.name, command, args, None)?;
        self.emitter
            .emit(BridgeEvent::installed(&request.name, InstallMode::Direct));

        tracing::info!(server_name = %request.name, "installed direct-mode server");

        Ok(InstallReport {
            name: request.name,
            mode: InstallMode::Direct,
            started: false,
            tools_registered: 0,
            next_steps: vec![
                "Restart the external client to pick up the new server.".to_string(),
            ],
        })
    }

    /// Uninstall a server from the given mode's namespace.
    ///
    /// Bridge mode unbinds tools, removes the registry entry, and
    /// best-effort cleans up the container. Direct mode deletes the host
    /// config entry.
    pub async fn uninstall(&self, name: &str, mode: InstallMode) -> Result<(), InstallError> {
        match mode {
            InstallMode::Bridge => {
                self.tools.remove_server_tools(name).await;
                self.servers.remove(name).await?;

                // The container may already be gone; failure here is noise,
                // not an error the operator can act on
                if let Err(e) = self.docker.remove(&container_name_for(name)).await {
                    tracing::debug!(server_name = %name, error = %e, "container cleanup skipped");
                }
            }
            InstallMode::Direct => {
                if !self.host_config.remove(name)? {
                    return Err(InstallError::NotFound(name.to_string()));
                }
                self.emitter.emit(BridgeEvent::removed(name));
            }
        }

        tracing::info!(server_name = %name, mode = ?mode, "uninstalled server");
        Ok(())
    }

    /// Restart a bridge-mode server and re-bind its (possibly changed)
    /// tool set.
    pub async fn restart(&self, name: &str) -> Result<usize, InstallError> {
        self.servers.restart(name).await?;
        self.tools
            .refresh_server_tools(name)
            .await
            .map_err(InstallError::Registry)
    }

    /// Stop all servers and clear tool bookkeeping. Used on shutdown.
    pub async fn shutdown(&self) {
        self.servers.stop_all().await;
        self.tools.clear_all().await;
    }
}

/// Check request shape before touching any component.
fn validate_request(request: &InstallRequest) -> Result<(), InstallError> {
    if request.name.is_empty() {
        return Err(InstallError::InvalidRequest(
            "server name must not be empty".to_string(),
        ));
    }

    // The name becomes a tool prefix, a container name, and a config key
    if !request
        .name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(InstallError::InvalidRequest(format!(
            "server name '{}' may only contain letters, digits, '-' and '_'",
            request.name
        )));
    }

    if request.source.is_empty() {
        return Err(InstallError::InvalidRequest(
            "package or image identifier must not be empty".to_string(),
        ));
    }

    if request.mode == InstallMode::Direct && request.endpoint.is_some() {
        return Err(InstallError::InvalidRequest(
            "endpoints only apply to bridge-mode servers".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use toolbridge_core::{
        ConnectionError, NoopEmitter, NoopFrontend, ServerConnection, ServerConnector,
        ToolDescriptor, ToolResponse,
    };

    #[derive(Debug)]
    struct FakeConnection;

    #[async_trait]
    impl ServerConnection for FakeConnection {
        async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ConnectionError> {
            Ok(vec![ToolDescriptor::new("ping")])
        }

        async fn call_tool(
            &self,
            _name: &str,
            _arguments: serde_json::Value,
        ) -> Result<ToolResponse, ConnectionError> {
            Ok(ToolResponse::text("pong"))
        }

        async fn shutdown(&mut self) {}
    }

    struct FakeConnector;

    #[async_trait]
    impl ServerConnector for FakeConnector {
        async fn connect(
            &self,
            _spec: &ManagedServerSpec,
        ) -> Result<Box<dyn ServerConnection>, ConnectionError> {
            Ok(Box::new(FakeConnection))
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        servers: Arc<ManagedServerRegistry>,
        host_config: HostConfigStore,
        installer: Installer,
    }

    /// Wire an installer over fakes. `true` as the runtime binary makes the
    /// availability probe succeed on any machine without a container engine.
    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let host_config = HostConfigStore::at(dir.path().join("claude_desktop_config.json"));

        let servers = Arc::new(ManagedServerRegistry::new(
            Arc::new(FakeConnector),
            Arc::new(NoopEmitter::new()),
        ));
        let tools = Arc::new(DynamicToolRegistry::new(
            Arc::new(NoopFrontend::new()),
            Arc::clone(&servers),
        ));

        let installer = Installer::new(
            Arc::clone(&servers),
            Arc::clone(&tools),
            host_config.clone(),
            DockerCli::new().with_binary("true"),
            Arc::new(NoopEmitter::new()),
        );

        Harness {
            _dir: dir,
            servers,
            host_config,
            installer,
        }
    }

    fn bridge_request(name: &str) -> InstallRequest {
        InstallRequest::bridge(name, ServerOrigin::NpmPackage, "@example/mcp-server")
    }

    #[tokio::test]
    async fn bridge_install_with_auto_start_binds_tools() {
        let h = harness();
        let report = h
            .installer
            .install(bridge_request("weather").with_auto_start(true))
            .await
            .unwrap();

        assert_eq!(report.mode, InstallMode::Bridge);
        assert!(report.started);
        assert_eq!(report.tools_registered, 1);
        assert!(h.servers.contains("weather").await);
    }

    #[tokio::test]
    async fn second_bridge_install_with_same_name_fails() {
        let h = harness();
        h.installer.install(bridge_request("x")).await.unwrap();

        let err = h.installer.install(bridge_request("x")).await.unwrap_err();
        assert!(matches!(err, InstallError::DuplicateName(name) if name == "x"));
    }

    #[tokio::test]
    async fn bridge_install_without_auto_start_stays_installing() {
        let h = harness();
        let report = h.installer.install(bridge_request("lazy")).await.unwrap();

        assert!(!report.started);
        assert_eq!(report.tools_registered, 0);
        let health = h.servers.health("lazy").await.unwrap();
        assert_eq!(health.status, crate::ServerStatus::Installing);
    }

    #[tokio::test]
    async fn direct_install_writes_hardened_host_config_entry() {
        let h = harness();
        let report = h
            .installer
            .install(
                InstallRequest::direct("files", ServerOrigin::NpmPackage, "@example/files")
                    .with_env_var("TOKEN", "secret"),
            )
            .await
            .unwrap();

        assert_eq!(report.mode, InstallMode::Direct);
        assert!(report.next_steps[0].contains("Restart the external client"));

        let entry = h.host_config.get("files").unwrap().unwrap();
        assert_eq!(entry.command, "docker");
        assert!(entry.args.contains(&"--read-only".to_string()));
        assert!(entry.args.contains(&"TOKEN=secret".to_string()));
        assert!(entry.env.is_none());
    }

    #[tokio::test]
    async fn direct_install_rejects_existing_config_entry() {
        let h = harness();
        h.host_config.add("files", "node", vec![], None).unwrap();

        let err = h
            .installer
            .install(InstallRequest::direct(
                "files",
                ServerOrigin::NpmPackage,
                "@example/files",
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, InstallError::DuplicateName(_)));
    }

    #[tokio::test]
    async fn bridge_and_direct_namespaces_are_independent() {
        let h = harness();
        h.installer.install(bridge_request("shared")).await.unwrap();

        // same name in the other mode's namespace is fine
        h.installer
            .install(InstallRequest::direct(
                "shared",
                ServerOrigin::NpmPackage,
                "@example/shared",
            ))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn invalid_names_are_rejected_before_any_side_effect() {
        let h = harness();
        for bad in ["", "has space", "semi;colon"] {
            let err = h
                .installer
                .install(InstallRequest::bridge(
                    bad,
                    ServerOrigin::NpmPackage,
                    "@example/x",
                ))
                .await
                .unwrap_err();
            assert!(matches!(err, InstallError::InvalidRequest(_)));
        }
        assert!(h.servers.list().await.is_empty());
    }

    #[tokio::test]
    async fn runtime_unavailable_aborts_bridge_install() {
        let h = harness();
        let installer = Installer::new(
            Arc::clone(&h.servers),
            Arc::new(DynamicToolRegistry::new(
                Arc::new(NoopFrontend::new()),
                Arc::clone(&h.servers),
            )),
            h.host_config.clone(),
            DockerCli::new().with_binary("definitely-not-a-container-runtime"),
            Arc::new(NoopEmitter::new()),
        );

        let err = installer.install(bridge_request("x")).await.unwrap_err();
        assert!(matches!(
            err,
            InstallError::Runtime(DockerError::Unavailable(_))
        ));
        assert!(!h.servers.contains("x").await);
    }

    #[tokio::test]
    async fn uninstall_direct_removes_config_entry() {
        let h = harness();
        h.installer
            .install(InstallRequest::direct(
                "files",
                ServerOrigin::NpmPackage,
                "@example/files",
            ))
            .await
            .unwrap();

        h.installer
            .uninstall("files", InstallMode::Direct)
            .await
            .unwrap();
        assert!(h.host_config.get("files").unwrap().is_none());

        let err = h
            .installer
            .uninstall("files", InstallMode::Direct)
            .await
            .unwrap_err();
        assert!(matches!(err, InstallError::NotFound(_)));
    }

    #[tokio::test]
    async fn uninstall_bridge_frees_the_name() {
        let h = harness();
        h.installer
            .install(bridge_request("x").with_auto_start(true))
            .await
            .unwrap();

        h.installer.uninstall("x", InstallMode::Bridge).await.unwrap();
        assert!(!h.servers.contains("x").await);

        // name reusable after removal
        h.installer.install(bridge_request("x")).await.unwrap();
    }
}
