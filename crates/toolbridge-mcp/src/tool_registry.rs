//! Dynamic binding of child-server tools onto the front-facing server.
//!
//! Tools are registered under `{server}_{tool}` names. The front server
//! offers no unregister primitive, so "removal" clears this registry's
//! bookkeeping only; an orphaned handler stays registered but consults live
//! registry state on every invocation and fails cleanly with a
//! server-not-running error once its backing server is gone. That is a
//! deliberate degraded state, not undefined behavior.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;

use toolbridge_core::{ToolFrontend, ToolHandler, ToolRegistration, ToolResponse};

use crate::registry::{ManagedServerRegistry, RegistryError};

/// Namespaced tool name exposed on the front server.
///
/// Unique across servers as long as server names are unique; a tool name
/// that itself contains the separator can alias another server's namespaced
/// name, which is an accepted limitation of the scheme.
pub fn namespaced_tool_name(server: &str, tool: &str) -> String {
    format!("{server}_{tool}")
}

/// Read-only aggregate for diagnostics and startup banners.
#[derive(Debug, Clone, Serialize)]
pub struct ToolRegistryStats {
    /// Servers with at least one bound tool.
    pub total_servers: usize,
    /// Total bound tools across all servers.
    pub total_tools: usize,
    /// Bound tool count per server.
    pub per_server: BTreeMap<String, usize>,
}

/// Tracks which namespaced tools are currently routed for each server.
pub struct DynamicToolRegistry {
    frontend: Arc<dyn ToolFrontend>,
    servers: Arc<ManagedServerRegistry>,
    /// server name -> namespaced tools currently considered bound
    bound: RwLock<HashMap<String, Vec<String>>>,
    /// every namespaced name ever pushed to the front server; registrations
    /// are permanent, so re-binding after a restart must not re-register
    registered: RwLock<HashSet<String>>,
}

impl DynamicToolRegistry {
    /// Create a tool registry bridging the given server registry onto the
    /// front-facing server.
    pub fn new(frontend: Arc<dyn ToolFrontend>, servers: Arc<ManagedServerRegistry>) -> Self {
        Self {
            frontend,
            servers,
            bound: RwLock::new(HashMap::new()),
            registered: RwLock::new(HashSet::new()),
        }
    }

    /// Bind all tools of a running server onto the front server.
    ///
    /// Each handler forwards the call - original unprefixed tool name plus
    /// arguments - to the owning server through the live registry, and
    /// converts any failure into an error-shaped response instead of letting
    /// it escape the handler boundary. Fails with
    /// [`RegistryError::NotRunning`] when the server has no live session.
    pub async fn add_server_tools(&self, name: &str) -> Result<usize, RegistryError> {
        let tools = self.servers.advertised_tools(name).await?;

        let mut namespaced_names = Vec::with_capacity(tools.len());
        {
            let mut registered = self.registered.write().await;
            for tool in &tools {
                let namespaced = namespaced_tool_name(name, &tool.name);

                if registered.insert(namespaced.clone()) {
                    self.frontend.register_tool(ToolRegistration {
                        name: namespaced.clone(),
                        description: tool.description.clone(),
                        input_schema: tool.input_schema.clone(),
                        handler: self.forwarding_handler(name, &tool.name),
                    });
                }
                namespaced_names.push(namespaced);
            }
        }

        let count = namespaced_names.len();
        self.bound
            .write()
            .await
            .insert(name.to_string(), namespaced_names);

        tracing::info!(
            server_name = %name,
            tool_count = count,
            "bound server tools on front server"
        );
        Ok(count)
    }

    /// Forget a server's tools. Returns how many were tracked.
    ///
    /// The front-server registrations stay in place (see module docs); they
    /// become inert because every invocation re-checks registry state.
    pub async fn remove_server_tools(&self, name: &str) -> usize {
        let removed = self
            .bound
            .write()
            .await
            .remove(name)
            .map_or(0, |tools| tools.len());

        if removed > 0 {
            tracing::info!(
                server_name = %name,
                tool_count = removed,
                "unbound server tools (registrations remain inert)"
            );
        }
        removed
    }

    /// Re-bind after a restart: the new child instance may advertise a
    /// different tool set.
    pub async fn refresh_server_tools(&self, name: &str) -> Result<usize, RegistryError> {
        self.remove_server_tools(name).await;
        self.add_server_tools(name).await
    }

    /// Aggregate counts for diagnostics.
    pub async fn stats(&self) -> ToolRegistryStats {
        let bound = self.bound.read().await;
        let per_server: BTreeMap<String, usize> = bound
            .iter()
            .map(|(server, tools)| (server.clone(), tools.len()))
            .collect();

        ToolRegistryStats {
            total_servers: per_server.len(),
            total_tools: per_server.values().sum(),
            per_server,
        }
    }

    /// Forget every server's tools. Used on process shutdown.
    pub async fn clear_all(&self) {
        let mut bound = self.bound.write().await;
        let servers = bound.len();
        bound.clear();
        tracing::info!(server_count = servers, "cleared all tool bindings");
    }

    /// Build the invocation handler for one namespaced tool.
    fn forwarding_handler(&self, server: &str, tool: &str) -> ToolHandler {
        let servers = Arc::clone(&self.servers);
        let server = server.to_string();
        let tool = tool.to_string();

        Arc::new(move |arguments| {
            let servers = Arc::clone(&servers);
            let server = server.clone();
            let tool = tool.clone();
            Box::pin(async move {
                match servers.call_tool(&server, &tool, arguments).await {
                    Ok(response) => response,
                    Err(e) => ToolResponse::error(e.to_string()),
                }
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use toolbridge_core::{
        ConnectionError, ManagedServerSpec, NoopEmitter, ServerConnection, ServerConnector,
        ServerOrigin, ToolDescriptor,
    };

    /// Frontend that records registrations and lets tests invoke handlers.
    #[derive(Default)]
    struct RecordingFrontend {
        registrations: std::sync::Mutex<HashMap<String, ToolRegistration>>,
    }

    impl RecordingFrontend {
        fn names(&self) -> Vec<String> {
            let mut names: Vec<String> =
                self.registrations.lock().unwrap().keys().cloned().collect();
            names.sort();
            names
        }

        async fn invoke(&self, name: &str, arguments: serde_json::Value) -> ToolResponse {
            let handler = {
                let registrations = self.registrations.lock().unwrap();
                Arc::clone(&registrations.get(name).expect("tool not registered").handler)
            };
            handler(arguments).await
        }
    }

    impl ToolFrontend for RecordingFrontend {
        fn register_tool(&self, registration: ToolRegistration) {
            self.registrations
                .lock()
                .unwrap()
                .insert(registration.name.clone(), registration);
        }
    }

    #[derive(Debug)]
    struct FakeConnection {
        tools: Vec<String>,
    }

    #[async_trait]
    impl ServerConnection for FakeConnection {
        async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ConnectionError> {
            Ok(self
                .tools
                .iter()
                .map(|name| ToolDescriptor::new(name.clone()))
                .collect())
        }

        async fn call_tool(
            &self,
            name: &str,
            arguments: serde_json::Value,
        ) -> Result<ToolResponse, ConnectionError> {
            Ok(ToolResponse::text(format!("{name}:{arguments}")))
        }

        async fn shutdown(&mut self) {}
    }

    struct FakeConnector {
        tools: std::sync::Mutex<Vec<String>>,
    }

    impl FakeConnector {
        fn with_tools(tools: &[&str]) -> Self {
            Self {
                tools: std::sync::Mutex::new(
                    tools.iter().map(|t| (*t).to_string()).collect(),
                ),
            }
        }

        fn set_tools(&self, tools: &[&str]) {
            *self.tools.lock().unwrap() = tools.iter().map(|t| (*t).to_string()).collect();
        }
    }

    #[async_trait]
    impl ServerConnector for FakeConnector {
        async fn connect(
            &self,
            _spec: &ManagedServerSpec,
        ) -> Result<Box<dyn ServerConnection>, ConnectionError> {
            Ok(Box::new(FakeConnection {
                tools: self.tools.lock().unwrap().clone(),
            }))
        }
    }

    fn spec(name: &str) -> ManagedServerSpec {
        ManagedServerSpec::new(name, ServerOrigin::NpmPackage, vec!["docker".to_string()])
    }

    struct Harness {
        frontend: Arc<RecordingFrontend>,
        connector: Arc<FakeConnector>,
        servers: Arc<ManagedServerRegistry>,
        tools: DynamicToolRegistry,
    }

    fn harness(tool_names: &[&str]) -> Harness {
        let frontend = Arc::new(RecordingFrontend::default());
        let connector = Arc::new(FakeConnector::with_tools(tool_names));
        let servers = Arc::new(ManagedServerRegistry::new(
            Arc::clone(&connector) as Arc<dyn ServerConnector>,
            Arc::new(NoopEmitter::new()),
        ));
        let tools = DynamicToolRegistry::new(
            Arc::clone(&frontend) as Arc<dyn ToolFrontend>,
            Arc::clone(&servers),
        );
        Harness {
            frontend,
            connector,
            servers,
            tools,
        }
    }

    #[tokio::test]
    async fn tools_are_registered_under_namespaced_names_only() {
        let h = harness(&["bar"]);
        h.servers.add(spec("foo")).await.unwrap();
        h.servers.start("foo").await.unwrap();
        h.tools.add_server_tools("foo").await.unwrap();

        assert_eq!(h.frontend.names(), vec!["foo_bar"]);

        let response = h.frontend.invoke("foo_bar", json!({"q": 1})).await;
        assert!(!response.is_error);
        // the child received the original, unprefixed name
        assert!(response.first_text().unwrap().starts_with("bar:"));
    }

    #[tokio::test]
    async fn binding_requires_a_running_server() {
        let h = harness(&["bar"]);
        h.servers.add(spec("foo")).await.unwrap();

        let err = h.tools.add_server_tools("foo").await.unwrap_err();
        assert!(matches!(err, RegistryError::NotRunning(_)));
    }

    #[tokio::test]
    async fn invocation_after_stop_returns_error_shape() {
        let h = harness(&["bar"]);
        h.servers.add(spec("foo")).await.unwrap();
        h.servers.start("foo").await.unwrap();
        h.tools.add_server_tools("foo").await.unwrap();

        h.servers.stop("foo").await.unwrap();
        h.tools.remove_server_tools("foo").await;

        // registration is still physically present but must fail cleanly
        let response = h.frontend.invoke("foo_bar", json!({})).await;
        assert!(response.is_error);
        assert!(response.first_text().unwrap().contains("not running"));
    }

    #[tokio::test]
    async fn refresh_picks_up_new_tools_without_duplicate_registration() {
        let h = harness(&["a", "b"]);
        h.servers.add(spec("s")).await.unwrap();
        h.servers.start("s").await.unwrap();
        h.tools.add_server_tools("s").await.unwrap();
        assert_eq!(h.frontend.names(), vec!["s_a", "s_b"]);

        h.connector.set_tools(&["a", "b", "c"]);
        h.servers.restart("s").await.unwrap();
        let count = h.tools.refresh_server_tools("s").await.unwrap();
        assert_eq!(count, 3);
        assert_eq!(h.frontend.names(), vec!["s_a", "s_b", "s_c"]);

        let stats = h.tools.stats().await;
        assert_eq!(stats.total_servers, 1);
        assert_eq!(stats.total_tools, 3);
        assert_eq!(stats.per_server.get("s"), Some(&3));
    }

    #[tokio::test]
    async fn clear_all_empties_bookkeeping() {
        let h = harness(&["a"]);
        h.servers.add(spec("s")).await.unwrap();
        h.servers.start("s").await.unwrap();
        h.tools.add_server_tools("s").await.unwrap();

        h.tools.clear_all().await;
        let stats = h.tools.stats().await;
        assert_eq!(stats.total_servers, 0);
        assert_eq!(stats.total_tools, 0);
    }
}
