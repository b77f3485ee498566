//! JSON-RPC client for child tool servers.
//!
//! Implements the tool-invocation protocol over two transports: a local
//! stdio pipe to a spawned child process, and plain HTTP POST of the same
//! JSON-RPC envelope to a network endpoint.
//! Reference: <https://spec.modelcontextprotocol.io/>

use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;

use toolbridge_core::{
    ConnectionError, ManagedServerSpec, ServerConnection, ServerConnector, ToolContent,
    ToolDescriptor, ToolResponse,
};

/// Protocol revision sent in the initialize handshake.
const PROTOCOL_VERSION: &str = "2024-11-05";

/// Default deadline for one request/response round trip.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Non-protocol stdout lines tolerated before a response. Package runners
/// print install banners before the child starts speaking JSON-RPC.
const MAX_SKIPPED_LINES: usize = 10;

/// JSON-RPC 2.0 request envelope.
#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

/// JSON-RPC 2.0 response envelope. Unknown fields are ignored.
#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// Result of the initialize handshake.
#[derive(Debug, Clone, Deserialize)]
pub struct InitializeResult {
    /// Protocol revision the child speaks.
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    /// Child server identity.
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
    /// Declared capabilities.
    #[serde(default)]
    pub capabilities: ServerCapabilities,
}

/// Child server identity from initialize.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version, if reported.
    #[serde(default)]
    pub version: Option<String>,
}

/// Capabilities declared by the child server.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerCapabilities {
    /// Present when the child serves tools.
    #[serde(default)]
    pub tools: Option<Value>,
}

/// Tool entry from `tools/list`.
#[derive(Debug, Deserialize)]
struct ToolListEntry {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, rename = "inputSchema")]
    input_schema: Option<Value>,
}

/// Pipes to a spawned stdio child. One request/response exchange at a time:
/// the pipe carries no id-demultiplexing, so the pair is locked together.
#[derive(Debug)]
struct StdioPipes {
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
}

#[derive(Debug)]
enum Transport {
    Stdio {
        child: Child,
        pipes: Mutex<StdioPipes>,
    },
    Http {
        client: reqwest::Client,
        endpoint: String,
    },
}

/// A live session with one child server.
#[derive(Debug)]
pub struct BridgeConnection {
    transport: Transport,
    request_id: AtomicU64,
    request_timeout: Duration,
    capabilities: ServerCapabilities,
}

impl BridgeConnection {
    /// Spawn the spec's launch command and wire up a stdio transport.
    fn spawn(spec: &ManagedServerSpec, request_timeout: Duration) -> Result<Self, ConnectionError> {
        let program = spec
            .program()
            .ok_or_else(|| ConnectionError::Launch("empty launch command".to_string()))?;

        let mut child = Command::new(program)
            .args(&spec.launch_command[1..])
            .envs(&spec.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            // stderr is not read here; container logs come from the runtime CLI
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ConnectionError::Launch(format!(
                    "failed to spawn '{program}': {e} (args: {:?})",
                    &spec.launch_command[1..]
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ConnectionError::Launch("failed to capture stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ConnectionError::Launch("failed to capture stdout".to_string()))?;

        Ok(Self {
            transport: Transport::Stdio {
                child,
                pipes: Mutex::new(StdioPipes {
                    stdin,
                    reader: BufReader::new(stdout),
                }),
            },
            request_id: AtomicU64::new(1),
            request_timeout,
            capabilities: ServerCapabilities::default(),
        })
    }

    /// Wire up an HTTP transport to a network child.
    fn dial(endpoint: &str, request_timeout: Duration) -> Self {
        Self {
            transport: Transport::Http {
                client: reqwest::Client::new(),
                endpoint: endpoint.to_string(),
            },
            request_id: AtomicU64::new(1),
            request_timeout,
            capabilities: ServerCapabilities::default(),
        }
    }

    /// Establish the protocol session.
    async fn initialize(&mut self) -> Result<InitializeResult, ConnectionError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "clientInfo": {
                "name": "toolbridge",
                "version": env!("CARGO_PKG_VERSION")
            },
            "capabilities": {}
        });

        let raw = self.request("initialize", Some(params)).await?;
        let result: InitializeResult = serde_json::from_value(raw)?;
        self.capabilities = result.capabilities.clone();

        self.notify("notifications/initialized", None).await?;

        tracing::debug!(
            server = %result.server_info.name,
            protocol = %result.protocol_version,
            "initialized child server session"
        );

        Ok(result)
    }

    /// Send a request and await its response within the deadline.
    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, ConnectionError> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };

        let response = match &self.transport {
            Transport::Stdio { pipes, .. } => {
                let line = serde_json::to_string(&request)? + "\n";
                let exchange = async {
                    let mut pipes = pipes.lock().await;
                    pipes.stdin.write_all(line.as_bytes()).await?;
                    pipes.stdin.flush().await?;
                    read_response(&mut pipes.reader).await
                };
                match timeout(self.request_timeout, exchange).await {
                    Ok(result) => result?,
                    Err(_elapsed) => return Err(ConnectionError::Timeout),
                }
            }
            Transport::Http { client, endpoint } => {
                let exchange = async {
                    let http_response = client
                        .post(endpoint)
                        .json(&request)
                        .send()
                        .await
                        .map_err(|e| ConnectionError::Protocol(e.to_string()))?;
                    http_response
                        .json::<JsonRpcResponse>()
                        .await
                        .map_err(|e| ConnectionError::Protocol(e.to_string()))
                };
                match timeout(self.request_timeout, exchange).await {
                    Ok(result) => result?,
                    Err(_elapsed) => return Err(ConnectionError::Timeout),
                }
            }
        };

        if let Some(error) = response.error {
            return Err(ConnectionError::Remote {
                code: error.code,
                message: error.message,
            });
        }

        response
            .result
            .ok_or_else(|| ConnectionError::Protocol("missing result in response".to_string()))
    }

    /// Send a notification (no response expected).
    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), ConnectionError> {
        let notification = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params.unwrap_or_else(|| json!({}))
        });

        match &self.transport {
            Transport::Stdio { pipes, .. } => {
                let line = serde_json::to_string(&notification)? + "\n";
                let mut pipes = pipes.lock().await;
                pipes.stdin.write_all(line.as_bytes()).await?;
                pipes.stdin.flush().await?;
            }
            Transport::Http { client, endpoint } => {
                client
                    .post(endpoint)
                    .json(&notification)
                    .send()
                    .await
                    .map_err(|e| ConnectionError::Protocol(e.to_string()))?;
            }
        }

        Ok(())
    }
}

/// Read lines until a valid JSON-RPC response appears.
///
/// Skips a bounded number of blank or non-protocol lines (package-runner
/// startup noise). EOF means the child closed its stdout.
async fn read_response(
    reader: &mut BufReader<ChildStdout>,
) -> Result<JsonRpcResponse, ConnectionError> {
    for _ in 0..MAX_SKIPPED_LINES {
        let mut line = String::new();
        let bytes = reader.read_line(&mut line).await?;
        if bytes == 0 {
            return Err(ConnectionError::Protocol(
                "server closed connection".to_string(),
            ));
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Ok(response) = serde_json::from_str::<JsonRpcResponse>(trimmed) {
            return Ok(response);
        }
        tracing::debug!(line = trimmed, "skipping non-protocol output");
    }

    Err(ConnectionError::Protocol(
        "no valid JSON-RPC response received".to_string(),
    ))
}

#[async_trait]
impl ServerConnection for BridgeConnection {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ConnectionError> {
        // A child that never declared the tools capability has none to list
        if self.capabilities.tools.is_none() {
            return Ok(Vec::new());
        }

        let result = self.request("tools/list", None).await?;
        let raw_tools = result.get("tools").cloned().unwrap_or_else(|| json!([]));
        let entries: Vec<ToolListEntry> = serde_json::from_value(raw_tools)?;

        Ok(entries
            .into_iter()
            .map(|entry| ToolDescriptor {
                name: entry.name,
                description: entry.description,
                input_schema: entry.input_schema,
            })
            .collect())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<ToolResponse, ConnectionError> {
        let params = json!({
            "name": name,
            "arguments": arguments
        });

        let result = self.request("tools/call", Some(params)).await?;

        let content = result.get("content").cloned().unwrap_or_else(|| json!([]));
        let is_error = result
            .get("isError")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        Ok(ToolResponse {
            content: ToolContent::from_raw_content(&content),
            is_error,
        })
    }

    async fn shutdown(&mut self) {
        if let Transport::Stdio { child, .. } = &mut self.transport {
            if let Err(e) = child.kill().await {
                tracing::debug!(error = %e, "child already gone during shutdown");
            }
        }
    }
}

/// Production connector: spawns stdio children, dials network children.
#[derive(Debug, Clone)]
pub struct BridgeConnector {
    request_timeout: Duration,
}

impl Default for BridgeConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl BridgeConnector {
    /// Create a connector with the default request timeout.
    pub const fn new() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Override the per-request deadline for all connections made here.
    #[must_use]
    pub const fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }
}

#[async_trait]
impl ServerConnector for BridgeConnector {
    async fn connect(
        &self,
        spec: &ManagedServerSpec,
    ) -> Result<Box<dyn ServerConnection>, ConnectionError> {
        let mut connection = match &spec.endpoint {
            Some(endpoint) => BridgeConnection::dial(endpoint, self.request_timeout),
            None => BridgeConnection::spawn(spec, self.request_timeout)?,
        };

        match connection.initialize().await {
            Ok(_) => Ok(Box::new(connection)),
            Err(e) => {
                connection.shutdown().await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serialization_omits_absent_params() {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method: "tools/list",
            params: None,
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"method\":\"tools/list\""));
        assert!(!json.contains("params"));
    }

    #[test]
    fn response_parsing_handles_result_and_error() {
        let ok: JsonRpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":{"tools":[]}}"#).unwrap();
        assert!(ok.result.is_some());
        assert!(ok.error.is_none());

        let err: JsonRpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32600,"message":"Invalid Request"}}"#,
        )
        .unwrap();
        assert_eq!(err.error.as_ref().unwrap().code, -32600);
    }

    #[tokio::test]
    async fn spawn_failure_is_a_launch_error() {
        let spec = ManagedServerSpec::new(
            "ghost",
            toolbridge_core::ServerOrigin::NpmPackage,
            vec!["definitely-not-a-real-program".to_string()],
        );

        let connector = BridgeConnector::new();
        let err = connector.connect(&spec).await.unwrap_err();
        assert!(matches!(err, ConnectionError::Launch(_)));
    }

    #[tokio::test]
    async fn empty_launch_command_is_rejected() {
        let spec = ManagedServerSpec::new(
            "empty",
            toolbridge_core::ServerOrigin::ContainerImage,
            Vec::new(),
        );

        let connector = BridgeConnector::new();
        let err = connector.connect(&spec).await.unwrap_err();
        assert!(matches!(err, ConnectionError::Launch(msg) if msg.contains("empty")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unresponsive_child_times_out() {
        // `sleep` never writes to stdout, so the initialize request sits
        // unanswered until the deadline hits.
        let spec = ManagedServerSpec::new(
            "silent",
            toolbridge_core::ServerOrigin::ContainerImage,
            vec!["sleep".to_string(), "30".to_string()],
        );

        let connector = BridgeConnector::new().with_request_timeout(Duration::from_millis(200));
        let err = connector.connect(&spec).await.unwrap_err();
        assert!(matches!(err, ConnectionError::Timeout));
    }
}
