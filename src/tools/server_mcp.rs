//! Server MCP executor
//!
//! Bridges to an MCP service run as a local subprocess, speaking
//! line-delimited JSON-RPC over the child's stdio. A reader task routes
//! replies through the shared pending-call table; `execute` forwards
//! `tools/call` and maps the remote result into an `ActionResponse`.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};

use crate::session::Session;
use crate::tools::mcp::{
    JsonRpcRequest, JsonRpcResponse, PendingCalls, initialize_params, parse_tools_list,
    tool_call_params, tool_result_text,
};
use crate::tools::types::{
    ActionResponse, Arguments, ToolDefinition, ToolExecutor, ToolType,
};
use crate::{Error, Result};

/// Launch settings for the local MCP service
#[derive(Debug, Clone, Deserialize)]
pub struct McpServerConfig {
    /// Executable to run
    pub command: String,
    /// Arguments passed to the executable
    #[serde(default)]
    pub args: Vec<String>,
}

struct McpProcess {
    child: Child,
    stdin: ChildStdin,
}

/// Executes tools provided by a locally managed MCP subprocess
pub struct ServerMcpExecutor {
    config: Option<McpServerConfig>,
    call_timeout: Duration,
    pending: Arc<PendingCalls>,
    tools: Mutex<HashMap<String, ToolDefinition>>,
    process: tokio::sync::Mutex<Option<McpProcess>>,
}

impl ServerMcpExecutor {
    /// Create an executor; `config` of `None` leaves the family disabled
    #[must_use]
    pub fn new(config: Option<McpServerConfig>, call_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            config,
            call_timeout,
            pending: Arc::new(PendingCalls::new()),
            tools: Mutex::new(HashMap::new()),
            process: tokio::sync::Mutex::new(None),
        })
    }

    /// Spawn the subprocess and run the MCP handshake
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or the handshake
    /// fails; the caller logs and continues with the family disabled.
    pub async fn initialize(&self) -> Result<()> {
        let Some(config) = &self.config else {
            tracing::debug!("server MCP not configured");
            return Ok(());
        };

        let mut child = Command::new(&config.command)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Mcp(format!("failed to spawn {}: {e}", config.command)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Mcp("server MCP child has no stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Mcp("server MCP child has no stdout".to_string()))?;

        let pending = Arc::clone(&self.pending);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                match serde_json::from_str::<JsonRpcResponse>(&line) {
                    Ok(response) => {
                        pending.resolve_response(response);
                    }
                    Err(e) => tracing::debug!(error = %e, "unparseable server MCP line"),
                }
            }
            pending.fail_all("server MCP process exited");
        });

        *self.process.lock().await = Some(McpProcess { child, stdin });

        self.rpc(
            "initialize",
            Some(initialize_params("lark-edge", env!("CARGO_PKG_VERSION"))),
        )
        .await?;

        let listing = self.rpc("tools/list", None).await?;
        let discovered = parse_tools_list(&listing);
        let count = discovered.len();
        {
            let mut tools = self.lock();
            tools.clear();
            for info in discovered {
                let def = info.into_definition(ToolType::ServerMcp);
                tools.insert(def.name.clone(), def);
            }
        }
        tracing::info!(command = %config.command, count, "server MCP initialized");
        Ok(())
    }

    /// Stop the subprocess and fail anything still waiting on it
    ///
    /// # Errors
    ///
    /// Returns an error if the process refuses to die.
    pub async fn cleanup(&self) -> Result<()> {
        self.pending.fail_all("server MCP shutting down");
        self.lock().clear();

        if let Some(mut process) = self.process.lock().await.take() {
            process
                .child
                .start_kill()
                .map_err(|e| Error::Mcp(format!("failed to stop server MCP: {e}")))?;
        }
        Ok(())
    }

    async fn rpc(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let (id, rx) = self.pending.register();
        let request = JsonRpcRequest::new(id, method, params);
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');

        {
            let mut guard = self.process.lock().await;
            let Some(process) = guard.as_mut() else {
                self.pending.forget(id);
                return Err(Error::Mcp("server MCP is not running".to_string()));
            };
            process
                .stdin
                .write_all(line.as_bytes())
                .await
                .map_err(|e| Error::Mcp(format!("server MCP write failed: {e}")))?;
            process
                .stdin
                .flush()
                .await
                .map_err(|e| Error::Mcp(format!("server MCP flush failed: {e}")))?;
        }

        match tokio::time::timeout(self.call_timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(Error::Mcp("server MCP reply channel closed".to_string())),
            Err(_) => {
                self.pending.forget(id);
                Err(Error::Mcp(format!("server MCP call {method} timed out")))
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ToolDefinition>> {
        self.tools.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ToolExecutor for ServerMcpExecutor {
    fn tools(&self) -> HashMap<String, ToolDefinition> {
        self.lock().clone()
    }

    fn has_tool(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    async fn execute(
        &self,
        _session: &Session,
        name: &str,
        arguments: Arguments,
    ) -> Result<ActionResponse> {
        let result = self
            .rpc("tools/call", Some(tool_call_params(name, &arguments)))
            .await?;

        let (text, is_error) = tool_result_text(&result);
        if is_error {
            Ok(ActionResponse::error(text))
        } else {
            Ok(ActionResponse::req_llm(text))
        }
    }
}
