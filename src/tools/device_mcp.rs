//! Device MCP executor
//!
//! Tunnels MCP frames over the device transport. Requests and replies are
//! correlated by JSON-RPC id: the session reader feeds every inbound
//! `mcp` payload into [`DeviceMcpExecutor::handle_device_payload`], which
//! wakes the caller blocked inside `execute`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::session::Session;
use crate::tools::mcp::{
    JsonRpcRequest, JsonRpcResponse, PendingCalls, initialize_params, parse_tools_list,
    tool_call_params, tool_result_text,
};
use crate::tools::types::{
    ActionResponse, Arguments, ToolDefinition, ToolExecutor, ToolType,
};
use crate::transport::{DeviceTransport, OutboundFrame};
use crate::{Error, Result};

/// Executes tools exposed by the device over its MCP tunnel
pub struct DeviceMcpExecutor {
    pending: Arc<PendingCalls>,
    tools: Mutex<HashMap<String, ToolDefinition>>,
    call_timeout: Duration,
}

impl DeviceMcpExecutor {
    /// Create an executor with the given per-call timeout
    #[must_use]
    pub fn new(call_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            pending: Arc::new(PendingCalls::new()),
            tools: Mutex::new(HashMap::new()),
            call_timeout,
        })
    }

    /// Kick off the tunneled `initialize` / `tools/list` handshake
    ///
    /// Runs in the background; discovered tools appear once the device
    /// replies. Call `refresh_tools` on the manager after a reply has been
    /// observed (the handler does this on IoT registration as well).
    pub fn start_discovery(self: &Arc<Self>, transport: Arc<dyn DeviceTransport>) {
        let executor = Arc::clone(self);
        let timeout = self.call_timeout;

        tokio::spawn(async move {
            match executor.request(&transport, "initialize", Some(initialize_params("lark-edge", env!("CARGO_PKG_VERSION"))), timeout).await {
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(error = %e, "device MCP initialize did not complete");
                    return;
                }
            }

            match executor.request(&transport, "tools/list", None, timeout).await {
                Ok(result) => {
                    let discovered = parse_tools_list(&result);
                    let count = discovered.len();
                    {
                        let mut tools = executor.lock();
                        tools.clear();
                        for info in discovered {
                            let def = info.into_definition(ToolType::DeviceMcp);
                            tools.insert(def.name.clone(), def);
                        }
                    }
                    tracing::info!(count, "device MCP tools discovered");
                }
                Err(e) => {
                    tracing::debug!(error = %e, "device MCP tools/list did not complete");
                }
            }
        });
    }

    /// Route an inbound `mcp` payload from the device to its waiter
    pub fn handle_device_payload(&self, payload: Value) {
        match serde_json::from_value::<JsonRpcResponse>(payload) {
            Ok(response) => {
                if !self.pending.resolve_response(response) {
                    tracing::debug!("device MCP reply matched no pending request");
                }
            }
            Err(e) => tracing::warn!(error = %e, "malformed device MCP payload"),
        }
    }

    /// The device connection ended; fail outstanding calls and drop tools
    pub fn disconnected(&self) {
        self.pending.fail_all("device disconnected");
        self.lock().clear();
    }

    async fn request(
        &self,
        transport: &Arc<dyn DeviceTransport>,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value> {
        let (id, rx) = self.pending.register();
        let request = JsonRpcRequest::new(id, method, params);
        let frame = OutboundFrame::Mcp {
            payload: serde_json::to_value(&request)?,
        };

        if let Err(e) = transport.send(frame) {
            self.pending.forget(id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(Error::Mcp("device MCP reply channel closed".to_string())),
            Err(_) => {
                self.pending.forget(id);
                Err(Error::Mcp(format!("device MCP call {method} timed out")))
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ToolDefinition>> {
        self.tools.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ToolExecutor for DeviceMcpExecutor {
    fn tools(&self) -> HashMap<String, ToolDefinition> {
        self.lock().clone()
    }

    fn has_tool(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    async fn execute(
        &self,
        session: &Session,
        name: &str,
        arguments: Arguments,
    ) -> Result<ActionResponse> {
        let result = self
            .request(
                session.transport(),
                "tools/call",
                Some(tool_call_params(name, &arguments)),
                self.call_timeout,
            )
            .await?;

        let (text, is_error) = tool_result_text(&result);
        if is_error {
            Ok(ActionResponse::error(text))
        } else {
            Ok(ActionResponse::req_llm(text))
        }
    }
}
