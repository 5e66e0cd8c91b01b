//! MCP endpoint executor
//!
//! Speaks the same MCP subset as the other bridges, but over HTTP POST
//! JSON-RPC to an external endpoint configured by URL. A missing or
//! placeholder URL leaves the family disabled rather than failing the
//! session.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::session::Session;
use crate::tools::mcp::{
    JsonRpcRequest, JsonRpcResponse, initialize_params, parse_tools_list, tool_call_params,
    tool_result_text,
};
use crate::tools::types::{
    ActionResponse, Arguments, ToolDefinition, ToolExecutor, ToolType,
};
use crate::{Error, Result};

/// Whether a configured endpoint URL is a template left unfilled
///
/// Empty strings, the literal `null`, and `your-…` placeholders from the
/// sample config all count as "not configured".
#[must_use]
pub fn is_placeholder_url(url: &str) -> bool {
    let url = url.trim();
    url.is_empty() || url == "null" || url.contains("your-")
}

/// Executes tools provided by a remote MCP endpoint
pub struct McpEndpointExecutor {
    url: String,
    client: reqwest::Client,
    call_timeout: Duration,
    next_id: AtomicU64,
    connected: AtomicBool,
    tools: Mutex<HashMap<String, ToolDefinition>>,
}

impl McpEndpointExecutor {
    /// Create an executor for the configured URL (possibly a placeholder)
    #[must_use]
    pub fn new(url: impl Into<String>, call_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            url: url.into(),
            client: reqwest::Client::new(),
            call_timeout,
            next_id: AtomicU64::new(0),
            connected: AtomicBool::new(false),
            tools: Mutex::new(HashMap::new()),
        })
    }

    /// Whether the endpoint completed its handshake
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Handshake with the endpoint and fetch its tool list
    ///
    /// A placeholder URL is skipped silently; a real URL that fails is an
    /// error the caller logs before continuing without this family.
    ///
    /// # Errors
    ///
    /// Returns an error if the handshake or tool listing fails.
    pub async fn initialize(&self) -> Result<()> {
        if is_placeholder_url(&self.url) {
            tracing::debug!("MCP endpoint not configured");
            return Ok(());
        }

        tracing::info!(url = %self.url, "initializing MCP endpoint");
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
                let def = info.into_definition(ToolType::McpEndpoint);
                tools.insert(def.name.clone(), def);
            }
        }
        self.connected.store(true, Ordering::SeqCst);
        tracing::info!(count, "MCP endpoint initialized");
        Ok(())
    }

    /// Forget the endpoint connection
    pub fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.lock().clear();
    }

    async fn rpc(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let request = JsonRpcRequest::new(id, method, params);

        let response = self
            .client
            .post(&self.url)
            .timeout(self.call_timeout)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(Error::Mcp(format!("MCP endpoint returned {status}")));
        }

        let parsed: JsonRpcResponse = response.json().await?;
        if let Some(err) = parsed.error {
            return Err(Error::Mcp(format!("{} (code {})", err.message, err.code)));
        }
        Ok(parsed.result.unwrap_or(Value::Null))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ToolDefinition>> {
        self.tools.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ToolExecutor for McpEndpointExecutor {
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
        if !self.is_connected() {
            return Ok(ActionResponse::error(
                "the remote tool endpoint is not available",
            ));
        }

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_urls() {
        assert!(is_placeholder_url(""));
        assert!(is_placeholder_url("  "));
        assert!(is_placeholder_url("null"));
        assert!(is_placeholder_url("https://mcp.example.com/your-endpoint-id"));
        assert!(!is_placeholder_url("https://mcp.example.com/t/abc123"));
    }

    #[tokio::test]
    async fn test_placeholder_initialize_stays_disabled() {
        let executor = McpEndpointExecutor::new("null", Duration::from_secs(1));
        executor.initialize().await.unwrap();

        assert!(!executor.is_connected());
        assert!(executor.tools().is_empty());
    }
}
