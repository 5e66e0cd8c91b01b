//! Shared MCP wire types
//!
//! The three MCP-backed execution families (local subprocess, device
//! tunnel, remote endpoint) speak the same JSON-RPC 2.0 subset:
//! `initialize`, `tools/list`, and `tools/call`. This module holds the
//! message types, result mapping, and the pending-call table used to
//! correlate replies on stream transports.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::oneshot;

use crate::tools::types::{Arguments, ToolDefinition, ToolType, empty_parameters};
use crate::{Error, Result};

/// JSON-RPC protocol version
pub const JSONRPC_VERSION: &str = "2.0";

/// MCP protocol revision advertised during `initialize`
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// A JSON-RPC request frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol version, always `"2.0"`
    pub jsonrpc: String,
    /// Correlation id
    pub id: u64,
    /// Method name
    pub method: String,
    /// Method parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Build a request frame
    #[must_use]
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC response frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Correlation id; absent on notifications
    #[serde(default)]
    pub id: Option<u64>,
    /// Success payload
    #[serde(default)]
    pub result: Option<Value>,
    /// Failure payload
    #[serde(default)]
    pub error: Option<RpcError>,
}

/// JSON-RPC error object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    /// Error code
    pub code: i64,
    /// Human-readable message
    pub message: String,
}

/// Tool entry from a `tools/list` result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpToolInfo {
    /// Tool name
    pub name: String,
    /// Tool description
    #[serde(default)]
    pub description: Option<String>,
    /// JSON-schema for the arguments
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Option<Value>,
}

impl McpToolInfo {
    /// Convert to a [`ToolDefinition`] owned by the given family
    #[must_use]
    pub fn into_definition(self, tool_type: ToolType) -> ToolDefinition {
        ToolDefinition {
            name: self.name,
            description: self.description.unwrap_or_default(),
            parameters: self.input_schema.unwrap_or_else(empty_parameters),
            tool_type,
        }
    }
}

/// Parameters for the `initialize` handshake
#[must_use]
pub fn initialize_params(client_name: &str, client_version: &str) -> Value {
    json!({
        "protocolVersion": MCP_PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": { "name": client_name, "version": client_version },
    })
}

/// Parameters for a `tools/call` request
#[must_use]
pub fn tool_call_params(name: &str, arguments: &Arguments) -> Value {
    json!({ "name": name, "arguments": arguments })
}

/// Extract tool entries from a `tools/list` result
#[must_use]
pub fn parse_tools_list(result: &Value) -> Vec<McpToolInfo> {
    result
        .get("tools")
        .and_then(Value::as_array)
        .map(|tools| {
            tools
                .iter()
                .filter_map(|t| serde_json::from_value(t.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Flatten a `tools/call` result into text plus an error flag
///
/// Joins the `text` entries of the content array; `isError` marks a tool
/// failure reported inside an otherwise successful RPC round trip.
#[must_use]
pub fn tool_result_text(result: &Value) -> (String, bool) {
    let is_error = result
        .get("isError")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let text = result
        .get("content")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|e| e.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| result.to_string());

    (text, is_error)
}

/// Correlates stream-transport replies with waiting callers
#[derive(Default)]
pub struct PendingCalls {
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<Result<Value>>>>,
}

impl PendingCalls {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a request id and register a reply slot for it
    pub fn register(&self) -> (u64, oneshot::Receiver<Result<Value>>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = oneshot::channel();
        if let Ok(mut pending) = self.pending.lock() {
            pending.insert(id, tx);
        }
        (id, rx)
    }

    /// Drop a registration that will never be answered
    pub fn forget(&self, id: u64) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(&id);
        }
    }

    /// Deliver a reply; returns false when nothing was waiting for `id`
    pub fn resolve(&self, id: u64, outcome: Result<Value>) -> bool {
        let waiter = self
            .pending
            .lock()
            .ok()
            .and_then(|mut pending| pending.remove(&id));
        match waiter {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }

    /// Route a parsed response frame to its waiter
    pub fn resolve_response(&self, response: JsonRpcResponse) -> bool {
        let Some(id) = response.id else {
            return false;
        };
        let outcome = match (response.result, response.error) {
            (_, Some(err)) => Err(Error::Mcp(format!("{} (code {})", err.message, err.code))),
            (Some(result), None) => Ok(result),
            (None, None) => Ok(Value::Null),
        };
        self.resolve(id, outcome)
    }

    /// Fail every waiter, e.g. when the peer went away
    pub fn fail_all(&self, reason: &str) {
        let drained: Vec<_> = self
            .pending
            .lock()
            .map(|mut pending| pending.drain().collect())
            .unwrap_or_default();
        for (_, tx) in drained {
            let _ = tx.send(Err(Error::Mcp(reason.to_string())));
        }
    }
}
