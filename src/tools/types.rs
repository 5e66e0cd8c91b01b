//! Core tool dispatch types
//!
//! Every execution family — in-process plugin functions, local MCP
//! subprocesses, device-bound IoT commands, device-tunneled MCP, and remote
//! MCP endpoints — implements the same small executor contract and reports
//! results through [`ActionResponse`].

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Result;
use crate::session::Session;

/// Arguments passed to a tool invocation
pub type Arguments = Map<String, Value>;

/// What the intent flow should do after a tool has run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Nothing further to do
    None,
    /// Speak `response` directly
    Response,
    /// Feed `result` back to the language model for a refined reply
    ReqLlm,
    /// The tool name resolved to no executor
    NotFound,
    /// The invocation failed
    Error,
}

/// Uniform result of any tool invocation
///
/// Produced exactly once per invocation; `action` is always set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResponse {
    /// Next-step directive
    pub action: Action,
    /// Opaque text fed back to the language model
    pub result: Option<String>,
    /// User-facing text
    pub response: Option<String>,
    /// Fragment used when combining batch results
    pub content: Option<String>,
}

impl ActionResponse {
    /// Build a response with the given action and no text
    #[must_use]
    pub const fn new(action: Action) -> Self {
        Self {
            action,
            result: None,
            response: None,
            content: None,
        }
    }

    /// A `Response` result that speaks `text` directly
    #[must_use]
    pub fn respond(text: impl Into<String>) -> Self {
        Self {
            response: Some(text.into()),
            ..Self::new(Action::Response)
        }
    }

    /// A `ReqLlm` result carrying text for the follow-up completion
    #[must_use]
    pub fn req_llm(result: impl Into<String>) -> Self {
        Self {
            result: Some(result.into()),
            ..Self::new(Action::ReqLlm)
        }
    }

    /// A `NotFound` result with a spoken explanation
    #[must_use]
    pub fn not_found(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            result: Some(text.clone()),
            response: Some(text),
            ..Self::new(Action::NotFound)
        }
    }

    /// An `Error` result with a spoken explanation
    #[must_use]
    pub fn error(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            result: Some(text.clone()),
            response: Some(text),
            ..Self::new(Action::Error)
        }
    }

    /// Attach a combination fragment
    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }
}

/// Which execution family owns a tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolType {
    /// In-process registered function, no device needed
    ServerPlugin,
    /// MCP service run as a local subprocess
    ServerMcp,
    /// Command dispatched to the physical device over its transport
    DeviceIot,
    /// MCP tunneled over the device transport
    DeviceMcp,
    /// MCP over a remote network endpoint
    McpEndpoint,
}

impl ToolType {
    /// Stable name used in logs and statistics
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ServerPlugin => "server_plugin",
            Self::ServerMcp => "server_mcp",
            Self::DeviceIot => "device_iot",
            Self::DeviceMcp => "device_mcp",
            Self::McpEndpoint => "mcp_endpoint",
        }
    }
}

/// Calling convention of a server plugin function
///
/// Decides whether the session is passed to the underlying function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallConvention {
    /// Plain function, arguments only
    Wait,
    /// System control, needs the session
    SystemCtl,
    /// Device IO control, needs the session
    IotCtl,
    /// Rewrites the session's system prompt, needs the session
    ChangeSysPrompt,
}

impl CallConvention {
    /// Whether functions with this convention receive the session
    #[must_use]
    pub const fn requires_session(self) -> bool {
        match self {
            Self::Wait => false,
            Self::SystemCtl | Self::IotCtl | Self::ChangeSysPrompt => true,
        }
    }
}

/// Static description of a callable tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Globally unique tool name
    pub name: String,
    /// Human/model-readable description
    pub description: String,
    /// JSON-schema object describing the parameters
    pub parameters: Value,
    /// Execution family that owns this tool
    pub tool_type: ToolType,
}

impl ToolDefinition {
    /// Create a definition with an empty-object parameter schema
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>, tool_type: ToolType) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: empty_parameters(),
            tool_type,
        }
    }

    /// Replace the parameter schema
    #[must_use]
    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    /// Function-calling schema entry handed to the language model
    #[must_use]
    pub fn function_schema(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// An empty JSON-schema parameter object
#[must_use]
pub fn empty_parameters() -> Value {
    serde_json::json!({ "type": "object", "properties": {}, "required": [] })
}

/// Contract implemented by every execution family
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Tools currently owned by this executor, keyed by name
    fn tools(&self) -> HashMap<String, ToolDefinition>;

    /// Whether this executor owns the named tool
    fn has_tool(&self, name: &str) -> bool;

    /// Invoke the named tool
    ///
    /// # Errors
    ///
    /// Returns an error for infrastructure failures; the manager converts
    /// any error into an `ActionResponse` so nothing escapes the dispatch
    /// boundary.
    async fn execute(
        &self,
        session: &Session,
        name: &str,
        arguments: Arguments,
    ) -> Result<ActionResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calling_convention_table() {
        assert!(!CallConvention::Wait.requires_session());
        assert!(CallConvention::SystemCtl.requires_session());
        assert!(CallConvention::IotCtl.requires_session());
        assert!(CallConvention::ChangeSysPrompt.requires_session());
    }

    #[test]
    fn test_function_schema_shape() {
        let def = ToolDefinition::new("get_time", "Report the current time", ToolType::ServerPlugin);
        let schema = def.function_schema();

        assert_eq!(schema["type"], "function");
        assert_eq!(schema["function"]["name"], "get_time");
        assert_eq!(schema["function"]["parameters"]["type"], "object");
    }

    #[test]
    fn test_error_response_is_speakable() {
        let resp = ActionResponse::error("tool blew up");
        assert_eq!(resp.action, Action::Error);
        assert_eq!(resp.result.as_deref(), Some("tool blew up"));
        assert_eq!(resp.response.as_deref(), Some("tool blew up"));
    }
}
