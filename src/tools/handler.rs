//! Unified tool handler
//!
//! Single entry point the intent flow dispatches through. Owns the
//! executor lifecycle for a session: ordered initialization, dynamic
//! registration, and best-effort cleanup. Normalizes the two invocation
//! shapes the model can produce (single call and batch) before handing
//! them to the manager.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ToolsConfig;
use crate::session::Session;
use crate::tools::builtins;
use crate::tools::device_iot::{DeviceIotExecutor, IotDescriptor};
use crate::tools::device_mcp::DeviceMcpExecutor;
use crate::tools::manager::ToolManager;
use crate::tools::mcp_endpoint::McpEndpointExecutor;
use crate::tools::registry::FunctionRegistry;
use crate::tools::server_mcp::ServerMcpExecutor;
use crate::tools::server_plugins::ServerPluginExecutor;
use crate::tools::types::{Action, ActionResponse, Arguments, ToolExecutor, ToolType};
use crate::{Error, Result};

/// One function call as carried in the internal payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCallItem {
    /// Tool name
    pub name: String,
    /// Fresh unique identifier minted by the intent flow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Arguments: a JSON-encoded string, a structured object, or absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

/// Handler input: a single call or a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FunctionCallPayload {
    /// Batch of calls, executed sequentially
    Batch {
        /// The calls in execution order
        function_calls: Vec<FunctionCallItem>,
    },
    /// One call
    Single(FunctionCallItem),
}

/// Decode the `arguments` field of a call into a map
///
/// Strings are parsed as JSON first; absent and null both mean "no
/// arguments".
///
/// # Errors
///
/// Returns an error when the value is neither an object nor a JSON string
/// encoding one.
pub fn decode_arguments(arguments: Option<&Value>) -> Result<Arguments> {
    match arguments {
        None | Some(Value::Null) => Ok(Arguments::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(Arguments::new());
            }
            match serde_json::from_str::<Value>(trimmed) {
                Ok(Value::Object(map)) => Ok(map),
                Ok(other) => Err(Error::Tool(format!(
                    "function arguments must be a JSON object, got {other}"
                ))),
                Err(e) => Err(Error::Tool(format!("undecodable function arguments: {e}"))),
            }
        }
        Some(other) => Err(Error::Tool(format!(
            "function arguments must be a JSON object, got {other}"
        ))),
    }
}

/// Orchestrates the tool manager and executors for one session
pub struct UnifiedToolHandler {
    manager: Arc<ToolManager>,
    registry: Arc<FunctionRegistry>,
    server_mcp: Arc<ServerMcpExecutor>,
    device_iot: Arc<DeviceIotExecutor>,
    device_mcp: Arc<DeviceMcpExecutor>,
    mcp_endpoint: Arc<McpEndpointExecutor>,
    device_prompt: Option<String>,
    finish_init: AtomicBool,
}

impl UnifiedToolHandler {
    /// Assemble the handler and register every executor with the manager
    #[must_use]
    pub fn new(config: &ToolsConfig) -> Arc<Self> {
        let call_timeout = Duration::from_secs(config.call_timeout_secs);
        let manager = ToolManager::new();
        let registry = Arc::new(FunctionRegistry::new());

        let server_plugins = ServerPluginExecutor::new(Arc::clone(&registry));
        let server_mcp = ServerMcpExecutor::new(config.server_mcp.clone(), call_timeout);
        let device_iot = DeviceIotExecutor::new();
        let device_mcp = DeviceMcpExecutor::new(call_timeout);
        let mcp_endpoint = McpEndpointExecutor::new(config.mcp_endpoint.clone(), call_timeout);

        manager.register_executor(ToolType::ServerPlugin, server_plugins);
        manager.register_executor(
            ToolType::ServerMcp,
            Arc::clone(&server_mcp) as Arc<dyn ToolExecutor>,
        );
        manager.register_executor(
            ToolType::DeviceIot,
            Arc::clone(&device_iot) as Arc<dyn ToolExecutor>,
        );
        manager.register_executor(
            ToolType::DeviceMcp,
            Arc::clone(&device_mcp) as Arc<dyn ToolExecutor>,
        );
        manager.register_executor(
            ToolType::McpEndpoint,
            Arc::clone(&mcp_endpoint) as Arc<dyn ToolExecutor>,
        );

        Arc::new(Self {
            manager,
            registry,
            server_mcp,
            device_iot,
            device_mcp,
            mcp_endpoint,
            device_prompt: config.device_prompt.clone(),
            finish_init: AtomicBool::new(false),
        })
    }

    /// Ordered asynchronous initialization
    ///
    /// Each step fails non-fatally: a broken integration degrades the tool
    /// set but the handler still becomes ready.
    pub async fn initialize(&self, session: &Session) {
        builtins::register_defaults(&self.registry);

        if let Err(e) = self.server_mcp.initialize().await {
            tracing::error!(error = %e, "server MCP initialization failed");
        }
        if let Err(e) = self.mcp_endpoint.initialize().await {
            tracing::error!(error = %e, "MCP endpoint initialization failed");
        }
        if let Some(prompt) = &self.device_prompt {
            session.with_dialogue(|d| d.augment_system(prompt));
        }

        self.manager.refresh_tools();
        self.finish_init.store(true, Ordering::SeqCst);
        tracing::info!(session_id = %session.id(), "unified tool handler initialized");
        self.current_support_functions();
    }

    /// Whether initialization has completed
    #[must_use]
    pub fn finished_init(&self) -> bool {
        self.finish_init.load(Ordering::SeqCst)
    }

    /// The plugin function registry
    #[must_use]
    pub fn registry(&self) -> &Arc<FunctionRegistry> {
        &self.registry
    }

    /// The device MCP executor, for wiring inbound tunnel payloads
    #[must_use]
    pub fn device_mcp(&self) -> &Arc<DeviceMcpExecutor> {
        &self.device_mcp
    }

    /// The device IoT executor
    #[must_use]
    pub fn device_iot(&self) -> &Arc<DeviceIotExecutor> {
        &self.device_iot
    }

    /// Function-calling schema for the language model
    #[must_use]
    pub fn get_functions(&self) -> Vec<Value> {
        self.manager.get_function_descriptions()
    }

    /// Log and return the currently supported tool names
    pub fn current_support_functions(&self) -> Vec<String> {
        let names = self.manager.get_supported_tool_names();
        tracing::info!(functions = ?names, "supported functions");
        names
    }

    /// Rebuild the unified tool index
    pub fn refresh_tools(&self) {
        self.manager.refresh_tools();
    }

    /// Whether the named tool resolves
    #[must_use]
    pub fn has_tool(&self, name: &str) -> bool {
        self.manager.has_tool(name)
    }

    /// Tool counts per execution family
    #[must_use]
    pub fn get_tool_statistics(&self) -> std::collections::HashMap<ToolType, usize> {
        self.manager.get_tool_statistics()
    }

    /// Register device IoT tools and make them resolvable
    pub fn register_iot_tools(&self, descriptors: Vec<IotDescriptor>) {
        let count = descriptors.len();
        self.device_iot.register_iot_tools(descriptors);
        self.manager.refresh_tools();
        tracing::info!(count, "registered device IoT tools");
    }

    /// Handle a function call from the language model
    ///
    /// Always returns a response; failures are converted, never thrown.
    pub async fn handle_llm_function_call(
        &self,
        session: &Session,
        payload: FunctionCallPayload,
    ) -> ActionResponse {
        match payload {
            FunctionCallPayload::Batch { function_calls } => {
                let mut responses = Vec::with_capacity(function_calls.len());
                for call in function_calls {
                    let response = match decode_arguments(call.arguments.as_ref()) {
                        Ok(arguments) => {
                            self.manager.execute_tool(session, &call.name, arguments).await
                        }
                        Err(e) => {
                            tracing::error!(tool = %call.name, error = %e, "undecodable arguments");
                            ActionResponse::error("could not decode function arguments")
                        }
                    };
                    responses.push(response);
                }
                Self::combine_responses(responses)
            }
            FunctionCallPayload::Single(call) => {
                let arguments = match decode_arguments(call.arguments.as_ref()) {
                    Ok(arguments) => arguments,
                    Err(e) => {
                        tracing::error!(tool = %call.name, error = %e, "undecodable arguments");
                        return ActionResponse::error("could not decode function arguments");
                    }
                };
                tracing::debug!(tool = %call.name, id = ?call.id, "handling function call");
                self.manager.execute_tool(session, &call.name, arguments).await
            }
        }
    }

    /// Combine batch results
    ///
    /// Fail-fast on the first `ERROR` in call order; otherwise join the
    /// fragments and escalate to `REQLLM` if any sub-call asked for it.
    fn combine_responses(responses: Vec<ActionResponse>) -> ActionResponse {
        if responses.is_empty() {
            return ActionResponse::new(Action::None);
        }

        if let Some(error) = responses.iter().find(|r| r.action == Action::Error) {
            return error.clone();
        }

        let contents: Vec<String> = responses.iter().filter_map(|r| r.content.clone()).collect();
        let spoken: Vec<String> = responses.iter().filter_map(|r| r.response.clone()).collect();
        let action = if responses.iter().any(|r| r.action == Action::ReqLlm) {
            Action::ReqLlm
        } else {
            Action::Response
        };

        ActionResponse {
            action,
            result: (!contents.is_empty()).then(|| contents.join("; ")),
            response: (!spoken.is_empty()).then(|| spoken.join("; ")),
            content: None,
        }
    }

    /// Best-effort teardown: collect failures, log them, keep going
    pub async fn cleanup(&self) {
        let mut failures: Vec<Error> = Vec::new();

        if let Err(e) = self.server_mcp.cleanup().await {
            failures.push(e);
        }
        self.mcp_endpoint.close();
        self.device_mcp.disconnected();
        self.device_iot.clear();

        for failure in &failures {
            tracing::error!(error = %failure, "tool handler cleanup failure");
        }
        tracing::info!(failures = failures.len(), "tool handler cleanup complete");
    }
}
