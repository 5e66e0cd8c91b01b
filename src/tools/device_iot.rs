//! Device IoT executor
//!
//! Tools in this family are registered per session from the descriptor
//! list the device supplies after its handshake. Executing one serializes
//! a structured command message over the device transport; the device acts
//! and replies later through a separate channel, so the dispatch result is
//! a `REQLLM` placeholder acknowledgement.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;
use crate::session::Session;
use crate::tools::types::{
    ActionResponse, Arguments, ToolDefinition, ToolExecutor, ToolType, empty_parameters,
};
use crate::transport::OutboundFrame;

/// Capability descriptor supplied by the device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IotDescriptor {
    /// Command name, used as the tool name
    pub name: String,
    /// What the command does
    #[serde(default)]
    pub description: String,
    /// JSON-schema for the command parameters
    #[serde(default)]
    pub parameters: Option<Value>,
}

/// Executes device-bound IoT commands
#[derive(Default)]
pub struct DeviceIotExecutor {
    tools: Mutex<HashMap<String, ToolDefinition>>,
}

impl DeviceIotExecutor {
    /// Create an executor with no registered device tools
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register tools from a device descriptor list
    ///
    /// Call `refresh_tools` on the manager afterwards so the new names
    /// become resolvable.
    pub fn register_iot_tools(&self, descriptors: Vec<IotDescriptor>) {
        let mut tools = self.lock();
        for descriptor in descriptors {
            tracing::info!(tool = %descriptor.name, "registered device IoT tool");
            let definition = ToolDefinition {
                name: descriptor.name.clone(),
                description: descriptor.description,
                parameters: descriptor.parameters.unwrap_or_else(empty_parameters),
                tool_type: ToolType::DeviceIot,
            };
            tools.insert(descriptor.name, definition);
        }
    }

    /// Drop all registered device tools (device went away)
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ToolDefinition>> {
        self.tools.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ToolExecutor for DeviceIotExecutor {
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
        if !self.has_tool(name) {
            return Ok(ActionResponse::not_found(format!(
                "the device does not support {name}"
            )));
        }

        let mut command = serde_json::Map::new();
        command.insert("action".to_string(), Value::String(name.to_string()));
        command.extend(arguments);

        session.transport().send(OutboundFrame::Iot {
            commands: vec![Value::Object(command)],
        })?;

        tracing::info!(session_id = %session.id(), tool = name, "IoT command sent");
        Ok(ActionResponse::req_llm(format!(
            "The {name} command was sent to the device; its reply will follow."
        )))
    }
}
