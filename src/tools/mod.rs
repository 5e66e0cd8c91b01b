//! Unified tool dispatch
//!
//! Five execution families behind one contract: in-process plugin
//! functions, a local MCP subprocess, device-bound IoT commands, MCP
//! tunneled over the device transport, and a remote MCP endpoint. The
//! manager resolves names to owners; the handler owns lifecycle and
//! normalizes invocation shapes.

pub mod builtins;
pub mod device_iot;
pub mod device_mcp;
pub mod handler;
pub mod manager;
pub mod mcp;
pub mod mcp_endpoint;
pub mod registry;
pub mod server_mcp;
pub mod server_plugins;
pub mod types;

pub use device_iot::{DeviceIotExecutor, IotDescriptor};
pub use device_mcp::DeviceMcpExecutor;
pub use handler::{FunctionCallItem, FunctionCallPayload, UnifiedToolHandler};
pub use manager::ToolManager;
pub use mcp_endpoint::McpEndpointExecutor;
pub use registry::{FunctionRegistry, PluginFunction};
pub use server_mcp::{McpServerConfig, ServerMcpExecutor};
pub use server_plugins::ServerPluginExecutor;
pub use types::{
    Action, ActionResponse, Arguments, CallConvention, ToolDefinition, ToolExecutor, ToolType,
};
