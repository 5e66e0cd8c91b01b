//! Lark Edge - Voice-assistant edge server with unified tool dispatch
//!
//! This library provides the core of the Lark edge server:
//! - Per-device sessions over WebSocket with append-only dialogue history
//! - Intent resolution (exit phrases, wake words, model intent detection)
//! - Unified tool dispatch across five execution families
//! - A bounded worker pool bridging blocking tool work onto the session
//!   event loop
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                     Devices                          │
//! │        WebSocket: text │ iot │ mcp │ abort          │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                 Intent Resolution                    │
//! │   Exit  │  Wake Word  │  Intent Detect  │  Branch   │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │              Unified Tool Dispatch                   │
//! │  Plugins │ Server MCP │ IoT │ Device MCP │ Endpoint │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod bridge;
pub mod config;
pub mod dialogue;
pub mod error;
pub mod intent;
pub mod llm;
pub mod server;
pub mod session;
pub mod tools;
pub mod transport;
pub mod voice;

pub use bridge::{DispatchBridge, DispatchJob, WorkerPool};
pub use config::Config;
pub use dialogue::{Dialogue, Message, Role};
pub use error::{Error, Result};
pub use llm::{ChatConfig, LanguageModel, OpenAiChat};
pub use session::{Session, SessionParams};
pub use tools::{
    Action, ActionResponse, Arguments, CallConvention, FunctionCallItem, FunctionCallPayload,
    IotDescriptor, ToolDefinition, ToolExecutor, ToolManager, ToolType, UnifiedToolHandler,
};
pub use transport::{ChannelTransport, DeviceTransport, OutboundFrame};
pub use voice::{SpeechSink, TransportSpeech, WakeWordGreeter, WakeWordResponder};
