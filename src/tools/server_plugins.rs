//! Server plugin executor
//!
//! Owns the in-process function family. Dispatch is table-driven by the
//! function's calling convention; failures inside a function body become
//! `ERROR` responses and never escape the executor.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::Result;
use crate::session::Session;
use crate::tools::registry::FunctionRegistry;
use crate::tools::types::{ActionResponse, Arguments, ToolDefinition, ToolExecutor};

/// Executes in-process plugin functions
pub struct ServerPluginExecutor {
    registry: Arc<FunctionRegistry>,
}

impl ServerPluginExecutor {
    /// Create an executor over the given registry
    #[must_use]
    pub fn new(registry: Arc<FunctionRegistry>) -> Arc<Self> {
        Arc::new(Self { registry })
    }

    /// The registry this executor dispatches against
    #[must_use]
    pub fn registry(&self) -> &Arc<FunctionRegistry> {
        &self.registry
    }
}

#[async_trait]
impl ToolExecutor for ServerPluginExecutor {
    fn tools(&self) -> HashMap<String, ToolDefinition> {
        self.registry.definitions()
    }

    fn has_tool(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    async fn execute(
        &self,
        session: &Session,
        name: &str,
        arguments: Arguments,
    ) -> Result<ActionResponse> {
        let Some(function) = self.registry.get(name) else {
            return Ok(ActionResponse::not_found(format!(
                "plugin function {name} does not exist"
            )));
        };

        let outcome = if function.convention().requires_session() {
            function.call_with_session(session, &arguments)
        } else {
            function.call_plain(&arguments)
        };

        Ok(outcome.unwrap_or_else(|e| {
            tracing::warn!(tool = name, error = %e, "plugin function failed");
            ActionResponse::error(e.to_string())
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::WorkerPool;
    use crate::session::{Session, SessionParams};
    use crate::tools::registry::PluginFunction;
    use crate::tools::types::{Action, CallConvention, ToolType};
    use crate::transport::ChannelTransport;
    use crate::voice::TransportSpeech;

    fn test_session() -> Arc<Session> {
        let (transport, _frames) = ChannelTransport::channel();
        let speech = TransportSpeech::new(transport.clone());
        let (session, _jobs) = Session::new(SessionParams {
            id: "sess_t".to_string(),
            device_id: "dev_t".to_string(),
            system_prompt: None,
            exit_phrases: Vec::new(),
            dispatch_queue: 1,
            transport,
            speech,
            model: None,
            intent_analysis: true,
            wake_word: None,
            workers: WorkerPool::new(1),
        });
        session
    }

    #[tokio::test]
    async fn test_unknown_function_is_not_found() {
        let executor = ServerPluginExecutor::new(Arc::new(FunctionRegistry::new()));
        let session = test_session();

        let resp = executor
            .execute(&session, "missing", Arguments::new())
            .await
            .unwrap();
        assert_eq!(resp.action, Action::NotFound);
    }

    #[tokio::test]
    async fn test_failing_function_becomes_error_response() {
        let registry = Arc::new(FunctionRegistry::new());
        registry.register(PluginFunction::plain(
            ToolDefinition::new("broken", "always fails", ToolType::ServerPlugin),
            |_args| Err(crate::Error::Tool("wires crossed".to_string())),
        ));
        let executor = ServerPluginExecutor::new(registry);
        let session = test_session();

        let resp = executor
            .execute(&session, "broken", Arguments::new())
            .await
            .unwrap();
        assert_eq!(resp.action, Action::Error);
        assert!(resp.response.unwrap().contains("wires crossed"));
    }

    #[tokio::test]
    async fn test_session_convention_receives_session() {
        let registry = Arc::new(FunctionRegistry::new());
        registry.register(PluginFunction::with_session(
            ToolDefinition::new("whoami", "echo the session id", ToolType::ServerPlugin),
            CallConvention::SystemCtl,
            |session, _args| Ok(ActionResponse::respond(session.id().to_string())),
        ));
        let executor = ServerPluginExecutor::new(registry);
        let session = test_session();

        let resp = executor
            .execute(&session, "whoami", Arguments::new())
            .await
            .unwrap();
        assert_eq!(resp.response.as_deref(), Some("sess_t"));
    }
}
