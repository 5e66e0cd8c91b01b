//! In-process plugin function registry
//!
//! An explicit registry object owned by the tool manager wiring — there is
//! no process-wide registration state. Functions are registered at handler
//! initialization (and lazily for on-demand built-ins) and invoked by the
//! server plugin executor according to their calling convention.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::Result;
use crate::session::Session;
use crate::tools::types::{ActionResponse, Arguments, CallConvention, ToolDefinition};

/// Plugin function taking arguments only
pub type PlainFn = dyn Fn(&Arguments) -> Result<ActionResponse> + Send + Sync;

/// Plugin function that also receives the session
pub type SessionFn = dyn Fn(&Session, &Arguments) -> Result<ActionResponse> + Send + Sync;

enum PluginBody {
    Plain(Arc<PlainFn>),
    WithSession(Arc<SessionFn>),
}

/// A registered plugin function with its definition and calling convention
pub struct PluginFunction {
    definition: ToolDefinition,
    convention: CallConvention,
    body: PluginBody,
}

impl PluginFunction {
    /// Register a plain function (the `WAIT` convention)
    #[must_use]
    pub fn plain<F>(definition: ToolDefinition, body: F) -> Self
    where
        F: Fn(&Arguments) -> Result<ActionResponse> + Send + Sync + 'static,
    {
        Self {
            definition,
            convention: CallConvention::Wait,
            body: PluginBody::Plain(Arc::new(body)),
        }
    }

    /// Register a session-taking function under one of the session
    /// conventions (`SYSTEM_CTL`, `IOT_CTL`, `CHANGE_SYS_PROMPT`)
    #[must_use]
    pub fn with_session<F>(definition: ToolDefinition, convention: CallConvention, body: F) -> Self
    where
        F: Fn(&Session, &Arguments) -> Result<ActionResponse> + Send + Sync + 'static,
    {
        debug_assert!(convention.requires_session());
        Self {
            definition,
            convention,
            body: PluginBody::WithSession(Arc::new(body)),
        }
    }

    /// The function's tool definition
    #[must_use]
    pub fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    /// The function's calling convention
    #[must_use]
    pub const fn convention(&self) -> CallConvention {
        self.convention
    }

    /// Invoke without the session
    ///
    /// # Errors
    ///
    /// Propagates the function's own error.
    pub fn call_plain(&self, arguments: &Arguments) -> Result<ActionResponse> {
        match &self.body {
            PluginBody::Plain(f) => f(arguments),
            PluginBody::WithSession(_) => Err(crate::Error::Tool(format!(
                "plugin function {} requires a session",
                self.definition.name
            ))),
        }
    }

    /// Invoke with the session
    ///
    /// Plain bodies simply ignore the session.
    ///
    /// # Errors
    ///
    /// Propagates the function's own error.
    pub fn call_with_session(&self, session: &Session, arguments: &Arguments) -> Result<ActionResponse> {
        match &self.body {
            PluginBody::WithSession(f) => f(session, arguments),
            PluginBody::Plain(f) => f(arguments),
        }
    }
}

/// Explicit registry of plugin functions, keyed by tool name
#[derive(Default)]
pub struct FunctionRegistry {
    functions: Mutex<HashMap<String, Arc<PluginFunction>>>,
}

impl FunctionRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function; an existing entry under the same name is replaced
    pub fn register(&self, function: PluginFunction) {
        let name = function.definition().name.clone();
        let mut functions = self.lock();
        if functions.insert(name.clone(), Arc::new(function)).is_some() {
            tracing::debug!(name = %name, "plugin function replaced");
        } else {
            tracing::debug!(name = %name, "plugin function registered");
        }
    }

    /// Remove a function by name
    pub fn unregister(&self, name: &str) -> bool {
        self.lock().remove(name).is_some()
    }

    /// Look up a function by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<PluginFunction>> {
        self.lock().get(name).cloned()
    }

    /// Whether a function is registered under `name`
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    /// Definitions of every registered function
    #[must_use]
    pub fn definitions(&self) -> HashMap<String, ToolDefinition> {
        self.lock()
            .iter()
            .map(|(name, f)| (name.clone(), f.definition().clone()))
            .collect()
    }

    /// Number of registered functions
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<PluginFunction>>> {
        self.functions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::types::ToolType;

    fn plain_function(name: &str) -> PluginFunction {
        PluginFunction::plain(
            ToolDefinition::new(name, "test function", ToolType::ServerPlugin),
            |_args| Ok(ActionResponse::respond("ok")),
        )
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = FunctionRegistry::new();
        assert!(registry.is_empty());

        registry.register(plain_function("get_time"));
        assert!(registry.contains("get_time"));
        assert_eq!(registry.len(), 1);

        let func = registry.get("get_time").unwrap();
        assert_eq!(func.convention(), CallConvention::Wait);
        let resp = func.call_plain(&Arguments::new()).unwrap();
        assert_eq!(resp.response.as_deref(), Some("ok"));
    }

    #[test]
    fn test_reregistration_replaces() {
        let registry = FunctionRegistry::new();
        registry.register(plain_function("get_time"));
        registry.register(PluginFunction::plain(
            ToolDefinition::new("get_time", "second registration", ToolType::ServerPlugin),
            |_args| Ok(ActionResponse::respond("replaced")),
        ));

        assert_eq!(registry.len(), 1);
        let resp = registry
            .get("get_time")
            .unwrap()
            .call_plain(&Arguments::new())
            .unwrap();
        assert_eq!(resp.response.as_deref(), Some("replaced"));
    }

    #[test]
    fn test_unregister() {
        let registry = FunctionRegistry::new();
        registry.register(plain_function("get_time"));
        assert!(registry.unregister("get_time"));
        assert!(!registry.unregister("get_time"));
        assert!(!registry.contains("get_time"));
    }

    #[test]
    fn test_session_function_rejects_plain_call() {
        let func = PluginFunction::with_session(
            ToolDefinition::new("set_mode", "needs session", ToolType::ServerPlugin),
            CallConvention::SystemCtl,
            |_session, _args| Ok(ActionResponse::respond("done")),
        );
        assert!(func.call_plain(&Arguments::new()).is_err());
    }
}
