//! Unified tool manager
//!
//! Aggregates the executors behind one name index. The index is rebuilt
//! wholesale on `refresh_tools` and swapped in atomically, so concurrent
//! readers see either the old or the new complete mapping. Name collisions
//! resolve to the last-registered executor, deterministically: executors
//! are merged in registration order and later entries overwrite earlier
//! ones.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::session::Session;
use crate::tools::types::{
    ActionResponse, Arguments, ToolDefinition, ToolExecutor, ToolType,
};

/// Registry and dispatcher over all execution families
#[derive(Default)]
pub struct ToolManager {
    executors: Mutex<Vec<(ToolType, Arc<dyn ToolExecutor>)>>,
    index: RwLock<Arc<HashMap<String, ToolDefinition>>>,
}

impl ToolManager {
    /// Create an empty manager
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register an executor for a family; idempotent per type
    ///
    /// Re-registering a type replaces the executor but keeps its position
    /// in the merge order.
    pub fn register_executor(&self, tool_type: ToolType, executor: Arc<dyn ToolExecutor>) {
        let mut executors = self.lock_executors();
        if let Some(entry) = executors.iter_mut().find(|(t, _)| *t == tool_type) {
            entry.1 = executor;
        } else {
            executors.push((tool_type, executor));
        }
        tracing::debug!(tool_type = tool_type.as_str(), "executor registered");
    }

    /// Rebuild the unified name index from every executor
    ///
    /// Must be called after any dynamic registration (device IoT
    /// descriptors, lazy built-ins) before the new names resolve.
    pub fn refresh_tools(&self) {
        let merged: HashMap<String, ToolDefinition> = {
            let executors = self.lock_executors();
            let mut merged = HashMap::new();
            for (_, executor) in executors.iter() {
                for (name, definition) in executor.tools() {
                    merged.insert(name, definition);
                }
            }
            merged
        };

        tracing::debug!(count = merged.len(), "tool index rebuilt");
        if let Ok(mut index) = self.index.write() {
            *index = Arc::new(merged);
        }
    }

    /// Snapshot of the unified index
    #[must_use]
    pub fn index(&self) -> Arc<HashMap<String, ToolDefinition>> {
        self.index
            .read()
            .map(|guard| Arc::clone(&guard))
            .unwrap_or_default()
    }

    /// Whether the named tool resolves to an executor
    #[must_use]
    pub fn has_tool(&self, name: &str) -> bool {
        self.index().contains_key(name)
    }

    /// Names of every resolvable tool, sorted for stable logs
    #[must_use]
    pub fn get_supported_tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.index().keys().cloned().collect();
        names.sort();
        names
    }

    /// Function-calling schema for the language model
    #[must_use]
    pub fn get_function_descriptions(&self) -> Vec<serde_json::Value> {
        self.index()
            .values()
            .map(ToolDefinition::function_schema)
            .collect()
    }

    /// Tool counts per execution family
    #[must_use]
    pub fn get_tool_statistics(&self) -> HashMap<ToolType, usize> {
        let mut stats = HashMap::new();
        for definition in self.index().values() {
            *stats.entry(definition.tool_type).or_insert(0) += 1;
        }
        stats
    }

    /// Resolve and execute a tool
    ///
    /// An unregistered name returns `NOTFOUND`; an executor failure is
    /// converted to `ERROR`. No error crosses this boundary.
    pub async fn execute_tool(
        &self,
        session: &Session,
        name: &str,
        arguments: Arguments,
    ) -> ActionResponse {
        let Some(tool_type) = self.index().get(name).map(|d| d.tool_type) else {
            tracing::warn!(tool = name, "tool not registered");
            return ActionResponse::not_found(format!("the tool {name} is not available"));
        };

        let executor = {
            let executors = self.lock_executors();
            executors
                .iter()
                .find(|(t, _)| *t == tool_type)
                .map(|(_, e)| Arc::clone(e))
        };
        let Some(executor) = executor else {
            return ActionResponse::not_found(format!("the tool {name} is not available"));
        };

        tracing::debug!(tool = name, tool_type = tool_type.as_str(), "executing tool");
        match executor.execute(session, name, arguments).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(tool = name, error = %e, "tool execution failed");
                ActionResponse::error(e.to_string())
            }
        }
    }

    fn lock_executors(
        &self,
    ) -> std::sync::MutexGuard<'_, Vec<(ToolType, Arc<dyn ToolExecutor>)>> {
        self.executors.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
