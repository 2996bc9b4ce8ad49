//! In-process action registry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use log::debug;

use crate::workflow::Mapping;

use super::builtin::Hello;
use super::dispatcher::{DispatchError, Dispatcher};
use super::{Action, ActionError};

/// Action registry - maps action ids to in-process implementations.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn Action>>,
}

impl ActionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            actions: HashMap::new(),
        }
    }

    /// Registers an action, replacing any previous one with the same id.
    pub fn register(&mut self, action_id: &str, action: Arc<dyn Action>) {
        self.actions.insert(action_id.to_string(), action);
    }

    /// Gets an action by id.
    pub fn get(&self, action_id: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(action_id).cloned()
    }

    /// Returns true if `action_id` is registered.
    pub fn contains(&self, action_id: &str) -> bool {
        self.actions.contains_key(action_id)
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.actions.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Runs an action synchronously on the calling thread.
    pub fn run(&self, action_id: &str, input: &Mapping) -> Result<Mapping, DispatchError> {
        let action = self
            .get(action_id)
            .ok_or_else(|| DispatchError::UnknownAction(action_id.to_string()))?;

        action.run(input).map_err(|e| into_dispatch_error(action_id, e))
    }
}

fn into_dispatch_error(action_id: &str, error: ActionError) -> DispatchError {
    DispatchError::ActionFailed {
        action: action_id.to_string(),
        message: error.to_string(),
    }
}

#[async_trait]
impl Dispatcher for ActionRegistry {
    /// Actions may block, so they run on the blocking thread pool.
    async fn dispatch(&self, action_id: &str, input: Mapping) -> Result<Mapping, DispatchError> {
        let action = self
            .get(action_id)
            .ok_or_else(|| DispatchError::UnknownAction(action_id.to_string()))?;

        debug!("Running in-process action '{}'", action_id);

        let outcome = tokio::task::spawn_blocking(move || action.run(&input))
            .await
            .map_err(|e| DispatchError::Transport {
                action: action_id.to_string(),
                message: e.to_string(),
            })?;

        outcome.map_err(|e| into_dispatch_error(action_id, e))
    }
}

/// Creates a registry holding every builtin action.
pub fn create_builtin_registry() -> ActionRegistry {
    let mut registry = ActionRegistry::new();
    registry.register("hello", Arc::new(Hello));
    registry
}
