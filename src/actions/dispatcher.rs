//! Action Dispatch
//!
//! The single seam between the engine and action implementations. The
//! engine only ever talks to a [`Dispatcher`]; which backend serves an
//! action id is decided here, from configuration:
//!
//! - [`ActionRegistry`]: in-process actions
//! - [`ProcessDispatcher`]: one executable per action in a plugin directory
//! - [`Router`]: registry first, then plugins

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use thiserror::Error;

use crate::workflow::Mapping;

use super::process::{ProcessDispatcher, DEFAULT_PLUGIN_DIR};
use super::registry::{create_builtin_registry, ActionRegistry};

/// Failures reported by a dispatcher. None of them is retried.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Unknown action '{0}'")]
    UnknownAction(String),

    #[error("Invalid action identifier '{0}'")]
    InvalidActionId(String),

    #[error("Failed to start action '{action}': {source}")]
    Spawn {
        action: String,
        #[source]
        source: io::Error,
    },

    #[error("Transport failure talking to action '{action}': {message}")]
    Transport { action: String, message: String },

    #[error("Action '{action}' produced malformed output: {message}")]
    MalformedOutput { action: String, message: String },

    #[error("Action '{action}' failed: {message}")]
    ActionFailed { action: String, message: String },

    #[error("Action '{action}' timed out after {after:?}")]
    Timeout { action: String, after: Duration },
}

impl DispatchError {
    /// Returns true if the call was abandoned because of the step deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Uniform invocation contract for actions.
///
/// Implementations receive an already-resolved input map and return the
/// action's result map untouched. They must not retry.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, action_id: &str, input: Mapping) -> Result<Mapping, DispatchError>;
}

/// Dispatcher selection settings.
#[derive(Debug, Clone)]
pub struct ActionsConfig {
    /// Register the builtin in-process actions
    pub builtins: bool,

    /// Directory of plugin executables; `None` falls back to
    /// [`DEFAULT_PLUGIN_DIR`] when that directory exists
    pub plugin_dir: Option<PathBuf>,
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            builtins: true,
            plugin_dir: None,
        }
    }
}

/// Routes each action id to the in-process registry or to a process plugin.
pub struct Router {
    registry: Arc<ActionRegistry>,
    plugins: Option<ProcessDispatcher>,
}

impl Router {
    /// Creates a router over explicit backends.
    pub fn new(registry: ActionRegistry, plugins: Option<ProcessDispatcher>) -> Self {
        Self {
            registry: Arc::new(registry),
            plugins,
        }
    }

    /// Builds the backends described by `config`.
    pub fn from_config(config: &ActionsConfig) -> Self {
        let registry = if config.builtins {
            create_builtin_registry()
        } else {
            ActionRegistry::new()
        };
        let plugins = match &config.plugin_dir {
            Some(dir) => Some(ProcessDispatcher::new(dir.clone())),
            None if DEFAULT_PLUGIN_DIR.is_dir() => Some(ProcessDispatcher::from_default_dir()),
            None => None,
        };
        if let Some(plugins) = &plugins {
            info!("Process plugins enabled: {}", plugins.plugin_dir().display());
        }

        Self::new(registry, plugins)
    }

    /// The in-process backend.
    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }
}

#[async_trait]
impl Dispatcher for Router {
    async fn dispatch(&self, action_id: &str, input: Mapping) -> Result<Mapping, DispatchError> {
        if self.registry.contains(action_id) {
            debug!("Routing '{}' to in-process registry", action_id);
            return self.registry.dispatch(action_id, input).await;
        }

        match &self.plugins {
            Some(plugins) => {
                debug!("Routing '{}' to process plugin", action_id);
                plugins.dispatch(action_id, input).await
            }
            None => Err(DispatchError::UnknownAction(action_id.to_string())),
        }
    }
}
