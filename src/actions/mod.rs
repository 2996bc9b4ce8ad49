//! Actions Module
//!
//! Actions are independently implemented capabilities (greeting, HTTP
//! request, SMTP probe, ...) invoked by identifier. The engine reaches them
//! only through the [`Dispatcher`] trait.
//!
//! - [`dispatcher`]: The dispatch contract, errors, and the config-driven router
//! - [`registry`]: In-process actions
//! - [`process`]: Executable plugins speaking JSON over stdin/stdout
//! - [`builtin`]: Actions shipped with probe

pub mod builtin;
pub mod dispatcher;
pub mod process;
pub mod registry;

use thiserror::Error;

use crate::workflow::Mapping;

pub use dispatcher::{ActionsConfig, DispatchError, Dispatcher, Router};
pub use process::ProcessDispatcher;
pub use registry::{create_builtin_registry, ActionRegistry};

/// Errors returned by in-process actions.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Failed(String),
}

/// An in-process action.
///
/// Receives the resolved input and returns a result map, conventionally
/// holding `request` and `response` sub-maps. Must not touch anything
/// besides its input and output.
pub trait Action: Send + Sync {
    fn run(&self, input: &Mapping) -> Result<Mapping, ActionError>;
}

impl<F> Action for F
where
    F: Fn(&Mapping) -> Result<Mapping, ActionError> + Send + Sync,
{
    fn run(&self, input: &Mapping) -> Result<Mapping, ActionError> {
        self(input)
    }
}
