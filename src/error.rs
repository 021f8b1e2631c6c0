//! Error taxonomy for the runtime.
//!
//! Mirrors the error kinds spec'd for the module/queue runtime: type
//! violations are fatal to a worker, invalid subscriptions and invalid
//! update-types are caller-visible, and module hook failures are logged and
//! either scoped to the failing module or (during setup) abort the whole
//! network run.

use std::any::TypeId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue has already been removed")]
    AlreadyRemoved,
}

#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("module '{module}' received an IU not in its declared input classes: {type_id:?}")]
    TypeViolation { module: String, type_id: TypeId },

    #[error("module '{module}' produced an IU not its declared output class: {type_id:?}")]
    OutputTypeViolation { module: String, type_id: TypeId },

    #[error("consuming modules cannot be subscribed to")]
    ConsumingModuleCannotBeSubscribed,

    #[error("module config is inconsistent for its kind: {0}")]
    InvalidConfig(String),

    #[error("'{0}' is not supported by this module kind")]
    Unsupported(&'static str),

    #[error("module hook failed: {0}")]
    HookFailed(String),

    #[error("'{0}' is not a valid update type in strict mode")]
    InvalidUpdateType(String),
}

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("module '{0}' failed during setup, aborting run")]
    SetupFailed(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("no factory registered for class id '{0}'")]
    UnknownClass(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] Box<bincode::ErrorKind>),
}
