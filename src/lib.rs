//! Runtime for incremental dialogue processing pipelines.
//!
//! A pipeline is a graph of [`module::ModuleNode`]s exchanging
//! [`update_message::UpdateMessage`]s full of [`iu::IncrementalUnit`]s over
//! [`queue::IncrementalQueue`]s. [`network`] discovers, runs, and persists
//! whole graphs of modules at once.

pub mod config;
pub mod error;
pub mod iu;
pub mod logging;
pub mod module;
pub mod module_ref;
pub mod network;
pub mod queue;
pub mod update_message;

pub use config::Config;
pub use iu::IncrementalUnit;
pub use module::{ModuleBehavior, ModuleHandle, ModuleKind, ModuleNode};
pub use module_ref::{ModuleId, ModuleRef};
pub use network::{ModuleRegistry, Network};
pub use queue::IncrementalQueue;
pub use update_message::{UpdateMessage, UpdateType};
