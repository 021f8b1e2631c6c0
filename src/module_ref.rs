//! Lightweight, non-owning module identity.
//!
//! Spec.md is explicit that IU lineage fields ("all optional references by
//! identity, not ownership") must not keep a module alive. An `Arc<ModuleNode>`
//! stored on an IU that a module's own `current_output` list also holds would
//! create a reference cycle (module -> IU -> module). `ModuleRef` sidesteps
//! that: it is `Copy`-cheap identity plus a display name, never a handle you
//! can call methods through.

use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleId(Uuid);

impl ModuleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ModuleId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ModuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity + display name for a module, held by IUs and processed-lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRef {
    pub id: ModuleId,
    pub name: Arc<str>,
}

impl ModuleRef {
    pub fn new(id: ModuleId, name: impl Into<Arc<str>>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ModuleRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}
