//! Update messages: the unit of delivery between modules.
//!
//! An `UpdateMessage` bundles IUs with the action a downstream module should
//! take for each (add, update, revoke, or commit). Modules never see a bare
//! IU — they always see it paired with an `UpdateType`.

use crate::error::ModuleError;
use crate::iu::IncrementalUnit;
use crate::module_ref::ModuleRef;
use std::any::TypeId;
use std::sync::Arc;

/// The closed edit-kind set from spec.md §3, plus `Custom` for a tag
/// outside it. `Custom` only ever reaches a module in permissive mode, or
/// in strict mode when its string names one of the four canonical kinds
/// (in which case `canonicalize` replaces it with the matching builtin
/// variant) — see `original_source/retico_core/core/abstract.py`'s
/// `UpdateType(update_type)` str-to-enum constructor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UpdateType {
    Add,
    Update,
    Revoke,
    Commit,
    Custom(String),
}

impl UpdateType {
    /// Strict-mode coercion: a builtin variant passes through unchanged; a
    /// `Custom` tag whose string is one of `"add"`/`"update"`/`"revoke"`/
    /// `"commit"` becomes that builtin variant; any other `Custom` string is
    /// rejected. In permissive mode (`strict == false`) every tag, builtin
    /// or `Custom`, passes through unchanged.
    pub fn canonicalize(self, strict: bool) -> Result<Self, ModuleError> {
        if !strict {
            return Ok(self);
        }
        match self {
            UpdateType::Add | UpdateType::Update | UpdateType::Revoke | UpdateType::Commit => Ok(self),
            UpdateType::Custom(tag) => match tag.as_str() {
                "add" => Ok(UpdateType::Add),
                "update" => Ok(UpdateType::Update),
                "revoke" => Ok(UpdateType::Revoke),
                "commit" => Ok(UpdateType::Commit),
                _ => Err(ModuleError::InvalidUpdateType(tag)),
            },
        }
    }
}

pub type UpdateEntry = (Arc<dyn IncrementalUnit>, UpdateType);

/// An ordered batch of (iu, update_type) pairs.
#[derive(Clone, Default)]
pub struct UpdateMessage {
    entries: Vec<UpdateEntry>,
}

impl UpdateMessage {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn from_iu(iu: Arc<dyn IncrementalUnit>, update_type: UpdateType) -> Self {
        Self {
            entries: vec![(iu, update_type)],
        }
    }

    pub fn from_iu_list(ius: Vec<Arc<dyn IncrementalUnit>>, update_type: UpdateType) -> Self {
        Self {
            entries: ius.into_iter().map(|iu| (iu, update_type)).collect(),
        }
    }

    pub fn from_pairs(pairs: Vec<UpdateEntry>) -> Self {
        Self { entries: pairs }
    }

    /// Append one `(iu, update_type)` pair. In `strict` mode (the spec
    /// default) `update_type` is canonicalized first via
    /// `UpdateType::canonicalize`; on failure the message is left
    /// unchanged and the error is returned.
    pub fn add_iu(
        &mut self,
        iu: Arc<dyn IncrementalUnit>,
        update_type: UpdateType,
        strict: bool,
    ) -> Result<(), ModuleError> {
        let update_type = update_type.canonicalize(strict)?;
        self.entries.push((iu, update_type));
        Ok(())
    }

    /// Append a whole batch at once. All-or-nothing: every entry's update
    /// type is canonicalized into a fresh `Vec` first, and `self.entries`
    /// is only extended once that whole pass succeeds — a caller never
    /// leaves the message half-updated if one entry in the batch has an
    /// invalid tag.
    pub fn add_ius(&mut self, pairs: Vec<UpdateEntry>, strict: bool) -> Result<(), ModuleError> {
        let mut coerced = Vec::with_capacity(pairs.len());
        for (iu, update_type) in pairs {
            coerced.push((iu, update_type.canonicalize(strict)?));
        }
        self.entries.extend(coerced);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &UpdateEntry> {
        self.entries.iter()
    }

    pub fn into_iter(self) -> impl Iterator<Item = UpdateEntry> {
        self.entries.into_iter()
    }

    pub fn iter_ius(&self) -> impl Iterator<Item = &Arc<dyn IncrementalUnit>> {
        self.entries.iter().map(|(iu, _)| iu)
    }

    /// True iff every IU's class tags intersect `allowed` — the strict-mode
    /// check a module runs before accepting a message on a declared input
    /// class.
    pub fn has_valid_ius(&self, allowed: &[TypeId]) -> bool {
        self.entries
            .iter()
            .all(|(iu, _)| iu.class_tags().iter().any(|t| allowed.contains(t)))
    }

    /// Split into (valid, invalid) by the same check — used in permissive
    /// mode, where a module drops offending IUs instead of rejecting the
    /// whole batch.
    pub fn partition_valid(self, allowed: &[TypeId]) -> (UpdateMessage, Vec<UpdateEntry>) {
        let (valid, invalid): (Vec<_>, Vec<_>) = self
            .entries
            .into_iter()
            .partition(|(iu, _)| iu.class_tags().iter().any(|t| allowed.contains(t)));
        (UpdateMessage { entries: valid }, invalid)
    }

    pub fn set_processed(&self, module: ModuleRef) {
        for (iu, _) in &self.entries {
            iu.set_processed(module.clone());
        }
    }
}

impl IntoIterator for UpdateMessage {
    type Item = UpdateEntry;
    type IntoIter = std::vec::IntoIter<UpdateEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iu::TextIU;

    #[test]
    fn partition_splits_on_class_membership() {
        let a: Arc<dyn IncrementalUnit> = Arc::new(TextIU::new(None, "a", None, None, "x".into()));
        let msg = UpdateMessage::from_iu(a, UpdateType::Add);
        let (valid, invalid) = msg.partition_valid(&[TypeId::of::<TextIU>()]);
        assert_eq!(valid.len(), 1);
        assert!(invalid.is_empty());

        let b: Arc<dyn IncrementalUnit> = Arc::new(TextIU::new(None, "b", None, None, "y".into()));
        let msg2 = UpdateMessage::from_iu(b, UpdateType::Add);
        let (valid2, invalid2) = msg2.partition_valid(&[TypeId::of::<crate::iu::AudioIU>()]);
        assert!(valid2.is_empty());
        assert_eq!(invalid2.len(), 1);
    }
}
