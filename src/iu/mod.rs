//! The incremental unit (IU) data model.
//!
//! `IuCore` holds the fields every IU shares (identity, lineage, flags,
//! bookkeeping); the `IncrementalUnit` trait requires only `core()` and
//! `type_name()` from a concrete type and supplies every other spec'd
//! operation as a default method that forwards to `core()`. This is the
//! "capability set realized via composition, not deep inheritance" approach
//! called out in the design notes — concrete IU types hold an `IuCore` field
//! rather than extending a base class.

pub mod audio;
pub mod dialogue;
pub mod text;
pub mod visual;

pub use audio::AudioIU;
pub use dialogue::{DialogueActIU, DispatchableActIU, EndOfTurnIU};
pub use text::{GeneratedTextIU, SpeechRecognitionIU, TextIU};
pub use visual::ImageIU;

use crate::module_ref::ModuleRef;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Maximum number of hops a `previous_iu`/`grounded_in` chain may retain
/// before the link is severed (spec.md §3, invariant "lineage depth bound").
pub const MAX_DEPTH: usize = 50;

/// Fields shared by every incremental unit.
#[derive(Debug)]
pub struct IuCore {
    iuid: String,
    creator: Option<ModuleRef>,
    previous_iu: Mutex<Option<Arc<dyn IncrementalUnit>>>,
    grounded_in: Mutex<Option<Arc<dyn IncrementalUnit>>>,
    payload: Mutex<serde_json::Value>,
    meta_data: Mutex<HashMap<String, serde_json::Value>>,
    committed: AtomicBool,
    revoked: AtomicBool,
    created_at: DateTime<Utc>,
    processed_list: Mutex<Vec<ModuleRef>>,
}

impl IuCore {
    /// Build a new IU core. `iuid` should be globally unique; callers that
    /// don't have a natural id (the original falls back to `hash(self)`,
    /// which isn't available before construction in Rust) should pass a
    /// fresh `Uuid`.
    pub fn new(
        creator: Option<ModuleRef>,
        iuid: impl Into<String>,
        previous_iu: Option<Arc<dyn IncrementalUnit>>,
        grounded_in: Option<Arc<dyn IncrementalUnit>>,
    ) -> Self {
        let meta_data = grounded_in
            .as_ref()
            .map(|g| g.meta_data())
            .unwrap_or_default();

        truncate_chain(previous_iu.clone(), Link::Previous);
        truncate_chain(grounded_in.clone(), Link::GroundedIn);

        Self {
            iuid: iuid.into(),
            creator,
            previous_iu: Mutex::new(previous_iu),
            grounded_in: Mutex::new(grounded_in),
            payload: Mutex::new(serde_json::Value::Null),
            meta_data: Mutex::new(meta_data),
            committed: AtomicBool::new(false),
            revoked: AtomicBool::new(false),
            created_at: Utc::now(),
            processed_list: Mutex::new(Vec::new()),
        }
    }
}

#[derive(Clone, Copy)]
enum Link {
    Previous,
    GroundedIn,
}

/// Walk a lineage chain starting at `start`, severing the backlink of the
/// node at depth `MAX_DEPTH` so the chain can never grow unbounded.
fn truncate_chain(start: Option<Arc<dyn IncrementalUnit>>, which: Link) {
    let mut current = start;
    let mut depth = 0usize;
    while let Some(node) = current {
        if depth == MAX_DEPTH {
            match which {
                Link::Previous => node.set_previous_iu(None),
                Link::GroundedIn => node.set_grounded_in(None),
            }
            break;
        }
        current = match which {
            Link::Previous => node.previous_iu(),
            Link::GroundedIn => node.grounded_in(),
        };
        depth += 1;
    }
}

/// The behavior every incremental unit implements.
pub trait IncrementalUnit: Any + Send + Sync {
    /// Shared state. Every method below forwards to this by default.
    fn core(&self) -> &IuCore;

    /// Human-readable display name for this IU's concrete type, e.g.
    /// `"Text IU"`. Must be non-empty.
    fn type_name(&self) -> &'static str;

    /// Class tags this IU satisfies for input/output class-membership
    /// checks — defaults to just its own concrete type; subtypes that
    /// stand in for a more general class (e.g. `GeneratedTextIU` also being
    /// a `TextIU`) override this to include the ancestor's `TypeId` too.
    fn class_tags(&self) -> Vec<TypeId> {
        vec![self.as_any().type_id()]
    }

    fn as_any(&self) -> &dyn Any;

    fn iuid(&self) -> &str {
        &self.core().iuid
    }

    fn creator(&self) -> Option<ModuleRef> {
        self.core().creator.clone()
    }

    fn previous_iu(&self) -> Option<Arc<dyn IncrementalUnit>> {
        self.core().previous_iu.lock().clone()
    }

    fn set_previous_iu(&self, iu: Option<Arc<dyn IncrementalUnit>>) {
        *self.core().previous_iu.lock() = iu;
    }

    fn grounded_in(&self) -> Option<Arc<dyn IncrementalUnit>> {
        self.core().grounded_in.lock().clone()
    }

    fn set_grounded_in(&self, iu: Option<Arc<dyn IncrementalUnit>>) {
        *self.core().grounded_in.lock() = iu;
    }

    fn committed(&self) -> bool {
        self.core().committed.load(Ordering::Acquire)
    }

    fn set_committed(&self, value: bool) {
        self.core().committed.store(value, Ordering::Release);
    }

    fn revoked(&self) -> bool {
        self.core().revoked.load(Ordering::Acquire)
    }

    fn set_revoked(&self, value: bool) {
        self.core().revoked.store(value, Ordering::Release);
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.core().created_at
    }

    /// Seconds since construction.
    fn age(&self) -> f64 {
        let delta = Utc::now() - self.core().created_at;
        delta.num_milliseconds() as f64 / 1000.0
    }

    fn older_than(&self, seconds: f64) -> bool {
        self.age() > seconds
    }

    fn processed_list(&self) -> Vec<ModuleRef> {
        self.core().processed_list.lock().clone()
    }

    fn set_processed(&self, module: ModuleRef) {
        self.core().processed_list.lock().push(module);
    }

    fn is_processed_by(&self, module: &ModuleRef) -> bool {
        self.core().processed_list.lock().iter().any(|m| m == module)
    }

    fn meta_data(&self) -> HashMap<String, serde_json::Value> {
        self.core().meta_data.lock().clone()
    }

    fn set_meta(&self, key: &str, value: serde_json::Value) {
        self.core().meta_data.lock().insert(key.to_string(), value);
    }

    fn payload(&self) -> serde_json::Value {
        self.core().payload.lock().clone()
    }

    fn set_payload(&self, value: serde_json::Value) {
        *self.core().payload.lock() = value;
    }

    /// Two IUs are equal iff their `iuid` matches (spec.md §3).
    fn same_iu(&self, other: &dyn IncrementalUnit) -> bool {
        self.iuid() == other.iuid()
    }
}

impl std::fmt::Debug for dyn IncrementalUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(self.type_name())
            .field("iuid", &self.iuid())
            .field("committed", &self.committed())
            .field("revoked", &self.revoked())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iu::text::TextIU;

    fn text_iu(prev: Option<Arc<dyn IncrementalUnit>>) -> Arc<TextIU> {
        Arc::new(TextIU::new(
            None,
            uuid::Uuid::new_v4().to_string(),
            prev,
            None,
            String::new(),
        ))
    }

    #[test]
    fn lineage_chain_is_truncated_at_max_depth() {
        let mut head: Option<Arc<dyn IncrementalUnit>> = None;
        for _ in 0..60 {
            let iu = text_iu(head.clone());
            head = Some(iu as Arc<dyn IncrementalUnit>);
        }
        let head = head.unwrap();
        let mut hops = 0usize;
        let mut current = head.previous_iu();
        while let Some(node) = current {
            hops += 1;
            current = node.previous_iu();
        }
        assert_eq!(hops, MAX_DEPTH);
    }

    #[test]
    fn meta_data_is_inherited_from_grounded_in() {
        let ground = text_iu(None);
        ground.set_meta("lang", serde_json::json!("en"));
        let derived = TextIU::new(
            None,
            "derived".to_string(),
            None,
            Some(ground.clone() as Arc<dyn IncrementalUnit>),
            String::new(),
        );
        assert_eq!(derived.meta_data().get("lang"), Some(&serde_json::json!("en")));
    }

    #[test]
    fn processed_list_roundtrip() {
        let iu = text_iu(None);
        let m = ModuleRef::new(crate::module_ref::ModuleId::new(), "asr");
        assert!(!iu.is_processed_by(&m));
        iu.set_processed(m.clone());
        assert!(iu.is_processed_by(&m));
        assert_eq!(iu.processed_list(), vec![m]);
    }

    #[test]
    fn equality_is_by_iuid() {
        let a = text_iu(None);
        let b = TextIU::new(None, a.iuid().to_string(), None, None, String::new());
        assert!(a.same_iu(&b));
    }
}
