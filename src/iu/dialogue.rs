//! Dialogue-act incremental units.

use super::{IncrementalUnit, IuCore};
use crate::module_ref::ModuleRef;
use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// A capability shared by every IU carrying a recognized dialogue act.
pub trait DialogueActLike: IncrementalUnit {
    fn act(&self) -> String;
    fn concepts(&self) -> HashMap<String, serde_json::Value>;
    fn confidence(&self) -> f64;
    fn set_act(&self, act: String, concepts: HashMap<String, serde_json::Value>, confidence: f64);
}

#[derive(Debug, Default)]
struct ActState {
    act: String,
    concepts: HashMap<String, serde_json::Value>,
    confidence: f64,
}

#[derive(Debug)]
pub struct DialogueActIU {
    core: IuCore,
    state: Mutex<ActState>,
}

impl DialogueActIU {
    pub fn new(
        creator: Option<ModuleRef>,
        iuid: impl Into<String>,
        previous_iu: Option<Arc<dyn IncrementalUnit>>,
        grounded_in: Option<Arc<dyn IncrementalUnit>>,
    ) -> Self {
        Self {
            core: IuCore::new(creator, iuid, previous_iu, grounded_in),
            state: Mutex::new(ActState::default()),
        }
    }

    fn apply_act(&self, act: String, concepts: HashMap<String, serde_json::Value>, confidence: f64) {
        *self.state.lock() = ActState {
            act: act.clone(),
            concepts: concepts.clone(),
            confidence,
        };
        self.set_payload(serde_json::json!({ "act": act, "concepts": concepts }));
    }
}

impl IncrementalUnit for DialogueActIU {
    fn core(&self) -> &IuCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        "DialogueAct IU"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl DialogueActLike for DialogueActIU {
    fn act(&self) -> String {
        self.state.lock().act.clone()
    }

    fn concepts(&self) -> HashMap<String, serde_json::Value> {
        self.state.lock().concepts.clone()
    }

    fn confidence(&self) -> f64 {
        self.state.lock().confidence
    }

    fn set_act(&self, act: String, concepts: HashMap<String, serde_json::Value>, confidence: f64) {
        self.apply_act(act, concepts, confidence);
    }
}

/// A dialogue act plus a flag deciding whether it should be acted on yet,
/// e.g. by a dialogue manager waiting for a turn boundary.
#[derive(Debug)]
pub struct DispatchableActIU {
    core: IuCore,
    state: Mutex<ActState>,
    dispatch: std::sync::atomic::AtomicBool,
}

impl DispatchableActIU {
    pub fn new(
        creator: Option<ModuleRef>,
        iuid: impl Into<String>,
        previous_iu: Option<Arc<dyn IncrementalUnit>>,
        grounded_in: Option<Arc<dyn IncrementalUnit>>,
        dispatch: bool,
    ) -> Self {
        Self {
            core: IuCore::new(creator, iuid, previous_iu, grounded_in),
            state: Mutex::new(ActState::default()),
            dispatch: std::sync::atomic::AtomicBool::new(dispatch),
        }
    }

    pub fn dispatch(&self) -> bool {
        self.dispatch.load(std::sync::atomic::Ordering::Acquire)
    }

    pub fn set_dispatch(&self, value: bool) {
        self.dispatch.store(value, std::sync::atomic::Ordering::Release);
    }
}

impl IncrementalUnit for DispatchableActIU {
    fn core(&self) -> &IuCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        "Dispatchable Act IU"
    }

    fn class_tags(&self) -> Vec<TypeId> {
        vec![TypeId::of::<DispatchableActIU>(), TypeId::of::<DialogueActIU>()]
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl DialogueActLike for DispatchableActIU {
    fn act(&self) -> String {
        self.state.lock().act.clone()
    }

    fn concepts(&self) -> HashMap<String, serde_json::Value> {
        self.state.lock().concepts.clone()
    }

    fn confidence(&self) -> f64 {
        self.state.lock().confidence
    }

    fn set_act(&self, act: String, concepts: HashMap<String, serde_json::Value>, confidence: f64) {
        *self.state.lock() = ActState {
            act: act.clone(),
            concepts: concepts.clone(),
            confidence,
        };
        self.set_payload(serde_json::json!({ "act": act, "concepts": concepts }));
    }
}

/// Signals a predicted or confirmed end of the current speaker's turn.
#[derive(Debug)]
pub struct EndOfTurnIU {
    core: IuCore,
    probability: Mutex<f64>,
}

impl EndOfTurnIU {
    pub fn new(
        creator: Option<ModuleRef>,
        iuid: impl Into<String>,
        previous_iu: Option<Arc<dyn IncrementalUnit>>,
        grounded_in: Option<Arc<dyn IncrementalUnit>>,
        probability: f64,
    ) -> Self {
        let core = IuCore::new(creator, iuid, previous_iu, grounded_in);
        let this = Self {
            core,
            probability: Mutex::new(probability),
        };
        this.set_payload(serde_json::json!({ "probability": probability }));
        this
    }

    pub fn probability(&self) -> f64 {
        *self.probability.lock()
    }
}

impl IncrementalUnit for EndOfTurnIU {
    fn core(&self) -> &IuCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        "End-of-Turn IU"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatchable_act_satisfies_dialogue_act_class() {
        let iu = DispatchableActIU::new(None, "a", None, None, false);
        assert!(iu.class_tags().contains(&TypeId::of::<DialogueActIU>()));
    }

    #[test]
    fn set_act_updates_payload() {
        let iu = DialogueActIU::new(None, "a", None, None);
        let mut concepts = HashMap::new();
        concepts.insert("slot".to_string(), serde_json::json!("value"));
        iu.set_act("inform".into(), concepts, 0.8);
        assert_eq!(iu.act(), "inform");
        assert_eq!(iu.confidence(), 0.8);
    }
}
