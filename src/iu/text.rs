//! Text-carrying incremental units.

use super::{IncrementalUnit, IuCore};
use crate::module_ref::ModuleRef;
use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::sync::Arc;

/// A capability shared by every IU whose payload is a piece of text.
pub trait TextLike: IncrementalUnit {
    fn text(&self) -> String;
    fn set_text(&self, text: String);
}

/// Plain recognized/typed text, e.g. the output of an ASR or NLU module.
#[derive(Debug)]
pub struct TextIU {
    core: IuCore,
    text: Mutex<String>,
}

impl TextIU {
    pub fn new(
        creator: Option<ModuleRef>,
        iuid: impl Into<String>,
        previous_iu: Option<Arc<dyn IncrementalUnit>>,
        grounded_in: Option<Arc<dyn IncrementalUnit>>,
        text: String,
    ) -> Self {
        let core = IuCore::new(creator, iuid, previous_iu, grounded_in);
        let this = Self {
            core,
            text: Mutex::new(text.clone()),
        };
        this.set_payload(serde_json::Value::String(text));
        this
    }
}

impl IncrementalUnit for TextIU {
    fn core(&self) -> &IuCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        "Text IU"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl TextLike for TextIU {
    fn text(&self) -> String {
        self.text.lock().clone()
    }

    fn set_text(&self, text: String) {
        *self.text.lock() = text.clone();
        self.set_payload(serde_json::Value::String(text));
    }
}

/// Text produced for downstream dispatch, e.g. by a language-generation
/// module deciding whether this increment should be spoken yet.
#[derive(Debug)]
pub struct GeneratedTextIU {
    core: IuCore,
    text: Mutex<String>,
    dispatch: std::sync::atomic::AtomicBool,
}

impl GeneratedTextIU {
    pub fn new(
        creator: Option<ModuleRef>,
        iuid: impl Into<String>,
        previous_iu: Option<Arc<dyn IncrementalUnit>>,
        grounded_in: Option<Arc<dyn IncrementalUnit>>,
        text: String,
        dispatch: bool,
    ) -> Self {
        let core = IuCore::new(creator, iuid, previous_iu, grounded_in);
        let this = Self {
            core,
            text: Mutex::new(text.clone()),
            dispatch: std::sync::atomic::AtomicBool::new(dispatch),
        };
        this.set_payload(serde_json::Value::String(text));
        this
    }

    pub fn dispatch(&self) -> bool {
        self.dispatch.load(std::sync::atomic::Ordering::Acquire)
    }

    pub fn set_dispatch(&self, value: bool) {
        self.dispatch.store(value, std::sync::atomic::Ordering::Release);
    }
}

impl IncrementalUnit for GeneratedTextIU {
    fn core(&self) -> &IuCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        "Generated Text IU"
    }

    fn class_tags(&self) -> Vec<TypeId> {
        vec![TypeId::of::<GeneratedTextIU>(), TypeId::of::<TextIU>()]
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl TextLike for GeneratedTextIU {
    fn text(&self) -> String {
        self.text.lock().clone()
    }

    fn set_text(&self, text: String) {
        *self.text.lock() = text.clone();
        self.set_payload(serde_json::Value::String(text));
    }
}

/// Output of an automatic speech recognizer: a ranked set of candidate
/// transcriptions plus the one currently treated as final.
#[derive(Debug, Default, Clone)]
pub struct Prediction {
    pub text: String,
    pub confidence: f64,
}

#[derive(Debug)]
pub struct SpeechRecognitionIU {
    core: IuCore,
    predictions: Mutex<Vec<Prediction>>,
    stability: Mutex<f64>,
    confidence: Mutex<f64>,
    text: Mutex<String>,
    is_final: std::sync::atomic::AtomicBool,
}

impl SpeechRecognitionIU {
    pub fn new(
        creator: Option<ModuleRef>,
        iuid: impl Into<String>,
        previous_iu: Option<Arc<dyn IncrementalUnit>>,
        grounded_in: Option<Arc<dyn IncrementalUnit>>,
    ) -> Self {
        let core = IuCore::new(creator, iuid, previous_iu, grounded_in);
        Self {
            core,
            predictions: Mutex::new(Vec::new()),
            stability: Mutex::new(0.0),
            confidence: Mutex::new(0.0),
            text: Mutex::new(String::new()),
            is_final: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Replace the candidate set and recompute the top-ranked transcription,
    /// mirroring the original's `set_asr_results`.
    pub fn set_asr_results(
        &self,
        predictions: Vec<Prediction>,
        stability: f64,
        confidence: f64,
        is_final: bool,
    ) {
        let top_text = predictions
            .first()
            .map(|p| p.text.clone())
            .unwrap_or_default();
        *self.predictions.lock() = predictions;
        *self.stability.lock() = stability;
        *self.confidence.lock() = confidence;
        *self.text.lock() = top_text.clone();
        self.is_final.store(is_final, std::sync::atomic::Ordering::Release);
        self.set_payload(serde_json::Value::String(top_text));
    }

    pub fn predictions(&self) -> Vec<Prediction> {
        self.predictions.lock().clone()
    }

    pub fn stability(&self) -> f64 {
        *self.stability.lock()
    }

    pub fn confidence(&self) -> f64 {
        *self.confidence.lock()
    }

    pub fn is_final(&self) -> bool {
        self.is_final.load(std::sync::atomic::Ordering::Acquire)
    }
}

impl IncrementalUnit for SpeechRecognitionIU {
    fn core(&self) -> &IuCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        "Speech Recognition IU"
    }

    fn class_tags(&self) -> Vec<TypeId> {
        vec![TypeId::of::<SpeechRecognitionIU>(), TypeId::of::<TextIU>()]
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl TextLike for SpeechRecognitionIU {
    fn text(&self) -> String {
        self.text.lock().clone()
    }

    fn set_text(&self, text: String) {
        *self.text.lock() = text.clone();
        self.set_payload(serde_json::Value::String(text));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_text_iu_satisfies_text_class() {
        let iu = GeneratedTextIU::new(None, "a", None, None, "hi".into(), false);
        assert!(iu.class_tags().contains(&TypeId::of::<TextIU>()));
    }

    #[test]
    fn asr_results_pick_top_prediction() {
        let iu = SpeechRecognitionIU::new(None, "a", None, None);
        iu.set_asr_results(
            vec![
                Prediction { text: "hello".into(), confidence: 0.9 },
                Prediction { text: "hullo".into(), confidence: 0.2 },
            ],
            0.5,
            0.9,
            false,
        );
        assert_eq!(iu.text(), "hello");
        assert!(!iu.is_final());
    }
}
