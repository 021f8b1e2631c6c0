//! Audio-carrying incremental unit.

use super::{IncrementalUnit, IuCore};
use crate::module_ref::ModuleRef;
use std::any::Any;
use std::sync::Arc;

/// A chunk of raw audio plus the format needed to interpret it. Mirrors the
/// original's `AudioIU` — deliberately format-agnostic, no decoding logic.
#[derive(Debug)]
pub struct AudioIU {
    core: IuCore,
    raw_audio: Vec<u8>,
    rate: u32,
    nframes: usize,
    sample_width: u8,
}

impl AudioIU {
    pub fn new(
        creator: Option<ModuleRef>,
        iuid: impl Into<String>,
        previous_iu: Option<Arc<dyn IncrementalUnit>>,
        grounded_in: Option<Arc<dyn IncrementalUnit>>,
        raw_audio: Vec<u8>,
        rate: u32,
        nframes: usize,
        sample_width: u8,
    ) -> Self {
        let core = IuCore::new(creator, iuid, previous_iu, grounded_in);
        let this = Self {
            core,
            raw_audio,
            rate,
            nframes,
            sample_width,
        };
        this.set_payload(serde_json::json!({
            "rate": this.rate,
            "nframes": this.nframes,
            "sample_width": this.sample_width,
        }));
        this
    }

    pub fn raw_audio(&self) -> &[u8] {
        &self.raw_audio
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    pub fn nframes(&self) -> usize {
        self.nframes
    }

    pub fn sample_width(&self) -> u8 {
        self.sample_width
    }
}

impl IncrementalUnit for AudioIU {
    fn core(&self) -> &IuCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        "Audio IU"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
