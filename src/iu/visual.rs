//! Image-carrying incremental unit.

use super::{IncrementalUnit, IuCore};
use crate::module_ref::ModuleRef;
use std::any::Any;
use std::sync::Arc;

/// A single video frame. Kept opaque (`Vec<u8>`) rather than pulling in an
/// image-decoding crate — pixel format is the producing module's concern.
#[derive(Debug)]
pub struct ImageIU {
    core: IuCore,
    image: Vec<u8>,
    rate: Option<u32>,
    nframes: usize,
}

impl ImageIU {
    pub fn new(
        creator: Option<ModuleRef>,
        iuid: impl Into<String>,
        previous_iu: Option<Arc<dyn IncrementalUnit>>,
        grounded_in: Option<Arc<dyn IncrementalUnit>>,
        image: Vec<u8>,
        rate: Option<u32>,
        nframes: usize,
    ) -> Self {
        let core = IuCore::new(creator, iuid, previous_iu, grounded_in);
        let this = Self {
            core,
            image,
            rate,
            nframes,
        };
        this.set_payload(serde_json::json!({ "rate": this.rate, "nframes": this.nframes }));
        this
    }

    pub fn image(&self) -> &[u8] {
        &self.image
    }

    pub fn rate(&self) -> Option<u32> {
        self.rate
    }

    pub fn nframes(&self) -> usize {
        self.nframes
    }
}

impl IncrementalUnit for ImageIU {
    fn core(&self) -> &IuCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        "Image IU"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
