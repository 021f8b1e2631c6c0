//! Wires a trigger module (typed text in on demand) to a consuming module
//! (prints what it receives). The source uses its bound `ModuleHandle` to
//! create IUs through the module's own factory, so each IU's `previous_iu`
//! chains to the last one this module produced.

use retico_core::error::ModuleError;
use retico_core::iu::TextIU;
use retico_core::module::{ModuleBehavior, ModuleHandle, ModuleKind, ModuleNode};
use retico_core::update_message::UpdateMessage;
use retico_core::{ModuleRegistry, Network};
use std::any::TypeId;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

#[derive(Debug, Default)]
struct TypedTextSource {
    handle: OnceLock<ModuleHandle>,
}

impl ModuleBehavior for TypedTextSource {
    fn name(&self) -> &str {
        "typed-text-source"
    }

    fn output_class(&self) -> Option<TypeId> {
        Some(TypeId::of::<TextIU>())
    }

    fn bind(&self, handle: ModuleHandle) {
        let _ = self.handle.set(handle);
    }

    fn on_trigger(&self, payload: serde_json::Value) -> Result<Option<UpdateMessage>, ModuleError> {
        let text = payload
            .get("text")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let handle = self.handle.get().expect("bind runs before any trigger");
        let iu = handle
            .create_iu(None, |creator, id, previous, grounded| {
                TextIU::new(creator, id, previous, grounded, text)
            })
            .expect("module still alive");
        Ok(Some(UpdateMessage::from_iu(
            iu as Arc<dyn retico_core::IncrementalUnit>,
            retico_core::UpdateType::Add,
        )))
    }
}

#[derive(Debug)]
struct ConsolePrinter;

impl ModuleBehavior for ConsolePrinter {
    fn name(&self) -> &str {
        "console-printer"
    }

    fn input_classes(&self) -> &[TypeId] {
        static CLASSES: std::sync::OnceLock<[TypeId; 1]> = std::sync::OnceLock::new();
        CLASSES.get_or_init(|| [TypeId::of::<TextIU>()])
    }

    fn process_update(&self, update: UpdateMessage) -> Result<Option<UpdateMessage>, ModuleError> {
        for (iu, update_type) in update.iter() {
            if let Some(text_iu) = iu.as_any().downcast_ref::<TextIU>() {
                let chained = iu
                    .previous_iu()
                    .map(|p| p.iuid().to_string())
                    .unwrap_or_else(|| "<none>".to_string());
                println!("[{update_type:?}] {} (previous_iu={chained})", text_iu.text());
            }
        }
        Ok(None)
    }
}

fn main() {
    retico_core::logging::init_default_subscriber();

    let registry = ModuleRegistry::new();
    let source: Arc<ModuleNode> = ModuleNode::new(ModuleKind::Trigger, Box::new(TypedTextSource::default()));
    let sink: Arc<ModuleNode> = ModuleNode::new(ModuleKind::Consuming, Box::new(ConsolePrinter));
    source.subscribe(&sink).expect("wiring source to sink");
    registry.register(source.clone());
    registry.register(sink.clone());

    let network = Network::discover(&registry, &[source.clone()]);
    network.run().expect("starting pipeline");

    for text in ["hello", "hello there", "hello there, how are you"] {
        source
            .trigger(serde_json::json!({ "text": text }))
            .expect("triggering source");
        std::thread::sleep(Duration::from_millis(50));
    }

    std::thread::sleep(Duration::from_millis(100));
    network.stop();
}
