//! Builds a three-module text pipeline, saves it to a `.rtc` file, then
//! loads it back into a fresh registry and runs the reconstructed network.

use retico_core::error::{ModuleError, NetworkError};
use retico_core::iu::text::TextLike;
use retico_core::iu::TextIU;
use retico_core::module::{ModuleBehavior, ModuleKind, ModuleNode};
use retico_core::network::persistence::{self, ConstructorArg, FactoryRegistry, ModuleFactory};
use retico_core::update_message::UpdateMessage;
use retico_core::{ModuleRegistry, Network};
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug)]
struct Uppercaser(String);

impl ModuleBehavior for Uppercaser {
    fn name(&self) -> &str {
        &self.0
    }

    fn input_classes(&self) -> &[TypeId] {
        static CLASSES: std::sync::OnceLock<[TypeId; 1]> = std::sync::OnceLock::new();
        CLASSES.get_or_init(|| [TypeId::of::<TextIU>()])
    }

    fn output_class(&self) -> Option<TypeId> {
        Some(TypeId::of::<TextIU>())
    }

    fn class_id(&self) -> Option<&'static str> {
        Some("demo.uppercaser")
    }

    fn constructor_args(&self) -> HashMap<String, ConstructorArg> {
        let mut args = HashMap::new();
        args.insert("name".to_string(), ConstructorArg::Str(self.0.clone()));
        args
    }

    fn process_update(&self, update: UpdateMessage) -> Result<Option<UpdateMessage>, ModuleError> {
        for (iu, _) in update.iter() {
            if let Some(text_iu) = iu.as_any().downcast_ref::<TextIU>() {
                text_iu.set_text(text_iu.text().to_uppercase());
            }
        }
        Ok(Some(update))
    }
}

struct UppercaserFactory;

impl ModuleFactory for UppercaserFactory {
    fn class_id(&self) -> &'static str {
        "demo.uppercaser"
    }

    fn construct(&self, args: &HashMap<String, ConstructorArg>) -> Result<Arc<ModuleNode>, NetworkError> {
        let name = match args.get("name") {
            Some(ConstructorArg::Str(s)) => s.clone(),
            _ => "uppercaser".to_string(),
        };
        Ok(ModuleNode::new(ModuleKind::General, Box::new(Uppercaser(name))))
    }
}

fn main() {
    retico_core::logging::init_default_subscriber();

    let mut factories = FactoryRegistry::new();
    factories.register(Arc::new(UppercaserFactory));

    let registry = ModuleRegistry::new();
    let mut a_args = HashMap::new();
    a_args.insert("name".to_string(), ConstructorArg::Str("stage-a".to_string()));
    let mut b_args = HashMap::new();
    b_args.insert("name".to_string(), ConstructorArg::Str("stage-b".to_string()));
    let mut c_args = HashMap::new();
    c_args.insert("name".to_string(), ConstructorArg::Str("stage-c".to_string()));

    let a = factories.construct("demo.uppercaser", &a_args).unwrap();
    let b = factories.construct("demo.uppercaser", &b_args).unwrap();
    let c = factories.construct("demo.uppercaser", &c_args).unwrap();
    a.subscribe(&b).unwrap();
    b.subscribe(&c).unwrap();
    registry.register(a.clone());
    registry.register(b.clone());
    registry.register(c.clone());

    let network = Network::discover(&registry, &[a.clone()]);
    let path = std::env::temp_dir().join("retico-demo.rtc");
    persistence::save(&network, &path).expect("saving network");
    println!("saved network to {}", path.display());

    let (_loaded_registry, loaded) = persistence::load(&path, &factories).expect("loading network");
    println!("reloaded {} modules", loaded.modules().len());

    loaded.run().expect("starting reloaded network");
    std::thread::sleep(std::time::Duration::from_millis(50));
    loaded.stop();
}
