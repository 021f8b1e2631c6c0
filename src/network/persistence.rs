//! `.rtc` save/load: a network is recorded as a list of module records
//! (class id + primitive constructor args) plus the provider/consumer
//! edges between them, serialized with `bincode` rather than a format
//! that can execute arbitrary code on load.

use super::{ModuleRegistry, Network};
use crate::error::NetworkError;
use crate::module::ModuleNode;
use crate::module_ref::ModuleId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

/// A constructor argument restricted to primitives so a `.rtc` file can
/// never smuggle in executable state, only data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ConstructorArg {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Map(HashMap<String, ConstructorArg>),
}

/// Builds a module instance from its saved class id and constructor args.
pub trait ModuleFactory: Send + Sync {
    fn class_id(&self) -> &'static str;
    fn construct(&self, args: &HashMap<String, ConstructorArg>) -> Result<Arc<ModuleNode>, NetworkError>;
}

/// Maps class ids back to the factory that can reconstruct them. Kept
/// separate from `ModuleRegistry` (which maps live instances by id) —
/// this one maps class *names* to constructors and is populated once at
/// startup by whatever module types a program wants to be loadable.
#[derive(Default)]
pub struct FactoryRegistry {
    factories: HashMap<&'static str, Arc<dyn ModuleFactory>>,
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, factory: Arc<dyn ModuleFactory>) {
        self.factories.insert(factory.class_id(), factory);
    }

    pub fn construct(
        &self,
        class_id: &str,
        args: &HashMap<String, ConstructorArg>,
    ) -> Result<Arc<ModuleNode>, NetworkError> {
        self.factories
            .get(class_id)
            .ok_or_else(|| NetworkError::UnknownClass(class_id.to_string()))?
            .construct(args)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ModuleRecord {
    id: String,
    name: String,
    class_id: String,
    args: HashMap<String, ConstructorArg>,
    meta: HashMap<String, ConstructorArg>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ConnectionRecord {
    provider_id: String,
    consumer_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct NetworkRecord {
    modules: Vec<ModuleRecord>,
    connections: Vec<ConnectionRecord>,
}

/// Serialize every persistable module in `network` (one whose behavior
/// returns `Some` from `class_id`) plus the provider-to-consumer edges
/// between persistable modules, to `path`. Modules without a `class_id`
/// are silently excluded — they're reference/test fixtures, not part of
/// the network's loadable shape.
pub fn save(network: &Network, path: impl AsRef<Path>) -> Result<(), NetworkError> {
    let modules = network.modules();
    let mut persistable_ids = std::collections::HashSet::new();
    let mut records = Vec::new();

    for module in &modules {
        let Some(class_id) = module.behavior_class_id() else {
            continue;
        };
        persistable_ids.insert(module.id());
        records.push(ModuleRecord {
            id: module.id().to_string(),
            name: module.name().to_string(),
            class_id: class_id.to_string(),
            args: module.behavior_constructor_args(),
            meta: HashMap::new(),
        });
    }

    let mut seen_edges = std::collections::HashSet::new();
    let mut connections = Vec::new();
    for module in &modules {
        if !persistable_ids.contains(&module.id()) {
            continue;
        }
        for consumer in module.consumers() {
            if !persistable_ids.contains(&consumer.id) {
                continue;
            }
            let edge = (module.id(), consumer.id);
            if seen_edges.insert(edge) {
                connections.push(ConnectionRecord {
                    provider_id: module.id().to_string(),
                    consumer_id: consumer.id.to_string(),
                });
            }
        }
    }

    let record = NetworkRecord { modules: records, connections };
    let bytes = bincode::serialize(&record)?;
    let mut file = std::fs::File::create(path)?;
    file.write_all(&bytes)?;
    Ok(())
}

/// Reconstruct a network from a `.rtc` file: each module record is built
/// through its registered factory, then `subscribe` is called for every
/// saved connection. Returns the fresh `ModuleRegistry` (every
/// reconstructed module is registered in it) and the `Network` spanning
/// them.
pub fn load(path: impl AsRef<Path>, factories: &FactoryRegistry) -> Result<(ModuleRegistry, Network), NetworkError> {
    let mut bytes = Vec::new();
    std::fs::File::open(path)?.read_to_end(&mut bytes)?;
    let record: NetworkRecord = bincode::deserialize(&bytes)?;

    let registry = ModuleRegistry::new();
    let mut by_saved_id: HashMap<String, ModuleId> = HashMap::new();

    for module_record in &record.modules {
        let module = factories.construct(&module_record.class_id, &module_record.args)?;
        by_saved_id.insert(module_record.id.clone(), module.id());
        registry.register(module.clone());
    }

    for connection in &record.connections {
        let provider_id = by_saved_id
            .get(&connection.provider_id)
            .ok_or_else(|| NetworkError::Persistence(format!("unknown provider id {}", connection.provider_id)))?;
        let consumer_id = by_saved_id
            .get(&connection.consumer_id)
            .ok_or_else(|| NetworkError::Persistence(format!("unknown consumer id {}", connection.consumer_id)))?;
        let provider = registry
            .get(*provider_id)
            .ok_or_else(|| NetworkError::Persistence("provider vanished from registry".into()))?;
        let consumer = registry
            .get(*consumer_id)
            .ok_or_else(|| NetworkError::Persistence("consumer vanished from registry".into()))?;
        provider
            .subscribe(&consumer)
            .map_err(|err| NetworkError::Persistence(err.to_string()))?;
    }

    let seeds = registry
        .get(by_saved_id.values().next().copied().unwrap_or_default())
        .into_iter()
        .collect::<Vec<_>>();
    let network = Network::discover(&registry, &seeds);
    Ok((registry, network))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{ModuleBehavior, ModuleKind};
    use crate::update_message::UpdateMessage;

    #[derive(Debug)]
    struct Stage(&'static str);
    impl ModuleBehavior for Stage {
        fn name(&self) -> &str {
            self.0
        }

        fn class_id(&self) -> Option<&'static str> {
            Some("test.stage")
        }

        fn process_update(&self, update: UpdateMessage) -> Result<Option<UpdateMessage>, crate::error::ModuleError> {
            Ok(Some(update))
        }
    }

    struct StageFactory;
    impl ModuleFactory for StageFactory {
        fn class_id(&self) -> &'static str {
            "test.stage"
        }

        fn construct(&self, args: &HashMap<String, ConstructorArg>) -> Result<Arc<ModuleNode>, NetworkError> {
            let name = match args.get("name") {
                Some(ConstructorArg::Str(s)) => Box::leak(s.clone().into_boxed_str()) as &'static str,
                _ => "stage",
            };
            Ok(ModuleNode::new(ModuleKind::General, Box::new(Stage(name))))
        }
    }

    #[test]
    fn save_then_load_preserves_a_three_module_line() {
        let registry = ModuleRegistry::new();
        let mut args_a = HashMap::new();
        args_a.insert("name".to_string(), ConstructorArg::Str("a".to_string()));
        let mut args_b = HashMap::new();
        args_b.insert("name".to_string(), ConstructorArg::Str("b".to_string()));
        let mut args_c = HashMap::new();
        args_c.insert("name".to_string(), ConstructorArg::Str("c".to_string()));

        let mut factories = FactoryRegistry::new();
        factories.register(Arc::new(StageFactory));

        let a = factories.construct("test.stage", &args_a).unwrap();
        let b = factories.construct("test.stage", &args_b).unwrap();
        let c = factories.construct("test.stage", &args_c).unwrap();
        a.subscribe(&b).unwrap();
        b.subscribe(&c).unwrap();
        registry.register(a.clone());
        registry.register(b.clone());
        registry.register(c.clone());

        let network = Network::discover(&registry, &[a.clone()]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("line.rtc");
        save(&network, &path).unwrap();

        let (_loaded_registry, loaded) = load(&path, &factories).unwrap();
        assert_eq!(loaded.modules().len(), 3);
    }
}
