//! Network discovery and batch lifecycle control.
//!
//! A `Network` is the set of modules reachable from some seed modules by
//! following subscription edges in either direction. It does not own the
//! modules (a `ModuleRegistry` does, keyed by `ModuleId` — the same
//! `DashMap`-backed typed-registry pattern the ambient runtime uses
//! elsewhere) and it drives `setup`/`start`/`stop` across the whole set in
//! one call instead of one module at a time.

pub mod persistence;

use crate::error::NetworkError;
use crate::module::ModuleNode;
use crate::module_ref::ModuleId;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;

/// Shared directory of every module a program has constructed, independent
/// of which ones happen to be wired into a particular `Network`.
#[derive(Default, Clone)]
pub struct ModuleRegistry {
    modules: Arc<DashMap<ModuleId, Arc<ModuleNode>>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, module: Arc<ModuleNode>) {
        self.modules.insert(module.id(), module);
    }

    pub fn get(&self, id: ModuleId) -> Option<Arc<ModuleNode>> {
        self.modules.get(&id).map(|entry| entry.clone())
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// A set of modules to operate on together.
pub struct Network {
    registry: ModuleRegistry,
    members: Vec<ModuleId>,
}

impl Network {
    /// BFS outward from `seeds` over both provider and consumer edges,
    /// recording every module id reached exactly once, the same
    /// visited-set discipline the original network walker uses.
    pub fn discover(registry: &ModuleRegistry, seeds: &[Arc<ModuleNode>]) -> Self {
        let mut visited: HashSet<ModuleId> = HashSet::new();
        let mut frontier: Vec<ModuleId> = Vec::new();

        for seed in seeds {
            if visited.insert(seed.id()) {
                frontier.push(seed.id());
            }
        }

        let mut members = Vec::new();
        while let Some(id) = frontier.pop() {
            members.push(id);
            let Some(module) = registry.get(id) else {
                continue;
            };
            for neighbor in module.providers().into_iter().chain(module.consumers()) {
                if visited.insert(neighbor.id) {
                    frontier.push(neighbor.id);
                }
            }
        }

        Self {
            registry: registry.clone(),
            members,
        }
    }

    pub fn from_members(registry: ModuleRegistry, members: Vec<ModuleId>) -> Self {
        Self { registry, members }
    }

    pub fn modules(&self) -> Vec<Arc<ModuleNode>> {
        self.members
            .iter()
            .filter_map(|id| self.registry.get(*id))
            .collect()
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// Run `setup()` on every module, aborting (without starting any
    /// worker thread) at the first failure.
    pub fn setup(&self) -> Result<(), NetworkError> {
        for module in self.modules() {
            module
                .setup()
                .map_err(|_| NetworkError::SetupFailed(module.name().to_string()))?;
        }
        Ok(())
    }

    /// `setup()`, then `prepare_run()`, then `start()` across every module —
    /// in that order, each phase run over every module before the next
    /// phase begins, so a `prepare_run` hook may assume every peer has
    /// already finished `setup`, and a worker thread never starts before
    /// every module's `prepare_run` has completed.
    pub fn run(&self) -> Result<(), NetworkError> {
        self.setup()?;
        for module in self.modules() {
            module
                .prepare_run()
                .map_err(|_| NetworkError::SetupFailed(module.name().to_string()))?;
        }
        for module in self.modules() {
            module
                .start()
                .map_err(|_| NetworkError::SetupFailed(module.name().to_string()))?;
        }
        Ok(())
    }

    /// Stop every module. Order doesn't matter for correctness — each
    /// module's `stop` only touches its own state and buffers — but
    /// stopping consumers before providers avoids a burst of "queue
    /// already removed" warnings during shutdown.
    pub fn stop(&self) {
        for module in self.modules() {
            module.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{ModuleBehavior, ModuleKind};

    #[derive(Debug)]
    struct NoOp(&'static str);
    impl ModuleBehavior for NoOp {
        fn name(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn discover_walks_a_three_module_line() {
        let registry = ModuleRegistry::new();
        let a = ModuleNode::new(ModuleKind::Producing, Box::new(NoOp("a")));
        let b = ModuleNode::new(ModuleKind::General, Box::new(NoOp("b")));
        let c = ModuleNode::new(ModuleKind::Consuming, Box::new(NoOp("c")));
        a.subscribe(&b).unwrap();
        b.subscribe(&c).unwrap();
        registry.register(a.clone());
        registry.register(b.clone());
        registry.register(c.clone());

        let net = Network::discover(&registry, &[a.clone()]);
        let names: HashSet<_> = net.modules().iter().map(|m| m.name().to_string()).collect();
        assert_eq!(names.len(), 3);
        assert!(names.contains("a") && names.contains("b") && names.contains("c"));
    }

    #[test]
    fn run_and_stop_drive_every_module() {
        let registry = ModuleRegistry::new();
        let a = ModuleNode::new(ModuleKind::Producing, Box::new(NoOp("a")));
        registry.register(a.clone());
        let net = Network::discover(&registry, &[a.clone()]);
        net.run().unwrap();
        assert_eq!(a.state(), crate::module::ModuleState::Running);
        net.stop();
        assert_eq!(a.state(), crate::module::ModuleState::Stopped);
    }
}
