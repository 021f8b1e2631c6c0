//! Module runtime: lifecycle state machine, worker thread, and the buffer
//! plumbing that links one module's output to another's input.
//!
//! A module's behavior (what it actually does) is split from its
//! bookkeeping (`ModuleNode`) the way the teacher splits `ServiceModule`
//! from its `Runtime`: concrete pipeline stages implement `ModuleBehavior`,
//! and `ModuleNode` owns the thread, the buffers, the event emitter, and
//! the metrics — none of which a behavior author needs to touch directly.

pub mod events;
pub mod metrics;

use crate::config::Config;
use crate::error::ModuleError;
use crate::iu::IncrementalUnit;
use crate::module_ref::{ModuleId, ModuleRef};
use crate::update_message::{UpdateMessage, UpdateType};
use events::{topics, EventEmitter};
use metrics::ModuleMetrics;
use parking_lot::Mutex;
use std::any::TypeId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    Constructed,
    Setup,
    Running,
    Stopped,
}

/// The four I/O shapes a module can take. Spec'd as a capability set
/// rather than a class hierarchy: a `ModuleKind` just tells `ModuleNode`
/// which `ModuleBehavior` methods its worker loop should be driving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    /// Consumes from left buffers, produces to right buffers.
    General,
    /// No input; emits on its own schedule.
    Producing,
    /// Consumes from left buffers, produces nothing (a sink).
    Consuming,
    /// Produces only in response to an explicit external `trigger` call.
    Trigger,
}

/// What a concrete pipeline stage implements. All methods take `&self` —
/// any internal mutable state must use interior mutability, the same
/// discipline the IU types use, since `ModuleNode` only ever hands out
/// shared references to the behavior.
pub trait ModuleBehavior: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    /// TypeIds this module accepts on its left buffer(s). Empty for
    /// Producing/Trigger modules.
    fn input_classes(&self) -> &[TypeId] {
        &[]
    }

    /// TypeId this module produces on its right buffer(s). `None` for
    /// Consuming modules.
    fn output_class(&self) -> Option<TypeId> {
        None
    }

    /// Called once, right after the owning `ModuleNode` exists, with a
    /// handle back to it. A behavior that needs to create IUs through the
    /// module's factory, or manage its own `current_input`/`current_output`
    /// bookkeeping (spec.md §4.4 — membership is module-specific, e.g. an
    /// incrementalizer only keeps the latest hypothesis per word), stashes
    /// this handle; one that doesn't need it leaves the default no-op.
    fn bind(&self, _handle: ModuleHandle) {}

    /// Run once before the worker thread starts. Failure here aborts the
    /// owning network's `run()`.
    fn setup(&self) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Run once after every module in the network has completed `setup`,
    /// and before any module's worker thread starts. Unlike `setup`, a
    /// behavior here may assume every peer it subscribes to or is
    /// subscribed by has already finished its own `setup` — spec.md §4.4's
    /// two-phase split between "no assumption of peers" and "all peers
    /// ready."
    fn prepare_run(&self) -> Result<(), ModuleError> {
        Ok(())
    }

    /// General/Consuming: react to one update message from a left buffer.
    fn process_update(&self, _update: UpdateMessage) -> Result<Option<UpdateMessage>, ModuleError> {
        Ok(None)
    }

    /// Producing: called repeatedly with no input. Expected to block or
    /// sleep internally between having something to say.
    fn produce(&self) -> Result<Option<UpdateMessage>, ModuleError> {
        Ok(None)
    }

    /// Trigger: invoked by `ModuleNode::trigger`, never by the worker loop
    /// on its own.
    fn on_trigger(&self, _payload: serde_json::Value) -> Result<Option<UpdateMessage>, ModuleError> {
        Ok(None)
    }

    /// Run once after the worker thread has stopped.
    fn shutdown(&self) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Identifies this behavior's constructor in a `.rtc` file. Modules
    /// that return `None` (the default) are skipped by `network::persistence::save`
    /// rather than failing the whole save.
    fn class_id(&self) -> Option<&'static str> {
        None
    }

    /// Primitive constructor arguments needed to rebuild this module via
    /// its registered factory. Only consulted when `class_id` is `Some`.
    fn constructor_args(&self) -> std::collections::HashMap<String, crate::network::persistence::ConstructorArg> {
        std::collections::HashMap::new()
    }
}

struct ModuleInner {
    left_buffers: Vec<(ModuleRef, Arc<crate::queue::IncrementalQueue>)>,
    right_buffers: Vec<(ModuleRef, Arc<crate::queue::IncrementalQueue>)>,
    previous_iu: Option<Arc<dyn IncrementalUnit>>,
    iu_counter: u64,
    current_input: Vec<Arc<dyn IncrementalUnit>>,
    current_output: Vec<Arc<dyn IncrementalUnit>>,
}

/// A non-owning handle a `ModuleBehavior` can stash (via `bind`) to reach
/// back into its own `ModuleNode` — create chained IUs, or manage the
/// revoke/commit bookkeeping lists. `Weak` because the node already owns
/// the behavior; a strong handle back would be a cycle.
#[derive(Clone, Debug)]
pub struct ModuleHandle {
    node: Weak<ModuleNode>,
}

impl ModuleHandle {
    fn with_node<R>(&self, f: impl FnOnce(&ModuleNode) -> R) -> Option<R> {
        self.node.upgrade().map(|node| f(&node))
    }

    /// See `ModuleNode::create_iu`.
    pub fn create_iu<U, F>(&self, grounded_in: Option<Arc<dyn IncrementalUnit>>, build: F) -> Option<Arc<U>>
    where
        U: IncrementalUnit + 'static,
        F: FnOnce(
            Option<ModuleRef>,
            String,
            Option<Arc<dyn IncrementalUnit>>,
            Option<Arc<dyn IncrementalUnit>>,
        ) -> U,
    {
        self.node.upgrade().map(|node| node.create_iu(grounded_in, build))
    }

    pub fn add_current_input(&self, iu: Arc<dyn IncrementalUnit>) {
        self.with_node(|n| n.add_current_input(iu));
    }

    pub fn add_current_output(&self, iu: Arc<dyn IncrementalUnit>) {
        self.with_node(|n| n.add_current_output(iu));
    }

    pub fn set_current_input(&self, ius: Vec<Arc<dyn IncrementalUnit>>) {
        self.with_node(|n| n.set_current_input(ius));
    }

    pub fn set_current_output(&self, ius: Vec<Arc<dyn IncrementalUnit>>) {
        self.with_node(|n| n.set_current_output(ius));
    }

    pub fn current_input(&self) -> Vec<Arc<dyn IncrementalUnit>> {
        self.with_node(|n| n.current_input()).unwrap_or_default()
    }

    pub fn current_output(&self) -> Vec<Arc<dyn IncrementalUnit>> {
        self.with_node(|n| n.current_output()).unwrap_or_default()
    }

    pub fn input_committed(&self) -> bool {
        self.with_node(|n| n.input_committed()).unwrap_or(true)
    }

    pub fn revoke(&self, iu: Arc<dyn IncrementalUnit>, remove_revoked: bool) -> Result<(), ModuleError> {
        match self.with_node(|n| n.revoke(iu, remove_revoked)) {
            Some(result) => result,
            None => Ok(()),
        }
    }

    pub fn commit(&self, iu: Arc<dyn IncrementalUnit>) -> Result<(), ModuleError> {
        match self.with_node(|n| n.commit(iu)) {
            Some(result) => result,
            None => Ok(()),
        }
    }

    pub fn publish(&self, message: UpdateMessage) -> Result<(), ModuleError> {
        match self.with_node(|n| n.publish(message)) {
            Some(result) => result,
            None => Ok(()),
        }
    }
}

/// A module wired into a network: identity, buffers, worker thread, and
/// ambient event/metrics tracking, around a behavior.
pub struct ModuleNode {
    id: ModuleId,
    name: Arc<str>,
    kind: ModuleKind,
    behavior: Box<dyn ModuleBehavior>,
    state: Mutex<ModuleState>,
    running: AtomicBool,
    inner: Mutex<ModuleInner>,
    thread: Mutex<Option<JoinHandle<()>>>,
    lifecycle: Mutex<()>,
    events: EventEmitter,
    metrics: ModuleMetrics,
    config: Config,
}

impl ModuleNode {
    pub fn new(kind: ModuleKind, behavior: Box<dyn ModuleBehavior>) -> Arc<Self> {
        Self::with_config(kind, behavior, Config::default())
    }

    pub fn with_config(kind: ModuleKind, behavior: Box<dyn ModuleBehavior>, config: Config) -> Arc<Self> {
        let name: Arc<str> = Arc::from(behavior.name());
        let node = Arc::new(Self {
            id: ModuleId::new(),
            name,
            kind,
            behavior,
            state: Mutex::new(ModuleState::Constructed),
            running: AtomicBool::new(false),
            inner: Mutex::new(ModuleInner {
                left_buffers: Vec::new(),
                right_buffers: Vec::new(),
                previous_iu: None,
                iu_counter: 0,
                current_input: Vec::new(),
                current_output: Vec::new(),
            }),
            thread: Mutex::new(None),
            lifecycle: Mutex::new(()),
            events: EventEmitter::new(),
            metrics: ModuleMetrics::new(),
            config,
        });
        node.behavior.bind(ModuleHandle {
            node: Arc::downgrade(&node),
        });
        node
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ModuleKind {
        self.kind
    }

    pub fn module_ref(&self) -> ModuleRef {
        ModuleRef::new(self.id, self.name.clone())
    }

    pub fn state(&self) -> ModuleState {
        *self.state.lock()
    }

    pub fn input_classes(&self) -> &[TypeId] {
        self.behavior.input_classes()
    }

    pub fn output_class(&self) -> Option<TypeId> {
        self.behavior.output_class()
    }

    pub fn behavior_class_id(&self) -> Option<&'static str> {
        self.behavior.class_id()
    }

    pub fn behavior_constructor_args(
        &self,
    ) -> std::collections::HashMap<String, crate::network::persistence::ConstructorArg> {
        self.behavior.constructor_args()
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub fn metrics(&self) -> metrics::ModuleStats {
        self.metrics.snapshot()
    }

    pub fn providers(&self) -> Vec<ModuleRef> {
        self.inner.lock().left_buffers.iter().map(|(m, _)| m.clone()).collect()
    }

    pub fn consumers(&self) -> Vec<ModuleRef> {
        self.inner.lock().right_buffers.iter().map(|(m, _)| m.clone()).collect()
    }

    /// Transition Constructed -> Setup, running the behavior's `setup`
    /// hook. Must be called exactly once before `start`.
    pub fn setup(&self) -> Result<(), ModuleError> {
        {
            let mut state = self.state.lock();
            if *state != ModuleState::Constructed {
                return Err(ModuleError::InvalidConfig(format!(
                    "cannot setup module '{}' from state {:?}",
                    self.name, *state
                )));
            }
            *state = ModuleState::Setup;
        }
        self.behavior.setup()?;
        Ok(())
    }

    /// Run the behavior's `prepare_run` hook. Called by `Network::run`
    /// after every module in the network has finished `setup`, and before
    /// any module's worker thread starts. Does not itself transition
    /// `state` — `start` still owns the Setup -> Running move.
    pub fn prepare_run(&self) -> Result<(), ModuleError> {
        self.behavior.prepare_run()
    }

    /// Wire `self` as a provider for `consumer`: allocate a fresh queue,
    /// register it on both sides, and fire the `subscribe` event.
    pub fn subscribe(self: &Arc<Self>, consumer: &Arc<ModuleNode>) -> Result<(), ModuleError> {
        if self.kind == ModuleKind::Consuming {
            return Err(ModuleError::ConsumingModuleCannotBeSubscribed);
        }
        if let Some(produced) = self.output_class() {
            let wants = consumer.input_classes();
            if !wants.is_empty() && !wants.contains(&produced) {
                return Err(ModuleError::TypeViolation {
                    module: consumer.name.to_string(),
                    type_id: produced,
                });
            }
        }
        let queue = Arc::new(crate::queue::IncrementalQueue::unbounded());
        self.inner
            .lock()
            .right_buffers
            .push((consumer.module_ref(), queue.clone()));
        consumer
            .inner
            .lock()
            .left_buffers
            .push((self.module_ref(), queue));
        self.events.emit(
            topics::SUBSCRIBE,
            serde_json::json!({
                "provider": self.name.to_string(),
                "consumer": consumer.name.to_string(),
            }),
        );
        Ok(())
    }

    /// Drop `consumer` from this module's right buffers. Copies the list
    /// out before filtering so a concurrent worker cycle iterating the
    /// old snapshot isn't disturbed.
    pub fn remove_from_rb(&self, consumer_id: ModuleId) {
        let mut inner = self.inner.lock();
        let snapshot = std::mem::take(&mut inner.right_buffers);
        for (module_ref, queue) in snapshot {
            if module_ref.id == consumer_id {
                queue.remove();
            } else {
                inner.right_buffers.push((module_ref, queue));
            }
        }
    }

    /// Drop `provider` from this module's left buffers, same copy-then-
    /// filter discipline as `remove_from_rb`.
    pub fn remove_from_lb(&self, provider_id: ModuleId) {
        let mut inner = self.inner.lock();
        let snapshot = std::mem::take(&mut inner.left_buffers);
        for (module_ref, queue) in snapshot {
            if module_ref.id == provider_id {
                queue.remove();
            } else {
                inner.left_buffers.push((module_ref, queue));
            }
        }
    }

    /// Undo a `subscribe`: removes `consumer` from this module's right
    /// buffers and removes `self` from `consumer`'s left buffers.
    pub fn remove(&self, consumer: &ModuleNode) {
        self.remove_from_rb(consumer.id);
        consumer.remove_from_lb(self.id);
    }

    fn next_iu_id(&self) -> String {
        let mut inner = self.inner.lock();
        inner.iu_counter += 1;
        format!("{}:{}", self.id, inner.iu_counter)
    }

    fn previous_iu(&self) -> Option<Arc<dyn IncrementalUnit>> {
        self.inner.lock().previous_iu.clone()
    }

    /// Construct a new IU chained off this module's previous IU, and
    /// remember it as the new previous IU. `build` receives
    /// `(creator, iuid, previous_iu, grounded_in)` — the same arguments
    /// every concrete IU constructor in this crate takes.
    pub fn create_iu<U, F>(&self, grounded_in: Option<Arc<dyn IncrementalUnit>>, build: F) -> Arc<U>
    where
        U: IncrementalUnit + 'static,
        F: FnOnce(
            Option<ModuleRef>,
            String,
            Option<Arc<dyn IncrementalUnit>>,
            Option<Arc<dyn IncrementalUnit>>,
        ) -> U,
    {
        let iuid = self.next_iu_id();
        let previous = self.previous_iu();
        let iu = Arc::new(build(Some(self.module_ref()), iuid, previous, grounded_in));
        let dyn_iu: Arc<dyn IncrementalUnit> = iu.clone();
        self.inner.lock().previous_iu = Some(dyn_iu);
        iu
    }

    /// Deliver `message` to every subscriber, one independent clone per
    /// consumer (the IUs inside stay shared, only the message envelope is
    /// duplicated). A message containing an IU outside this module's
    /// declared output class is a programming error in the behavior, not
    /// a recoverable runtime condition, so it's fatal to the worker.
    pub fn publish(&self, message: UpdateMessage) -> Result<(), ModuleError> {
        if let Some(produced) = self.output_class() {
            if !message.has_valid_ius(&[produced]) {
                self.running.store(false, Ordering::Release);
                return Err(ModuleError::OutputTypeViolation {
                    module: self.name.to_string(),
                    type_id: produced,
                });
            }
        }
        let buffers = { self.inner.lock().right_buffers.clone() };
        for (consumer, queue) in buffers {
            if let Err(err) = queue.put(message.clone()) {
                tracing::warn!(
                    module = %self.name,
                    consumer = %consumer,
                    error = %err,
                    "dropping update, consumer queue already removed"
                );
            }
        }
        Ok(())
    }

    pub fn current_input(&self) -> Vec<Arc<dyn IncrementalUnit>> {
        self.inner.lock().current_input.clone()
    }

    pub fn current_output(&self) -> Vec<Arc<dyn IncrementalUnit>> {
        self.inner.lock().current_output.clone()
    }

    pub fn set_current_input(&self, ius: Vec<Arc<dyn IncrementalUnit>>) {
        self.inner.lock().current_input = ius;
    }

    pub fn set_current_output(&self, ius: Vec<Arc<dyn IncrementalUnit>>) {
        self.inner.lock().current_output = ius;
    }

    pub fn add_current_input(&self, iu: Arc<dyn IncrementalUnit>) {
        self.inner.lock().current_input.push(iu);
    }

    pub fn add_current_output(&self, iu: Arc<dyn IncrementalUnit>) {
        self.inner.lock().current_output.push(iu);
    }

    /// True iff every IU in `current_input` is committed (spec.md §4.4).
    /// An empty `current_input` is vacuously committed.
    pub fn input_committed(&self) -> bool {
        self.inner.lock().current_input.iter().all(|iu| iu.committed())
    }

    /// Find `iu` by identity in `current_input`/`current_output`, mark it
    /// revoked, and (when `remove_revoked`, the default in the spec) drop
    /// it from whichever list held it. Also publishes a REVOKE update so
    /// downstream subscribers learn about it — the bookkeeping lists are
    /// this module's own view, not a broadcast by themselves.
    pub fn revoke(&self, iu: Arc<dyn IncrementalUnit>, remove_revoked: bool) -> Result<(), ModuleError> {
        iu.set_revoked(true);
        let mut inner = self.inner.lock();
        if remove_revoked {
            inner.current_input.retain(|i| i.iuid() != iu.iuid());
            inner.current_output.retain(|i| i.iuid() != iu.iuid());
        }
        drop(inner);
        self.publish(UpdateMessage::from_iu(iu, UpdateType::Revoke))
    }

    /// Mark `iu` committed. It stays in whichever of
    /// `current_input`/`current_output` held it (spec.md §4.4: commit never
    /// removes), which happens automatically since both lists hold the same
    /// `Arc` the caller passed in. Publishes a COMMIT update.
    pub fn commit(&self, iu: Arc<dyn IncrementalUnit>) -> Result<(), ModuleError> {
        iu.set_committed(true);
        self.publish(UpdateMessage::from_iu(iu, UpdateType::Commit))
    }

    /// Start the worker thread. Requires `setup()` to have run first.
    pub fn start(self: &Arc<Self>) -> Result<(), ModuleError> {
        {
            let mut state = self.state.lock();
            if *state != ModuleState::Setup {
                return Err(ModuleError::InvalidConfig(format!(
                    "cannot start module '{}' from state {:?}",
                    self.name, *state
                )));
            }
            *state = ModuleState::Running;
        }
        self.running.store(true, Ordering::Release);
        let worker = self.clone();
        let handle = std::thread::Builder::new()
            .name(format!("retico-{}", self.name))
            .spawn(move || worker.worker_loop())
            .expect("spawning module worker thread");
        *self.thread.lock() = Some(handle);
        self.events.emit(
            topics::START,
            serde_json::json!({ "module": self.name.to_string() }),
        );
        Ok(())
    }

    /// Signal the worker to stop and join its thread. Convergence is
    /// bounded by the per-buffer queue timeout: the worker re-checks
    /// `running` at least once per buffer per cycle.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
        *self.state.lock() = ModuleState::Stopped;
        if let Err(err) = self.behavior.shutdown() {
            tracing::error!(module = %self.name, error = %err, "shutdown hook failed");
        }
        self.events.emit(
            topics::STOP,
            serde_json::json!({ "module": self.name.to_string() }),
        );
    }

    /// Trigger modules only: invoke `on_trigger` directly, bypassing the
    /// worker loop's own polling.
    pub fn trigger(&self, payload: serde_json::Value) -> Result<(), ModuleError> {
        if self.kind != ModuleKind::Trigger {
            return Err(ModuleError::Unsupported("trigger"));
        }
        let _guard = self.lifecycle.lock();
        let started = Instant::now();
        let result = self.behavior.on_trigger(payload);
        self.metrics.record(started.elapsed());
        match result? {
            Some(update) => self.publish(update),
            None => Ok(()),
        }
    }

    fn worker_loop(self: Arc<Self>) {
        while self.running.load(Ordering::Acquire) {
            self.run_cycle();
        }
    }

    /// A module's declared input classes are enforced before the update
    /// ever reaches `process_update`: an unexpected IU type is a wiring
    /// bug, and the same rule as `publish` applies — it's fatal to the
    /// worker, not something to silently drop.
    fn run_cycle(&self) {
        let _guard = self.lifecycle.lock();
        match self.kind {
            ModuleKind::Producing => {
                let started = Instant::now();
                let result = self.behavior.produce();
                self.metrics.record(started.elapsed());
                match result {
                    Ok(Some(update)) => self.publish_or_fault(update),
                    Ok(None) => std::thread::sleep(self.config.queue_timeout),
                    Err(err) => tracing::error!(module = %self.name, error = %err, "produce failed"),
                }
            }
            ModuleKind::Trigger => {
                std::thread::sleep(self.config.trigger_idle);
            }
            ModuleKind::General | ModuleKind::Consuming => {
                let buffers = { self.inner.lock().left_buffers.clone() };
                if buffers.is_empty() {
                    std::thread::sleep(self.config.queue_timeout);
                    return;
                }
                for (_provider, queue) in buffers {
                    if !self.running.load(Ordering::Acquire) {
                        break;
                    }
                    let Some(update) = queue.get(self.config.queue_timeout) else {
                        continue;
                    };
                    let input_classes = self.input_classes();
                    if !input_classes.is_empty() && !update.has_valid_ius(input_classes) {
                        self.running.store(false, Ordering::Release);
                        tracing::error!(module = %self.name, "received an IU outside the declared input classes");
                        break;
                    }
                    update.set_processed(self.module_ref());
                    for (iu, _) in update.iter() {
                        self.events.emit(
                            topics::PROCESS_IU,
                            serde_json::json!({
                                "module": self.name.to_string(),
                                "iuid": iu.iuid(),
                            }),
                        );
                    }
                    self.events.emit(
                        topics::PROCESS_UPDATE_MESSAGE,
                        serde_json::json!({
                            "module": self.name.to_string(),
                            "count": update.len(),
                        }),
                    );
                    let started = Instant::now();
                    let result = self.behavior.process_update(update);
                    self.metrics.record(started.elapsed());
                    match result {
                        Ok(Some(out)) => self.publish_or_fault(out),
                        Ok(None) => {}
                        Err(err) => {
                            tracing::error!(module = %self.name, error = %err, "process_update failed")
                        }
                    }
                }
            }
        }
    }

    fn publish_or_fault(&self, message: UpdateMessage) {
        if let Err(err) = self.publish(message) {
            tracing::error!(module = %self.name, error = %err, "stopping worker after output type violation");
        }
    }
}

impl std::fmt::Debug for ModuleNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleNode")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("state", &self.state())
            .finish()
    }
}
