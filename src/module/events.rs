//! Per-module event emitter: named topics plus a `"*"` wildcard, detached
//! dispatch so a slow subscriber never stalls the emitting module's worker
//! thread.

use serde_json::Value as EventPayload;
use std::collections::HashMap;
use std::sync::Arc;

pub type EventCallback = Arc<dyn Fn(&str, &EventPayload) + Send + Sync>;

/// Built-in topics every module may emit. Embedders can subscribe to these
/// by name, or to `"*"` to receive everything.
pub mod topics {
    pub const PROCESS_IU: &str = "process_iu";
    pub const PROCESS_UPDATE_MESSAGE: &str = "process_update_message";
    pub const SUBSCRIBE: &str = "subscribe";
    pub const START: &str = "start";
    pub const STOP: &str = "stop";
}

/// Receiver-only wildcard: you can subscribe to `"*"` to hear every topic,
/// but emitting to `"*"` directly is not a thing — events are always
/// published under their real topic name.
pub const WILDCARD: &str = "*";

#[derive(Default)]
pub struct EventEmitter {
    subscribers: parking_lot::Mutex<HashMap<String, Vec<EventCallback>>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, topic: impl Into<String>, callback: EventCallback) {
        self.subscribers
            .lock()
            .entry(topic.into())
            .or_default()
            .push(callback);
    }

    /// Fire-and-forget: matching callbacks run on the shared rayon pool.
    pub fn emit(&self, topic: &str, payload: EventPayload) {
        let callbacks = {
            let subs = self.subscribers.lock();
            let mut matched: Vec<EventCallback> = Vec::new();
            if let Some(direct) = subs.get(topic) {
                matched.extend(direct.iter().cloned());
            }
            if topic != WILDCARD {
                if let Some(wild) = subs.get(WILDCARD) {
                    matched.extend(wild.iter().cloned());
                }
            }
            matched
        };
        for cb in callbacks {
            let topic = topic.to_string();
            let payload = payload.clone();
            rayon::spawn(move || cb(&topic, &payload));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc as StdArc;
    use std::time::Duration;

    #[test]
    fn wildcard_receives_every_topic() {
        let emitter = EventEmitter::new();
        let hits = StdArc::new(AtomicUsize::new(0));
        let hits2 = hits.clone();
        emitter.subscribe(WILDCARD, Arc::new(move |_topic, _payload| {
            hits2.fetch_add(1, Ordering::SeqCst);
        }));
        emitter.emit(topics::START, serde_json::json!({}));
        emitter.emit(topics::STOP, serde_json::json!({}));
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn direct_subscriber_ignores_other_topics() {
        let emitter = EventEmitter::new();
        let hits = StdArc::new(AtomicUsize::new(0));
        let hits2 = hits.clone();
        emitter.subscribe(topics::START, Arc::new(move |_topic, _payload| {
            hits2.fetch_add(1, Ordering::SeqCst);
        }));
        emitter.emit(topics::STOP, serde_json::json!({}));
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
