//! Core patch structure for DSP processing
//!
//! This module contains the core `Patch` struct which represents a graph of
//! connected sequencer modules. Besides cable routing, the patch owns the
//! registry of expansion links through which chained sequencer modules share
//! position and transport state.

use crate::dsp::sequencer::expander::ExpanderLink;
use crate::types::{Message, MessageTag, Sampleable, SampleableMap};

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

#[derive(Clone)]
struct MessageListenerRef {
    id: String,
    weak: Weak<Box<dyn Sampleable>>,
}

/// The core patch structure containing the DSP graph
pub struct Patch {
    pub sampleables: SampleableMap,
    message_listeners: HashMap<MessageTag, Vec<MessageListenerRef>>,
    /// Expansion links keyed by producer module id. A consumer placed to the
    /// right of `producer_id` creates the link during wiring; the producer
    /// finds it in the second wiring phase.
    expanders: Mutex<HashMap<String, Arc<ExpanderLink>>>,
}

impl Patch {
    /// Create a new empty patch
    pub fn new(sampleables: SampleableMap) -> Self {
        let mut patch = Patch {
            sampleables,
            message_listeners: HashMap::new(),
            expanders: Mutex::new(HashMap::new()),
        };
        patch.rebuild_message_listeners();
        patch
    }

    /// Wire up the graph: first pass connects cables and lets consumers
    /// register expansion links, second pass lets producers resolve the links
    /// their consumers created.
    pub fn wire(&mut self) {
        let modules: Vec<Arc<Box<dyn Sampleable>>> = self.sampleables.values().cloned().collect();
        for module in &modules {
            module.connect(self);
        }
        for module in &modules {
            module.on_patch_update(self);
        }
        self.rebuild_message_listeners();
    }

    /// Get (or create) the expansion link whose back buffer `producer_id`
    /// writes into. Called by consumers during the first wiring phase.
    pub fn expander_link(&self, producer_id: &str) -> Arc<ExpanderLink> {
        let mut expanders = self.expanders.lock();
        expanders
            .entry(producer_id.to_string())
            .or_insert_with(|| Arc::new(ExpanderLink::new()))
            .clone()
    }

    /// Look up the expansion link registered against `producer_id`, if any
    /// consumer created one. Called by producers in the second wiring phase.
    pub fn outgoing_expander(&self, producer_id: &str) -> Option<Arc<ExpanderLink>> {
        self.expanders.lock().get(producer_id).cloned()
    }

    /// Present every expansion message written during the last frame.
    ///
    /// Buffers flip between frames, never mid-frame, so a message published
    /// while processing frame N is first observable in frame N+1.
    pub fn flip_expanders(&self) {
        for link in self.expanders.lock().values() {
            link.flip_if_requested();
        }
    }

    pub fn rebuild_message_listeners(&mut self) {
        self.message_listeners.clear();
        for (id, sampleable) in &self.sampleables {
            for tag in sampleable.handled_message_tags() {
                self.message_listeners
                    .entry(*tag)
                    .or_default()
                    .push(MessageListenerRef {
                        id: id.clone(),
                        weak: Arc::downgrade(sampleable),
                    });
            }
        }
    }

    /// Collect strong references to all modules currently in this patch that
    /// have registered to handle the given message tag.
    ///
    /// This method prunes stale entries. In particular, it will never return a
    /// module that is no longer present in `self.sampleables`, even if some
    /// other subsystem still holds a strong `Arc` to that module.
    pub fn message_listeners_for(&mut self, tag: MessageTag) -> Vec<Arc<Box<dyn Sampleable>>> {
        let Some(list) = self.message_listeners.get_mut(&tag) else {
            return Vec::new();
        };

        list.retain(|r| {
            if !self.sampleables.contains_key(&r.id) {
                return false;
            }
            r.weak.upgrade().is_some()
        });

        list.iter()
            .filter(|r| self.sampleables.contains_key(&r.id))
            .filter_map(|r| r.weak.upgrade())
            .collect()
    }

    pub fn dispatch_message(&mut self, message: &Message) -> crate::error::Result<()> {
        let listeners = self.message_listeners_for(message.tag());
        for s in listeners {
            s.handle_message(message)?;
        }
        Ok(())
    }

    /// Process one sample frame: mark every module dirty, pull every module
    /// once, then flip the expansion link buffers for the next frame.
    pub fn process_frame(&self) {
        for sampleable in self.sampleables.values() {
            sampleable.tick();
        }
        for sampleable in self.sampleables.values() {
            sampleable.update();
        }
        self.flip_expanders();
    }

    /// Read one output port of one module.
    pub fn get_sample(&self, id: &String, port: &String) -> crate::error::Result<f32> {
        match self.sampleables.get(id) {
            Some(sampleable) => sampleable.get_sample(port),
            None => Err(crate::error::ModuleError::UnknownModule(id.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::error::Result;
    use crate::types::MessageHandler;

    #[test]
    fn test_patch_new_empty() {
        let patch = Patch::new(HashMap::new());
        assert!(patch.sampleables.is_empty());
    }

    struct DummyMessageSampleable {
        id: String,
    }

    impl Sampleable for DummyMessageSampleable {
        fn get_id(&self) -> &String {
            &self.id
        }

        fn tick(&self) {}

        fn update(&self) {}

        fn get_sample(&self, _port: &String) -> Result<f32> {
            Ok(0.0)
        }

        fn get_module_type(&self) -> String {
            "dummy".to_string()
        }

        fn try_update_params(&self, _params: serde_json::Value) -> Result<()> {
            Ok(())
        }

        fn connect(&self, _patch: &Patch) {}
    }

    impl MessageHandler for DummyMessageSampleable {
        fn handled_message_tags(&self) -> &'static [MessageTag] {
            &[MessageTag::Clock]
        }

        fn handle_message(&self, _message: &Message) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn message_listeners_never_return_removed_modules() {
        let s: Arc<Box<dyn Sampleable>> = Arc::new(Box::new(DummyMessageSampleable {
            id: "m1".to_string(),
        }));

        let mut sampleables: SampleableMap = HashMap::new();
        sampleables.insert("m1".to_string(), Arc::clone(&s));
        let mut patch = Patch::new(sampleables);

        // Index should include it.
        assert_eq!(patch.message_listeners_for(MessageTag::Clock).len(), 1);

        // Remove from patch but keep an external strong ref (`s`).
        patch.sampleables.remove("m1");

        // Rebuild/prune and ensure it is not returned.
        assert_eq!(patch.message_listeners_for(MessageTag::Clock).len(), 0);
    }

    #[test]
    fn expander_link_is_shared_per_producer() {
        let patch = Patch::new(HashMap::new());
        let a = patch.expander_link("seq-1");
        let b = patch.expander_link("seq-1");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(patch.outgoing_expander("seq-1").is_some());
        assert!(patch.outgoing_expander("seq-2").is_none());
    }
}
