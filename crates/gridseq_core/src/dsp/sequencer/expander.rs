//! Expansion link between chained sequencer modules.
//!
//! A master sequencer publishes its shared state every frame; each channel
//! expander to its right consumes the previous frame's message and republishes
//! its own. The link is an explicit two-slot buffer: producers always write
//! the back slot, consumers always read the front slot, and the host flips
//! the slots between frames. State published at frame T is therefore first
//! visible at frame T+1 regardless of module update order within a frame.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Per-frame state packet shared along an expander chain.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ExpansionMessage {
    /// 1-based active step, 0 when parked.
    pub position: i32,
    pub length: i32,
    /// The writer advanced this frame. Carried explicitly because a repeated
    /// position (length 1, or a random draw landing on the same step) is
    /// still a step.
    pub stepped: bool,
    pub clock_high: bool,
    pub running: bool,
    /// Chain slot of the writer, 1-7. 0 means unnumbered.
    pub channel: u8,
    /// Whether a master sequencer heads this chain.
    pub has_master: bool,
}

impl ExpansionMessage {
    /// The state a consumer reads when no compatible producer is attached.
    pub fn neutral() -> Self {
        Self::default()
    }
}

/// Two-slot double buffer carrying `ExpansionMessage` across one link.
pub struct ExpanderLink {
    slots: [Mutex<ExpansionMessage>; 2],
    front: AtomicUsize,
    flip_requested: AtomicBool,
}

impl ExpanderLink {
    pub fn new() -> Self {
        Self {
            slots: [
                Mutex::new(ExpansionMessage::neutral()),
                Mutex::new(ExpansionMessage::neutral()),
            ],
            front: AtomicUsize::new(0),
            flip_requested: AtomicBool::new(false),
        }
    }

    /// Producer side: write the back slot and request a flip. The message
    /// becomes readable only after the host flips between frames.
    pub fn publish(&self, message: ExpansionMessage) {
        let back = 1 - self.front.load(Ordering::Acquire);
        *self.slots[back].lock() = message;
        self.flip_requested.store(true, Ordering::Release);
    }

    /// Consumer side: read the front slot.
    pub fn read(&self) -> ExpansionMessage {
        let front = self.front.load(Ordering::Acquire);
        *self.slots[front].lock()
    }

    /// Host side, between frames: present the last published message.
    pub fn flip_if_requested(&self) {
        if self.flip_requested.swap(false, Ordering::AcqRel) {
            let front = self.front.load(Ordering::Acquire);
            self.front.store(1 - front, Ordering::Release);
        }
    }
}

impl Default for ExpanderLink {
    fn default() -> Self {
        Self::new()
    }
}
