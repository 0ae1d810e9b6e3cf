//! Step sequencer engine library
//!
//! This crate provides the core DSP functionality for a family of clocked
//! step sequencer modules: gate/CV sequencers, a bit-pattern event generator,
//! a set/reset latch, and channel expanders that share sequencing state over
//! an inter-module link. It is a pure library with no I/O, protocol handling,
//! or serialization-container concerns. Those responsibilities belong in the
//! host layer.

#[macro_use]
extern crate gridseq_derive;

extern crate parking_lot;
extern crate serde;
extern crate serde_json;

pub mod dsp;
pub mod error;
pub mod patch;
pub mod types;

// Re-export commonly used items
pub use error::{ModuleError, Result};
pub use patch::Patch;

pub use types::{
    Module, ModuleSchema, ModuleState, PatchGraph, Sampleable, SampleableConstructor,
    SampleableMap,
};
