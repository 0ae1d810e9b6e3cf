use std::collections::HashMap;

use crate::types::{Module, ModuleSchema, ParamsValidator, SampleableConstructor};

pub mod cells;
pub mod channel;
pub mod engine;
pub mod expander;
pub mod gate_sequencer;
pub mod step_sequencer;
pub mod trigger_rows;

pub use engine::{DirectionMode, EdgePolicy, SequencerEngine, StepEvent};
pub use expander::{ExpanderLink, ExpansionMessage};

pub fn install_constructors(map: &mut HashMap<String, SampleableConstructor>) {
    step_sequencer::StepSeq::install_constructor(map);
    gate_sequencer::GateSeq::install_constructor(map);
    channel::SeqChannel::install_constructor(map);
    trigger_rows::TrigRows::install_constructor(map);
}

pub fn install_param_validators(map: &mut HashMap<String, ParamsValidator>) {
    step_sequencer::StepSeq::install_params_validator(map);
    gate_sequencer::GateSeq::install_params_validator(map);
    channel::SeqChannel::install_params_validator(map);
    trigger_rows::TrigRows::install_params_validator(map);
}

pub fn schemas() -> Vec<ModuleSchema> {
    vec![
        step_sequencer::StepSeq::get_schema(),
        gate_sequencer::GateSeq::get_schema(),
        channel::SeqChannel::get_schema(),
        trigger_rows::TrigRows::get_schema(),
    ]
}
