use std::collections::HashMap;

use crate::types::{ModuleSchema, ParamsValidator, SampleableConstructor};

pub mod events;
pub mod logic;
pub mod sequencer;
pub mod utils;

pub fn get_constructors() -> HashMap<String, SampleableConstructor> {
    let mut map = HashMap::new();
    sequencer::install_constructors(&mut map);
    events::install_constructors(&mut map);
    logic::install_constructors(&mut map);
    map
}

/// Returns a map of `module_type` -> typed params validator.
///
/// A typed params validator attempts to deserialize a module's `ModuleState.params` JSON
/// into that module's concrete `*Params` struct.
pub fn get_param_validators() -> HashMap<String, ParamsValidator> {
    let mut map = HashMap::new();
    sequencer::install_param_validators(&mut map);
    events::install_param_validators(&mut map);
    logic::install_param_validators(&mut map);
    map
}

pub fn schema() -> Vec<ModuleSchema> {
    [
        sequencer::schemas(),
        events::schemas(),
        logic::schemas(),
    ]
    .concat()
}
