use std::collections::HashMap;

use crate::types::{Module, ModuleSchema, ParamsValidator, SampleableConstructor};

pub mod sr_latch;

pub fn install_constructors(map: &mut HashMap<String, SampleableConstructor>) {
    sr_latch::SrLatch::install_constructor(map);
}

pub fn install_param_validators(map: &mut HashMap<String, ParamsValidator>) {
    sr_latch::SrLatch::install_params_validator(map);
}

pub fn schemas() -> Vec<ModuleSchema> {
    vec![sr_latch::SrLatch::get_schema()]
}
