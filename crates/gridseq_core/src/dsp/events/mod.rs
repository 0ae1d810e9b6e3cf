use std::collections::HashMap;

use crate::types::{Module, ModuleSchema, ParamsValidator, SampleableConstructor};

pub mod bit_pattern;

pub fn install_constructors(map: &mut HashMap<String, SampleableConstructor>) {
    bit_pattern::BitPattern::install_constructor(map);
}

pub fn install_param_validators(map: &mut HashMap<String, ParamsValidator>) {
    bit_pattern::BitPattern::install_params_validator(map);
}

pub fn schemas() -> Vec<ModuleSchema> {
    vec![bit_pattern::BitPattern::get_schema()]
}
