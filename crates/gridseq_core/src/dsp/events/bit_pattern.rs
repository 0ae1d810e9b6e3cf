use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::dsp::sequencer::cells::GATE_OUT_VOLTS;
use crate::dsp::sequencer::engine::TRIGGER_SECS;
use crate::dsp::utils::{GateDetector, PulseTimer};
use crate::types::Signal;

pub const PATTERN_BITS: usize = 15;
const COUNTER_WRAP: u32 = 1 << PATTERN_BITS;

#[derive(Deserialize, JsonSchema, Connect)]
#[serde(default, rename_all = "camelCase")]
struct BitPatternParams {
    /// clock input
    clock: Signal,
    /// run input, high when unpatched
    run: Signal,
    /// reset input, zeroes the counter
    reset: Signal,
    /// per-bit switches, LSB first: -1 force-low / 0 don't-care / 1 force-high
    bits: Vec<i8>,
}

impl Default for BitPatternParams {
    fn default() -> Self {
        Self {
            clock: Signal::default(),
            run: Signal::default(),
            reset: Signal::default(),
            bits: Vec::new(),
        }
    }
}

#[derive(Outputs, JsonSchema)]
struct BitPatternOutputs {
    #[output("gate", "composite match gate", default)]
    gate: f32,
    #[output("trig", "trigger on a rising match")]
    trig: f32,
    #[output("count", "raw counter value")]
    count: f32,
}

/// 15-bit counter event generator: a gate fires whenever every decided bit
/// switch matches the counter. All-don't-care never asserts.
#[derive(Default, Module)]
#[module("bitPattern", "15-bit counter event generator")]
#[args(clock, run?, reset?)]
#[stateful]
pub struct BitPattern {
    outputs: BitPatternOutputs,
    params: BitPatternParams,
    clock: GateDetector,
    run: GateDetector,
    reset: GateDetector,
    counter: u32,
    gate_was_high: bool,
    trig: PulseTimer,
}

#[derive(Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct BitPatternState {
    version: u32,
    counter: u32,
    clock_high: bool,
    run_high: bool,
}

impl Default for BitPatternState {
    fn default() -> Self {
        Self {
            version: 1,
            counter: 0,
            clock_high: false,
            run_high: false,
        }
    }
}

impl BitPattern {
    fn matches(&self) -> bool {
        let mut decided = false;
        for (bit, switch) in self.params.bits.iter().take(PATTERN_BITS).enumerate() {
            let level = self.counter & (1 << bit) != 0;
            match switch.signum() {
                0 => continue,
                1 => {
                    decided = true;
                    if !level {
                        return false;
                    }
                }
                _ => {
                    decided = true;
                    if level {
                        return false;
                    }
                }
            }
        }
        decided
    }

    fn update(&mut self, sample_rate: f32) -> () {
        let dt = 1.0 / sample_rate;

        self.clock.set(self.params.clock.get_value());
        self.run.set(self.params.run.get_value_or(10.0));
        self.reset.set(self.params.reset.get_value());

        if self.reset.high() {
            self.counter = 0;
        } else if self.clock.leading_edge() && self.run.high() {
            self.counter = (self.counter + 1) % COUNTER_WRAP;
        }

        let gate_high = self.matches();
        if gate_high && !self.gate_was_high {
            self.trig.trigger(TRIGGER_SECS);
        }
        self.gate_was_high = gate_high;

        self.outputs.gate = if gate_high { GATE_OUT_VOLTS } else { 0.0 };
        self.outputs.trig = if self.trig.process(dt) { GATE_OUT_VOLTS } else { 0.0 };
        self.outputs.count = self.counter as f32;
    }
}

impl crate::types::StatefulModule for BitPattern {
    fn get_state(&self) -> Option<serde_json::Value> {
        serde_json::to_value(BitPatternState {
            version: 1,
            counter: self.counter,
            clock_high: self.clock.high(),
            run_high: self.run.high(),
        })
        .ok()
    }

    fn load_state(&mut self, state: &serde_json::Value) {
        if let Ok(state) = serde_json::from_value::<BitPatternState>(state.clone()) {
            self.counter = state.counter % COUNTER_WRAP;
            self.clock.set_level(state.clock_high);
            self.run.set_level(state.run_high);
        }
    }
}

message_handlers!(impl BitPattern {});
