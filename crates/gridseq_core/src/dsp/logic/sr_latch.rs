use schemars::JsonSchema;
use serde::Deserialize;

use crate::dsp::sequencer::cells::GATE_OUT_VOLTS;
use crate::dsp::utils::GateDetector;
use crate::types::Signal;

#[derive(Deserialize, Default, JsonSchema, Connect)]
#[serde(default)]
struct SrLatchParams {
    /// set input
    set: Signal,
    /// reset input
    reset: Signal,
    /// enable input, high when unpatched
    enable: Signal,
}

#[derive(Outputs, JsonSchema)]
struct SrLatchOutputs {
    #[output("q", "latch output", default)]
    q: f32,
    #[output("qInv", "complementary latch output")]
    q_inv: f32,
}

/// Level-sensitive set/reset latch with enable. Driving S and R high together
/// reports both outputs high, as the NOR-pair race really behaves; the stored
/// state is untouched until one input releases.
#[derive(Default, Module)]
#[module("srLatch", "set/reset latch with enable")]
#[args(set, reset, enable?)]
pub struct SrLatch {
    outputs: SrLatchOutputs,
    params: SrLatchParams,
    set: GateDetector,
    reset: GateDetector,
    enable: GateDetector,
    q: bool,
}

impl SrLatch {
    fn update(&mut self, _sample_rate: f32) -> () {
        self.set.set(self.params.set.get_value());
        self.reset.set(self.params.reset.get_value());
        self.enable.set(self.params.enable.get_value_or(10.0));

        let mut invalid = false;
        if self.enable.high() {
            match (self.set.high(), self.reset.high()) {
                (true, true) => invalid = true,
                (true, false) => self.q = true,
                (false, true) => self.q = false,
                (false, false) => {}
            }
        }

        if invalid {
            self.outputs.q = GATE_OUT_VOLTS;
            self.outputs.q_inv = GATE_OUT_VOLTS;
        } else {
            self.outputs.q = if self.q { GATE_OUT_VOLTS } else { 0.0 };
            self.outputs.q_inv = if self.q { 0.0 } else { GATE_OUT_VOLTS };
        }
    }
}

message_handlers!(impl SrLatch {});
