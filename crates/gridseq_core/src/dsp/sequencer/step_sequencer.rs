use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::dsp::sequencer::cells::{CvStage, GATE_OUT_VOLTS, HoldMode, step_cell};
use crate::dsp::sequencer::engine::{EdgePolicy, SequencerEngine};
use crate::dsp::sequencer::expander::{ExpanderLink, ExpansionMessage};
use crate::types::{ClockMessages, ExpanderFamily, ExpanderHost, ExpanderIdentity, Signal};

/// Step counts below this clamp to the 8-step variant, everything else to 16.
fn clamp_steps(raw: u32) -> usize {
    if raw <= 12 { 8 } else { 16 }
}

#[derive(Deserialize, JsonSchema, Connect)]
#[serde(default, rename_all = "camelCase")]
struct StepSeqParams {
    /// clock input
    clock: Signal,
    /// run input, high when unpatched so the module free-runs
    run: Signal,
    /// reset input
    reset: Signal,
    /// addressed-mode position input, 0-10V
    address: Signal,
    /// gain applied to the address input
    address_attenuation: f32,
    /// step count, 8 or 16
    steps: u32,
    /// sequence length in steps, 1..steps; defaults to the full step count
    length: Signal,
    /// direction mode 0-8 (forward, pendulum, reverse, random, addressed,
    /// then one-shot variants of the first four)
    direction: Signal,
    /// per-step switch positions, 0 off / 1 gate / 2 trigger
    step_modes: Vec<u8>,
    /// per-step CV values in volts
    step_cvs: Vec<f32>,
    /// sample-and-hold mode, 0 off / 1 on-trigger / 2 on-gate
    hold_mode: u8,
    /// CV output multiplier
    range: f32,
}

impl Default for StepSeqParams {
    fn default() -> Self {
        Self {
            clock: Signal::default(),
            run: Signal::default(),
            reset: Signal::default(),
            address: Signal::default(),
            address_attenuation: 1.0,
            steps: 16,
            length: Signal::default(),
            direction: Signal::default(),
            step_modes: Vec::new(),
            step_cvs: Vec::new(),
            hold_mode: 0,
            range: 1.0,
        }
    }
}

#[derive(Outputs, JsonSchema)]
struct StepSeqOutputs {
    #[output("gate", "gate output", default)]
    gate: f32,
    #[output("gateInv", "inverted gate output")]
    gate_inv: f32,
    #[output("trig", "trigger output")]
    trig: f32,
    #[output("cv", "control voltage output")]
    cv: f32,
    #[output("cvInv", "inverted control voltage output")]
    cv_inv: f32,
    #[output("ended", "one-shot ended gate")]
    ended: f32,
    #[output("position", "1-based active step, 0 when parked")]
    position: f32,
}

/// Multi-directional 8/16-step gate/CV sequencer, master of an expander chain.
#[derive(Module)]
#[module("stepSeq", "multi-directional 8/16-step gate and CV sequencer")]
#[args(clock, run?, reset?)]
#[stateful]
#[expanders]
pub struct StepSeq {
    outputs: StepSeqOutputs,
    params: StepSeqParams,
    engine: SequencerEngine,
    stage: CvStage,
    run_override: Option<bool>,
    outgoing: Option<Arc<ExpanderLink>>,
}

impl Default for StepSeq {
    fn default() -> Self {
        Self {
            outputs: StepSeqOutputs::default(),
            params: StepSeqParams::default(),
            engine: SequencerEngine::new(16, EdgePolicy::Strict),
            stage: CvStage::default(),
            run_override: None,
            outgoing: None,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct StepSeqState {
    version: u32,
    position: i32,
    direction: i32,
    clock_high: bool,
    run_high: bool,
}

impl Default for StepSeqState {
    fn default() -> Self {
        Self {
            version: 1,
            position: 0,
            direction: 0,
            clock_high: false,
            run_high: false,
        }
    }
}

impl StepSeq {
    fn update(&mut self, sample_rate: f32) -> () {
        let dt = 1.0 / sample_rate;

        let steps = clamp_steps(self.params.steps);
        if self.engine.step_count() != steps as i32 {
            // Rebuild for the new step count, carrying position and levels so
            // a restore followed by a params update does not lose its place.
            let position = self.engine.position();
            let direction = self.engine.direction_param();
            let clock_high = self.engine.clock_high();
            let run_high = self.engine.run_high();
            self.engine = SequencerEngine::new(steps, EdgePolicy::Strict);
            self.engine.restore(position, direction, clock_high, run_high);
        }
        self.engine
            .set_length(self.params.length.get_value_or(steps as f32).round() as i32);
        self.engine
            .set_direction(self.params.direction.get_value().round() as i32);

        let run_v = match self.run_override {
            Some(true) => 10.0,
            Some(false) => 0.0,
            None => self.params.run.get_value_or(10.0),
        };
        let address = self.params.address.get_value() * self.params.address_attenuation;
        let address_norm = address.clamp(0.0, 10.0) / 10.0;

        let ev = self.engine.tick(
            self.params.clock.get_value(),
            run_v,
            self.params.reset.get_value(),
            address_norm,
            dt,
        );

        let active = ev.position >= 1;
        let (mode, cell_cv) = if active {
            step_cell(
                &self.params.step_modes,
                &self.params.step_cvs,
                ev.position as usize - 1,
            )
        } else {
            step_cell(&[], &[], 0)
        };

        let stage = self.stage.process(
            mode,
            cell_cv,
            active,
            ev.stepped,
            HoldMode::from_param(self.params.hold_mode),
            self.params.range,
            dt,
        );

        self.outputs.gate = stage.gate;
        self.outputs.gate_inv = if stage.gate > 0.0 { 0.0 } else { GATE_OUT_VOLTS };
        self.outputs.trig = stage.trig;
        self.outputs.cv = stage.cv;
        self.outputs.cv_inv = stage.cv_inv;
        self.outputs.ended = if ev.one_shot_ended { GATE_OUT_VOLTS } else { 0.0 };
        self.outputs.position = ev.position as f32;

        if let Some(link) = &self.outgoing {
            link.publish(ExpansionMessage {
                position: ev.position,
                length: self.engine.length(),
                stepped: ev.stepped,
                clock_high: ev.clock_high,
                running: ev.running,
                channel: 1,
                has_master: true,
            });
        }
    }

    fn handle_clock(&mut self, message: &ClockMessages) -> crate::error::Result<()> {
        match message {
            ClockMessages::Start => {
                self.engine.reset_to_start();
                self.run_override = Some(true);
            }
            ClockMessages::Stop => {
                self.run_override = Some(false);
            }
        }
        Ok(())
    }
}

impl crate::types::StatefulModule for StepSeq {
    fn get_state(&self) -> Option<serde_json::Value> {
        serde_json::to_value(StepSeqState {
            version: 1,
            position: self.engine.position(),
            direction: self.engine.direction_param(),
            clock_high: self.engine.clock_high(),
            run_high: self.engine.run_high(),
        })
        .ok()
    }

    fn load_state(&mut self, state: &serde_json::Value) {
        // Unknown shapes are ignored; missing fields fall back to defaults.
        if let Ok(state) = serde_json::from_value::<StepSeqState>(state.clone()) {
            self.engine
                .restore(state.position, state.direction, state.clock_high, state.run_high);
        }
    }
}

impl ExpanderHost for StepSeq {
    fn identity(&self) -> Option<ExpanderIdentity> {
        Some(ExpanderIdentity {
            family: ExpanderFamily::StepSeq,
            steps: clamp_steps(self.params.steps),
        })
    }

    fn resolve_expanders(&mut self, id: &str, patch: &crate::Patch) {
        self.outgoing = patch.outgoing_expander(id);
    }
}

message_handlers!(impl StepSeq {
    Clock(message) => StepSeq::handle_clock,
});
