use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::dsp::sequencer::cells::GATE_OUT_VOLTS;
use crate::dsp::sequencer::engine::{EdgePolicy, SequencerEngine, TRIGGER_SECS};
use crate::dsp::utils::PulseTimer;
use crate::types::{ClockMessages, Signal};

pub const GATE_SEQ_ROWS: usize = 4;

fn clamp_steps(raw: u32) -> usize {
    if raw <= 12 { 8 } else { 16 }
}

#[derive(Deserialize, JsonSchema, Connect)]
#[serde(default, rename_all = "camelCase")]
struct GateSeqParams {
    /// clock input
    clock: Signal,
    /// run input, high when unpatched so the module free-runs
    run: Signal,
    /// reset input
    reset: Signal,
    /// step count, 8 or 16
    steps: u32,
    /// sequence length in steps, 1..steps; defaults to the full step count
    length: Signal,
    /// direction mode 0-8, as the step sequencer
    direction: Signal,
    /// 4 rows of per-step on/off cells
    rows: Vec<Vec<bool>>,
}

impl Default for GateSeqParams {
    fn default() -> Self {
        Self {
            clock: Signal::default(),
            run: Signal::default(),
            reset: Signal::default(),
            steps: 16,
            length: Signal::default(),
            direction: Signal::default(),
            rows: Vec::new(),
        }
    }
}

#[derive(Outputs, JsonSchema)]
struct GateSeqOutputs {
    #[output("gate1", "row 1 gate output", default)]
    gate1: f32,
    #[output("gate2", "row 2 gate output")]
    gate2: f32,
    #[output("gate3", "row 3 gate output")]
    gate3: f32,
    #[output("gate4", "row 4 gate output")]
    gate4: f32,
    #[output("trig1", "row 1 trigger output")]
    trig1: f32,
    #[output("trig2", "row 2 trigger output")]
    trig2: f32,
    #[output("trig3", "row 3 trigger output")]
    trig3: f32,
    #[output("trig4", "row 4 trigger output")]
    trig4: f32,
    #[output("ended", "one-shot ended gate")]
    ended: f32,
    #[output("position", "1-based active step, 0 when parked")]
    position: f32,
}

/// Four-row boolean gate sequencer sharing one step-advance engine.
#[derive(Module)]
#[module("gateSeq", "4-row 8/16-step gate sequencer")]
#[args(clock, run?, reset?)]
#[stateful]
pub struct GateSeq {
    outputs: GateSeqOutputs,
    params: GateSeqParams,
    engine: SequencerEngine,
    run_override: Option<bool>,
    trigs: [PulseTimer; GATE_SEQ_ROWS],
}

impl Default for GateSeq {
    fn default() -> Self {
        Self {
            outputs: GateSeqOutputs::default(),
            params: GateSeqParams::default(),
            engine: SequencerEngine::new(16, EdgePolicy::Tolerant),
            run_override: None,
            trigs: [PulseTimer::default(); GATE_SEQ_ROWS],
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct GateSeqState {
    version: u32,
    position: i32,
    direction: i32,
    clock_high: bool,
    run_high: bool,
}

impl Default for GateSeqState {
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

impl GateSeq {
    fn cell(&self, row: usize, step: usize) -> bool {
        self.params
            .rows
            .get(row)
            .and_then(|cells| cells.get(step))
            .copied()
            .unwrap_or(false)
    }

    fn update(&mut self, sample_rate: f32) -> () {
        let dt = 1.0 / sample_rate;

        let steps = clamp_steps(self.params.steps);
        if self.engine.step_count() != steps as i32 {
            let position = self.engine.position();
            let direction = self.engine.direction_param();
            let clock_high = self.engine.clock_high();
            let run_high = self.engine.run_high();
            self.engine = SequencerEngine::new(steps, EdgePolicy::Tolerant);
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

        let ev = self.engine.tick(
            self.params.clock.get_value(),
            run_v,
            self.params.reset.get_value(),
            0.0,
            dt,
        );

        let step = if ev.position >= 1 {
            Some(ev.position as usize - 1)
        } else {
            None
        };
        let mut gates = [0.0f32; GATE_SEQ_ROWS];
        for row in 0..GATE_SEQ_ROWS {
            let on = step.map(|s| self.cell(row, s)).unwrap_or(false);
            if on {
                gates[row] = GATE_OUT_VOLTS;
                if ev.stepped {
                    self.trigs[row].trigger(TRIGGER_SECS);
                }
            }
        }
        let trigs: [f32; GATE_SEQ_ROWS] = std::array::from_fn(|row| {
            if self.trigs[row].process(dt) { GATE_OUT_VOLTS } else { 0.0 }
        });

        self.outputs.gate1 = gates[0];
        self.outputs.gate2 = gates[1];
        self.outputs.gate3 = gates[2];
        self.outputs.gate4 = gates[3];
        self.outputs.trig1 = trigs[0];
        self.outputs.trig2 = trigs[1];
        self.outputs.trig3 = trigs[2];
        self.outputs.trig4 = trigs[3];
        self.outputs.ended = if ev.one_shot_ended { GATE_OUT_VOLTS } else { 0.0 };
        self.outputs.position = ev.position as f32;
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

impl crate::types::StatefulModule for GateSeq {
    fn get_state(&self) -> Option<serde_json::Value> {
        serde_json::to_value(GateSeqState {
            version: 1,
            position: self.engine.position(),
            direction: self.engine.direction_param(),
            clock_high: self.engine.clock_high(),
            run_high: self.engine.run_high(),
        })
        .ok()
    }

    fn load_state(&mut self, state: &serde_json::Value) {
        if let Ok(state) = serde_json::from_value::<GateSeqState>(state.clone()) {
            self.engine
                .restore(state.position, state.direction, state.clock_high, state.run_high);
        }
    }
}

message_handlers!(impl GateSeq {
    Clock(message) => GateSeq::handle_clock,
});
