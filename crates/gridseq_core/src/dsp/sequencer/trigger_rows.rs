use schemars::JsonSchema;
use serde::Deserialize;

use crate::dsp::sequencer::cells::GATE_OUT_VOLTS;
use crate::dsp::sequencer::engine::TRIGGER_SECS;
use crate::dsp::utils::{GateDetector, PulseTimer};
use crate::types::Signal;

pub const TRIG_ROWS: usize = 4;
pub const TRIG_ROW_STEPS: usize = 8;

#[derive(Deserialize, JsonSchema, Connect)]
#[serde(default, rename_all = "camelCase")]
struct TrigRowsParams {
    /// clock input shared by all rows
    clock: Signal,
    /// run input, high when unpatched
    run: Signal,
    /// reset input shared by all rows
    reset: Signal,
    /// per-row lengths, 1-8
    lengths: Vec<u8>,
    /// 4 rows of 8 cells, 0 off / 1 upper / 2 lower / 3 both
    cells: Vec<Vec<u8>>,
}

impl Default for TrigRowsParams {
    fn default() -> Self {
        Self {
            clock: Signal::default(),
            run: Signal::default(),
            reset: Signal::default(),
            lengths: Vec::new(),
            cells: Vec::new(),
        }
    }
}

#[derive(Outputs, JsonSchema)]
struct TrigRowsOutputs {
    #[output("upper1", "row 1 upper trigger", default)]
    upper1: f32,
    #[output("upper2", "row 2 upper trigger")]
    upper2: f32,
    #[output("upper3", "row 3 upper trigger")]
    upper3: f32,
    #[output("upper4", "row 4 upper trigger")]
    upper4: f32,
    #[output("lower1", "row 1 lower trigger")]
    lower1: f32,
    #[output("lower2", "row 2 lower trigger")]
    lower2: f32,
    #[output("lower3", "row 3 lower trigger")]
    lower3: f32,
    #[output("lower4", "row 4 lower trigger")]
    lower4: f32,
}

/// Four independent single-row trigger sequencers on a shared clock. Each row
/// wraps at its own length and fires dual upper/lower trigger pulses.
#[derive(Module)]
#[module("trigRows", "quad trigger row sequencer")]
#[args(clock, run?, reset?)]
pub struct TrigRows {
    outputs: TrigRowsOutputs,
    params: TrigRowsParams,
    clock: GateDetector,
    run: GateDetector,
    reset: GateDetector,
    positions: [i32; TRIG_ROWS],
    upper: [PulseTimer; TRIG_ROWS],
    lower: [PulseTimer; TRIG_ROWS],
}

impl Default for TrigRows {
    fn default() -> Self {
        Self {
            outputs: TrigRowsOutputs::default(),
            params: TrigRowsParams::default(),
            clock: GateDetector::default(),
            run: GateDetector::default(),
            reset: GateDetector::default(),
            positions: [0; TRIG_ROWS],
            upper: [PulseTimer::default(); TRIG_ROWS],
            lower: [PulseTimer::default(); TRIG_ROWS],
        }
    }
}

impl TrigRows {
    fn row_length(&self, row: usize) -> i32 {
        self.params
            .lengths
            .get(row)
            .copied()
            .unwrap_or(TRIG_ROW_STEPS as u8)
            .clamp(1, TRIG_ROW_STEPS as u8) as i32
    }

    fn cell(&self, row: usize, step: usize) -> u8 {
        self.params
            .cells
            .get(row)
            .and_then(|cells| cells.get(step))
            .copied()
            .unwrap_or(0)
    }

    fn update(&mut self, sample_rate: f32) -> () {
        let dt = 1.0 / sample_rate;

        self.clock.set(self.params.clock.get_value());
        self.run.set(self.params.run.get_value_or(10.0));
        self.reset.set(self.params.reset.get_value());

        if self.reset.high() {
            self.positions = [0; TRIG_ROWS];
        } else if self.clock.leading_edge() && self.run.high() {
            for row in 0..TRIG_ROWS {
                let length = self.row_length(row);
                // Each row wraps independently at its own length.
                self.positions[row] = if self.positions[row] >= length {
                    1
                } else {
                    self.positions[row] + 1
                };
                let cell = self.cell(row, self.positions[row] as usize - 1);
                if cell & 1 != 0 {
                    self.upper[row].trigger(TRIGGER_SECS);
                }
                if cell & 2 != 0 {
                    self.lower[row].trigger(TRIGGER_SECS);
                }
            }
        }

        let upper: [f32; TRIG_ROWS] = std::array::from_fn(|row| {
            if self.upper[row].process(dt) { GATE_OUT_VOLTS } else { 0.0 }
        });
        let lower: [f32; TRIG_ROWS] = std::array::from_fn(|row| {
            if self.lower[row].process(dt) { GATE_OUT_VOLTS } else { 0.0 }
        });

        self.outputs.upper1 = upper[0];
        self.outputs.upper2 = upper[1];
        self.outputs.upper3 = upper[2];
        self.outputs.upper4 = upper[3];
        self.outputs.lower1 = lower[0];
        self.outputs.lower2 = lower[1];
        self.outputs.lower3 = lower[2];
        self.outputs.lower4 = lower[3];
    }
}

message_handlers!(impl TrigRows {});
