//! Per-step cell values and the gate/trigger/CV output stage shared by the
//! step sequencer and its channel expanders.

use crate::dsp::sequencer::engine::TRIGGER_SECS;
use crate::dsp::utils::PulseTimer;

pub const GATE_OUT_VOLTS: f32 = 5.0;

/// Tri-state step switch, serialized as 0/1/2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepMode {
    #[default]
    Off,
    Gate,
    Trigger,
}

impl StepMode {
    pub fn from_param(value: u8) -> Self {
        match value {
            1 => StepMode::Gate,
            2 => StepMode::Trigger,
            _ => StepMode::Off,
        }
    }
}

/// When the CV output latches the active step's value, serialized as 0/1/2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HoldMode {
    /// Track the active step's value live.
    #[default]
    Off,
    /// Latch only while the active step is a trigger step.
    OnTrigger,
    /// Latch only on the gate output's own rising edge.
    OnGate,
}

impl HoldMode {
    pub fn from_param(value: u8) -> Self {
        match value {
            1 => HoldMode::OnTrigger,
            2 => HoldMode::OnGate,
            _ => HoldMode::Off,
        }
    }
}

/// Read one step cell out of the sparse per-step param vectors. Steps beyond
/// the configured vectors read as off / 0 V.
pub fn step_cell(modes: &[u8], cvs: &[f32], index: usize) -> (StepMode, f32) {
    let mode = modes.get(index).copied().map(StepMode::from_param).unwrap_or_default();
    let cv = cvs.get(index).copied().unwrap_or(0.0);
    (mode, cv)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StageOutputs {
    pub gate: f32,
    pub trig: f32,
    pub cv: f32,
    pub cv_inv: f32,
}

/// Gate/trigger/CV derivation for one channel of step cells, including the
/// sample-and-hold tie-breaks.
#[derive(Debug, Default)]
pub struct CvStage {
    held: f32,
    gate_was_high: bool,
    trig: PulseTimer,
}

impl CvStage {
    /// Process one tick. `active` is whether a step is selected at all,
    /// `stepped` whether the sequencer advanced onto it this tick.
    pub fn process(
        &mut self,
        mode: StepMode,
        cell_cv: f32,
        active: bool,
        stepped: bool,
        hold: HoldMode,
        range: f32,
        dt: f32,
    ) -> StageOutputs {
        let gate_high = active && mode == StepMode::Gate;

        if stepped && mode == StepMode::Trigger {
            self.trig.trigger(TRIGGER_SECS);
        }

        match hold {
            HoldMode::Off => {
                if active {
                    self.held = cell_cv;
                }
            }
            HoldMode::OnTrigger => {
                if active && mode == StepMode::Trigger {
                    self.held = cell_cv;
                }
            }
            HoldMode::OnGate => {
                // Rising edge of the gate output only, not merely while high.
                if gate_high && !self.gate_was_high {
                    self.held = cell_cv;
                }
            }
        }
        self.gate_was_high = gate_high;

        let cv = self.held * range;
        StageOutputs {
            gate: if gate_high { GATE_OUT_VOLTS } else { 0.0 },
            trig: if self.trig.process(dt) { GATE_OUT_VOLTS } else { 0.0 },
            cv,
            cv_inv: -cv,
        }
    }

    pub fn reset(&mut self) {
        self.held = 0.0;
        self.gate_was_high = false;
        self.trig.reset();
    }
}
