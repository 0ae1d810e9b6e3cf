//! Shared step-advance state machine for the clocked sequencer modules.
//!
//! One parameterized engine covers the 8- and 16-step gate/CV sequencers and
//! the multi-row gate sequencer; step count and edge policy are constructor
//! parameters. Per tick the evaluation order is fixed: startup guard, reset,
//! qualifying-edge arbitration, advance, output derivation by the caller.

use crate::dsp::utils::{GateDetector, PulseTimer, Rng, map_range};

/// Ticks after construction/restore during which clock and run inputs are
/// held at their prior levels, so transient voltages from patch wiring do not
/// advance the sequence. Reset is honored immediately.
pub const STARTUP_GUARD_TICKS: u32 = 20;

/// Window after a clock edge during which a run/reset edge still counts as
/// clock-simultaneous.
pub const CLOCK_BRIDGE_SECS: f32 = 1.0e-4;

/// Width of user-visible trigger output pulses.
pub const TRIGGER_SECS: f32 = 1.0e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DirectionMode {
    #[default]
    Forward,
    Pendulum,
    Reverse,
    Random,
    Addressed,
}

impl DirectionMode {
    /// Decode the direction parameter: 0-4 select the base modes, 5-8 the
    /// one-shot variants of the first four. Out-of-range values clamp.
    pub fn from_param(value: i32) -> (DirectionMode, bool) {
        match value.clamp(0, 8) {
            0 => (DirectionMode::Forward, false),
            1 => (DirectionMode::Pendulum, false),
            2 => (DirectionMode::Reverse, false),
            3 => (DirectionMode::Random, false),
            4 => (DirectionMode::Addressed, false),
            5 => (DirectionMode::Forward, true),
            6 => (DirectionMode::Pendulum, true),
            7 => (DirectionMode::Reverse, true),
            _ => (DirectionMode::Random, true),
        }
    }

    pub fn to_param(self, one_shot: bool) -> i32 {
        let base = match self {
            DirectionMode::Forward => 0,
            DirectionMode::Pendulum => 1,
            DirectionMode::Reverse => 2,
            DirectionMode::Random => 3,
            DirectionMode::Addressed => 4,
        };
        if one_shot && base < 4 { base + 5 } else { base }
    }
}

/// How a run/reset edge near a clock edge is arbitrated. The gate-sequencer
/// family historically accepts a slightly wider window than the step
/// sequencer; both behaviors are kept distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgePolicy {
    /// Qualifies only on a clock leading edge, or a run/reset leading edge
    /// while the bridge window is open.
    Strict,
    /// Additionally qualifies a run/reset leading edge while the clock gate
    /// is still held high.
    Tolerant,
}

/// Result of one engine tick, read by the owning module to derive outputs.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepEvent {
    /// A qualifying advance happened this tick (gates the trigger output).
    pub stepped: bool,
    /// 1-based active step, 0 when parked.
    pub position: i32,
    pub running: bool,
    pub clock_high: bool,
    pub one_shot_ended: bool,
}

pub struct SequencerEngine {
    step_count: i32,
    edge_policy: EdgePolicy,
    length: i32,
    position: i32,
    mode: DirectionMode,
    one_shot: bool,
    one_shot_ended: bool,
    /// Pendulum effective direction.
    forward: bool,
    clock: GateDetector,
    run: GateDetector,
    reset: GateDetector,
    bridge: PulseTimer,
    guard: u32,
    rng: Rng,
}

impl SequencerEngine {
    pub fn new(step_count: usize, edge_policy: EdgePolicy) -> Self {
        let step_count = step_count as i32;
        Self {
            step_count,
            edge_policy,
            length: step_count,
            position: 0,
            mode: DirectionMode::Forward,
            one_shot: false,
            one_shot_ended: false,
            forward: true,
            clock: GateDetector::default(),
            run: GateDetector::default(),
            reset: GateDetector::default(),
            bridge: PulseTimer::default(),
            guard: STARTUP_GUARD_TICKS,
            rng: Rng::default(),
        }
    }

    pub fn step_count(&self) -> i32 {
        self.step_count
    }

    pub fn length(&self) -> i32 {
        self.length
    }

    /// Clamped to [1, step_count].
    pub fn set_length(&mut self, length: i32) {
        self.length = length.clamp(1, self.step_count);
        if self.position > self.length + 1 {
            self.position = self.length + 1;
        }
    }

    pub fn position(&self) -> i32 {
        self.position
    }

    pub fn mode(&self) -> DirectionMode {
        self.mode
    }

    pub fn one_shot_ended(&self) -> bool {
        self.one_shot_ended
    }

    pub fn set_direction(&mut self, param: i32) {
        let (mode, one_shot) = DirectionMode::from_param(param);
        if mode != self.mode {
            self.forward = true;
        }
        self.mode = mode;
        self.one_shot = one_shot;
    }

    pub fn direction_param(&self) -> i32 {
        self.mode.to_param(self.one_shot)
    }

    fn start_position(&self) -> i32 {
        match self.effective_forward() {
            true => 0,
            false => self.length + 1,
        }
    }

    fn effective_forward(&self) -> bool {
        match self.mode {
            DirectionMode::Forward | DirectionMode::Random | DirectionMode::Addressed => true,
            DirectionMode::Reverse => false,
            DirectionMode::Pendulum => self.forward,
        }
    }

    /// Snap to the mode-appropriate origin and clear one-shot state, as a
    /// reset edge or transport start does.
    pub fn reset_to_start(&mut self) {
        self.one_shot_ended = false;
        if self.mode == DirectionMode::Pendulum {
            self.forward = true;
        }
        self.position = self.start_position();
    }

    /// Restore persisted state without generating input edges.
    pub fn restore(&mut self, position: i32, direction: i32, clock_high: bool, run_high: bool) {
        self.set_direction(direction);
        self.position = position.clamp(0, self.length + 1);
        self.clock.set_level(clock_high);
        self.run.set_level(run_high);
        self.one_shot_ended = false;
        self.guard = STARTUP_GUARD_TICKS;
    }

    pub fn clock_high(&self) -> bool {
        self.clock.high()
    }

    pub fn run_high(&self) -> bool {
        self.run.high()
    }

    /// One tick of the state machine. `address_norm` is the addressed-mode
    /// position fraction in [0, 1]; `dt` is the host tick period in seconds.
    pub fn tick(&mut self, clock_v: f32, run_v: f32, reset_v: f32, address_norm: f32, dt: f32) -> StepEvent {
        if self.guard > 0 {
            self.guard -= 1;
            self.clock.set_level(self.clock.high());
            self.run.set_level(self.run.high());
        } else {
            self.clock.set(clock_v);
            self.run.set(run_v);
        }
        self.reset.set(reset_v);

        let bridge_active = self.bridge.process(dt);
        if self.clock.leading_edge() {
            self.bridge.trigger(CLOCK_BRIDGE_SECS);
        }

        // Reset wins over everything. While held, the position is pinned to
        // the origin every tick.
        if self.reset.leading_edge() {
            self.reset_to_start();
        }
        if self.reset.high() {
            self.position = self.start_position();
            return StepEvent {
                stepped: false,
                position: self.clamped_output_position(),
                running: self.run.high(),
                clock_high: self.clock.high(),
                one_shot_ended: self.one_shot_ended,
            };
        }

        // Reset edges were consumed above, so run is the only aux source left.
        let aux_edge = self.run.leading_edge();
        let qualifying = match self.edge_policy {
            EdgePolicy::Strict => self.clock.leading_edge() || (bridge_active && aux_edge),
            EdgePolicy::Tolerant => {
                self.clock.leading_edge() || (aux_edge && (bridge_active || self.clock.high()))
            }
        };

        let mut stepped = false;
        if self.mode == DirectionMode::Addressed {
            // Not clock-advanced: the position tracks the address input every
            // tick; the clock only gates the trigger output.
            let norm = address_norm.clamp(0.0, 1.0);
            self.position = map_range(norm, 0.0, 1.0, 1.0, self.length as f32).round() as i32;
            stepped = qualifying && self.run.high();
        } else if qualifying && self.run.high() {
            if self.one_shot_ended {
                // Frozen until a reset edge.
                self.position = 0;
            } else {
                self.advance();
                stepped = true;
            }
        }

        StepEvent {
            stepped,
            position: self.clamped_output_position(),
            running: self.run.high(),
            clock_high: self.clock.high(),
            one_shot_ended: self.one_shot_ended,
        }
    }

    fn clamped_output_position(&self) -> i32 {
        // [0, length+1] is the internal range; outputs report the active
        // step or 0 when parked outside it.
        if (1..=self.length).contains(&self.position) {
            self.position
        } else {
            0
        }
    }

    fn advance(&mut self) {
        match self.mode {
            DirectionMode::Random => {
                if self.one_shot && self.position >= self.length {
                    self.position = 0;
                    self.one_shot_ended = true;
                } else {
                    self.position = self.rng.next_in_range(1, self.length);
                }
            }
            _ => {
                if self.effective_forward() {
                    self.position += 1;
                    if self.position > self.length {
                        if self.mode == DirectionMode::Pendulum {
                            // Boundary flip: step back into range instead of
                            // wrapping.
                            self.forward = false;
                            self.position = (self.length - 1).max(1);
                        } else if self.one_shot {
                            self.position = 0;
                            self.one_shot_ended = true;
                        } else {
                            self.position = 1;
                        }
                    }
                } else {
                    self.position -= 1;
                    if self.position < 1 {
                        if self.one_shot {
                            self.position = 0;
                            self.one_shot_ended = true;
                        } else if self.mode == DirectionMode::Pendulum {
                            self.forward = true;
                            self.position = 2.min(self.length);
                        } else {
                            self.position = self.length;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 44100.0;

    fn engine(step_count: usize) -> SequencerEngine {
        let mut e = SequencerEngine::new(step_count, EdgePolicy::Strict);
        warm_up(&mut e);
        e
    }

    /// Burn through the startup guard with quiet inputs.
    fn warm_up(e: &mut SequencerEngine) {
        for _ in 0..STARTUP_GUARD_TICKS {
            e.tick(0.0, 10.0, 0.0, 0.0, DT);
        }
    }

    /// One full clock pulse: a high tick then a low tick.
    fn pulse(e: &mut SequencerEngine) -> StepEvent {
        let ev = e.tick(5.0, 10.0, 0.0, 0.0, DT);
        e.tick(0.0, 10.0, 0.0, 0.0, DT);
        ev
    }

    #[test]
    fn test_forward_wrap() {
        let mut e = engine(8);
        for expected in 1..=8 {
            assert_eq!(pulse(&mut e).position, expected);
        }
        assert_eq!(pulse(&mut e).position, 1, "8 wraps to 1, not 9 or 0");
    }

    #[test]
    fn test_reverse_floor_continuous() {
        let mut e = engine(8);
        e.set_direction(2);
        e.reset_to_start();
        assert_eq!(pulse(&mut e).position, 8, "first reverse step from length+1");
        for _ in 0..7 {
            pulse(&mut e);
        }
        assert_eq!(e.position(), 1);
        assert_eq!(pulse(&mut e).position, 8, "reverse wraps 1 back to length");
    }

    #[test]
    fn test_reverse_floor_one_shot() {
        let mut e = engine(8);
        e.set_direction(7);
        e.reset_to_start();
        for _ in 0..8 {
            pulse(&mut e);
        }
        assert_eq!(e.position(), 1);
        let ev = pulse(&mut e);
        assert_eq!(ev.position, 0);
        assert!(ev.one_shot_ended);
    }

    #[test]
    fn test_pendulum_boundary_flip() {
        let mut e = engine(8);
        e.set_direction(1);
        for _ in 0..8 {
            pulse(&mut e);
        }
        assert_eq!(e.position(), 8);
        assert_eq!(pulse(&mut e).position, 7, "flip decrements instead of wrapping");
        assert_eq!(pulse(&mut e).position, 6);
        for _ in 0..5 {
            pulse(&mut e);
        }
        assert_eq!(e.position(), 1);
        assert_eq!(pulse(&mut e).position, 2, "lower boundary flips back up");
    }

    #[test]
    fn test_one_shot_freeze_until_reset() {
        let mut e = engine(8);
        e.set_direction(5);
        for _ in 0..8 {
            pulse(&mut e);
        }
        let ev = pulse(&mut e);
        assert_eq!(ev.position, 0);
        assert!(ev.one_shot_ended);
        for _ in 0..4 {
            let ev = pulse(&mut e);
            assert_eq!(ev.position, 0);
            assert!(ev.one_shot_ended);
            assert!(!ev.stepped);
        }
        // Reset edge clears the ended latch.
        e.tick(0.0, 10.0, 5.0, 0.0, DT);
        e.tick(0.0, 10.0, 0.0, 0.0, DT);
        assert!(!e.one_shot_ended());
        assert_eq!(pulse(&mut e).position, 1);
    }

    #[test]
    fn test_reset_priority_over_clock() {
        let mut e = engine(8);
        pulse(&mut e);
        pulse(&mut e);
        assert_eq!(e.position(), 2);
        // Clock edges while reset is held never move the position.
        for _ in 0..5 {
            let ev = e.tick(5.0, 10.0, 5.0, 0.0, DT);
            assert_eq!(ev.position, 0);
            e.tick(0.0, 10.0, 5.0, 0.0, DT);
        }
        assert_eq!(e.position(), 0);
        e.tick(0.0, 10.0, 0.0, 0.0, DT);
        assert_eq!(e.position(), 0, "release alone does not advance");
        assert_eq!(pulse(&mut e).position, 1);
    }

    #[test]
    fn test_not_running_ignores_clock() {
        let mut e = engine(8);
        for _ in 0..3 {
            let ev = e.tick(5.0, 0.0, 0.0, 0.0, DT);
            assert_eq!(ev.position, 0);
            assert!(!ev.running);
            e.tick(0.0, 0.0, 0.0, 0.0, DT);
        }
    }

    #[test]
    fn test_random_stays_in_range() {
        let mut e = engine(8);
        e.set_direction(3);
        e.set_length(5);
        for _ in 0..200 {
            let ev = pulse(&mut e);
            assert!((1..=5).contains(&ev.position));
        }
    }

    #[test]
    fn test_addressed_tracks_address_not_clock() {
        let mut e = engine(8);
        e.set_direction(4);
        let ev = e.tick(0.0, 10.0, 0.0, 0.0, DT);
        assert_eq!(ev.position, 1, "zero address selects step 1 without a clock");
        assert!(!ev.stepped);
        let ev = e.tick(0.0, 10.0, 0.0, 1.0, DT);
        assert_eq!(ev.position, 8, "full-scale address selects the last step");
        // The clock edge gates the trigger but does not move the position.
        let ev = e.tick(5.0, 10.0, 0.0, 1.0, DT);
        assert_eq!(ev.position, 8);
        assert!(ev.stepped);
    }

    #[test]
    fn test_length_clamp_and_wrap() {
        let mut e = engine(8);
        e.set_length(100);
        assert_eq!(e.length(), 8);
        e.set_length(0);
        assert_eq!(e.length(), 1);
        assert_eq!(pulse(&mut e).position, 1);
        assert_eq!(pulse(&mut e).position, 1, "length 1 always wraps to 1");
    }

    #[test]
    fn test_startup_guard_swallows_early_clocks() {
        let mut e = SequencerEngine::new(8, EdgePolicy::Strict);
        for _ in 0..(STARTUP_GUARD_TICKS / 2) {
            let ev = e.tick(5.0, 10.0, 0.0, 0.0, DT);
            assert_eq!(ev.position, 0);
            e.tick(0.0, 10.0, 0.0, 0.0, DT);
        }
        // Guard expired part-way through: positions may only start moving now.
        assert_eq!(e.position(), 0);
    }

    #[test]
    fn test_startup_guard_honors_reset() {
        let mut e = SequencerEngine::new(8, EdgePolicy::Strict);
        e.set_direction(2);
        let ev = e.tick(0.0, 10.0, 5.0, 0.0, DT);
        // Reverse origin is length+1, reported as parked.
        assert_eq!(ev.position, 0);
        e.tick(0.0, 10.0, 0.0, 0.0, DT);
        assert_eq!(e.position(), 9, "reset during the guard still snapped the origin");
    }

    #[test]
    fn test_strict_bridge_run_edge_counts_as_clock() {
        let mut e = engine(8);
        // Stop the run gate, fire a clock edge while stopped, then raise run
        // one tick later: the bridge window makes the run edge qualify.
        e.tick(0.0, 0.0, 0.0, 0.0, DT);
        e.tick(5.0, 0.0, 0.0, 0.0, DT);
        let ev = e.tick(5.0, 10.0, 0.0, 0.0, DT);
        assert_eq!(ev.position, 1, "run edge inside the bridge window advances");
    }

    #[test]
    fn test_strict_run_edge_outside_bridge_dropped() {
        let mut e = engine(8);
        e.tick(0.0, 0.0, 0.0, 0.0, DT);
        e.tick(5.0, 0.0, 0.0, 0.0, DT);
        // Hold the clock high well past the bridge window.
        for _ in 0..20 {
            e.tick(5.0, 0.0, 0.0, 0.0, DT);
        }
        let ev = e.tick(5.0, 10.0, 0.0, 0.0, DT);
        assert_eq!(ev.position, 0, "strict policy drops a late run edge");
    }

    #[test]
    fn test_tolerant_run_edge_while_clock_high_advances() {
        let mut e = SequencerEngine::new(8, EdgePolicy::Tolerant);
        warm_up(&mut e);
        e.tick(0.0, 0.0, 0.0, 0.0, DT);
        e.tick(5.0, 0.0, 0.0, 0.0, DT);
        for _ in 0..20 {
            e.tick(5.0, 0.0, 0.0, 0.0, DT);
        }
        let ev = e.tick(5.0, 10.0, 0.0, 0.0, DT);
        assert_eq!(ev.position, 1, "tolerant policy accepts a run edge on a held clock");
    }

    #[test]
    fn test_direction_param_round_trip() {
        for p in 0..=8 {
            let (mode, one_shot) = DirectionMode::from_param(p);
            assert_eq!(mode.to_param(one_shot), p);
        }
        assert_eq!(DirectionMode::from_param(99), (DirectionMode::Random, true));
        assert_eq!(DirectionMode::from_param(-3), (DirectionMode::Forward, false));
    }

    #[test]
    fn test_restore_does_not_fire_edges() {
        let mut e = SequencerEngine::new(8, EdgePolicy::Strict);
        e.restore(4, 0, true, true);
        warm_up(&mut e);
        assert_eq!(e.position(), 4);
        // Clock was restored high; a held-high input after restore is not an
        // edge, so nothing advances until a fresh rising edge.
        let ev = e.tick(5.0, 10.0, 0.0, 0.0, DT);
        assert_eq!(ev.position, 4);
        e.tick(0.0, 10.0, 0.0, 0.0, DT);
        assert_eq!(pulse(&mut e).position, 5);
    }
}
