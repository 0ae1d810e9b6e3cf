/// Map a value from one range to another. If the input range is degenerate, returns `y0`.
pub fn map_range(x: f32, x0: f32, x1: f32, y0: f32, y1: f32) -> f32 {
    let denom = x1 - x0;
    if denom.abs() < f32::EPSILON {
        return y0;
    }
    (x - x0) * (y1 - y0) / denom + y0
}

/// Voltage above which a gate input reads high.
pub const GATE_HIGH: f32 = 2.0;
/// Voltage below which a high gate input drops back low. The band between
/// the two thresholds is a dead zone against chatter.
pub const GATE_LOW: f32 = 1.8;

/// Debounced logic-level wrapper over a continuous voltage input.
///
/// `set` must be called exactly once per tick; `previous` always holds the
/// level from the prior tick, so edge queries are valid for one tick only.
#[derive(Debug, Clone, Copy, Default)]
pub struct GateDetector {
    current: bool,
    previous: bool,
}

impl GateDetector {
    /// Update from a voltage, applying the Schmitt thresholds.
    pub fn set(&mut self, voltage: f32) {
        self.previous = self.current;
        if self.current {
            if voltage < GATE_LOW {
                self.current = false;
            }
        } else if voltage >= GATE_HIGH {
            self.current = true;
        }
    }

    /// Force both levels to `level` without producing an edge. Used when
    /// restoring persisted state so a saved-high input does not fire a
    /// spurious leading edge on the first tick after restore.
    pub fn set_level(&mut self, level: bool) {
        self.current = level;
        self.previous = level;
    }

    pub fn leading_edge(&self) -> bool {
        self.current && !self.previous
    }

    pub fn trailing_edge(&self) -> bool {
        !self.current && self.previous
    }

    pub fn high(&self) -> bool {
        self.current
    }

    pub fn low(&self) -> bool {
        !self.current
    }

    pub fn reset(&mut self) {
        self.current = false;
        self.previous = false;
    }
}

/// Fixed-duration one-shot timer.
///
/// Re-triggering while active restarts the timer at the full duration, it
/// never accumulates.
#[derive(Debug, Clone, Copy, Default)]
pub struct PulseTimer {
    remaining: f32,
}

impl PulseTimer {
    pub fn trigger(&mut self, duration: f32) {
        self.remaining = duration;
    }

    /// Advance by `dt` seconds; returns whether the pulse is still active.
    pub fn process(&mut self, dt: f32) -> bool {
        self.remaining = (self.remaining - dt).max(0.0);
        self.remaining > 0.0
    }

    pub fn active(&self) -> bool {
        self.remaining > 0.0
    }

    pub fn reset(&mut self) {
        self.remaining = 0.0;
    }
}

/// Deterministic seeded PCG random number generator.
#[derive(Debug, Clone, Copy)]
pub struct Rng {
    state: u64,
    pub seed: u64,
}

impl Rng {
    pub fn new(seed: u64) -> Self {
        Self { state: seed, seed }
    }

    /// Generate next random number and return a value in [0, 1)
    pub fn next(&mut self) -> f64 {
        // PCG algorithm
        const MULTIPLIER: u64 = 6364136223846793005;
        const INCREMENT: u64 = 1442695040888963407;

        self.state = self.state.wrapping_mul(MULTIPLIER).wrapping_add(INCREMENT);
        let xorshifted = (((self.state >> 18) ^ self.state) >> 27) as u32;
        let rot = (self.state >> 59) as u32;
        let result = xorshifted.rotate_right(rot);

        result as f64 / u32::MAX as f64
    }

    /// Uniform integer in [low, high] inclusive.
    pub fn next_in_range(&mut self, low: i32, high: i32) -> i32 {
        if high <= low {
            return low;
        }
        let span = (high - low + 1) as f64;
        let v = low + (self.next() * span) as i32;
        v.min(high)
    }
}

impl Default for Rng {
    fn default() -> Self {
        Self::new(0x9e3779b97f4a7c15)
    }
}
