/// Linear transition from `begin_value` to `end_value` over `decay_steps`, starting at
/// `begin_t`. Before `begin_t` the begin value holds, after the decay the end value holds.
#[derive(Debug, Clone, Copy)]
pub struct LinearSchedule {
    pub begin_value: f64,
    pub end_value: f64,
    pub begin_t: usize,
    pub decay_steps: usize,
}

impl LinearSchedule {
    pub fn new(begin_value: f64, end_value: f64, begin_t: usize, decay_steps: usize) -> Self {
        assert!(decay_steps > 0, "decay_steps must be positive");
        Self {
            begin_value,
            end_value,
            begin_t,
            decay_steps,
        }
    }

    pub fn from_bounds(begin_value: f64, end_value: f64, begin_t: usize, end_t: usize) -> Self {
        assert!(end_t > begin_t, "end_t must come after begin_t");
        Self::new(begin_value, end_value, begin_t, end_t - begin_t)
    }

    pub fn value(&self, t: usize) -> f64 {
        let frac = t.saturating_sub(self.begin_t).min(self.decay_steps) as f64
            / self.decay_steps as f64;
        (1. - frac) * self.begin_value + frac * self.end_value
    }
}
