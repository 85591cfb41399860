use arl_core::env::{Env, EnvironmentDescription, SnapShot};
use candle_core::{Result, Tensor};

/// Truncates episodes after `max_steps` steps.
pub struct TimeLimit<E: Env> {
    env: E,
    max_steps: usize,
    elapsed_steps: usize,
}

impl<E: Env> TimeLimit<E> {
    pub fn new(env: E, max_steps: usize) -> Self {
        assert!(max_steps > 0, "max_steps must be positive");
        Self {
            env,
            max_steps,
            elapsed_steps: 0,
        }
    }
}

impl<E: Env> Env for TimeLimit<E> {
    fn reset(&mut self, seed: u64) -> Result<Tensor> {
        self.elapsed_steps = 0;
        self.env.reset(seed)
    }

    fn step(&mut self, action: &Tensor) -> Result<SnapShot> {
        let mut snapshot = self.env.step(action)?;
        self.elapsed_steps += 1;
        if self.elapsed_steps >= self.max_steps && !snapshot.terminated {
            snapshot.truncated = true;
        }
        Ok(snapshot)
    }

    fn env_description(&self) -> EnvironmentDescription {
        self.env.env_description()
    }
}
