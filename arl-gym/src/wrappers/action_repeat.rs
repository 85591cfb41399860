use arl_core::env::{Env, EnvironmentDescription, SnapShot};
use candle_core::{Result, Tensor};

/// Repeats every action `repeat` times (frame skipping) and sums the rewards. Stops early when
/// the episode ends.
pub struct ActionRepeat<E: Env> {
    env: E,
    repeat: usize,
}

impl<E: Env> ActionRepeat<E> {
    pub fn new(env: E, repeat: usize) -> Self {
        assert!(repeat > 0, "repeat must be positive");
        Self { env, repeat }
    }
}

impl<E: Env> Env for ActionRepeat<E> {
    fn reset(&mut self, seed: u64) -> Result<Tensor> {
        self.env.reset(seed)
    }

    fn step(&mut self, action: &Tensor) -> Result<SnapShot> {
        let mut reward = 0.;
        let mut raw_reward = 0.;
        let mut snapshot = self.env.step(action)?;
        for i in 0.. {
            reward += snapshot.reward;
            raw_reward += snapshot.tracked_reward();
            if snapshot.done() || i + 1 == self.repeat {
                break;
            }
            snapshot = self.env.step(action)?;
        }
        snapshot.reward = reward;
        snapshot.raw_reward = Some(raw_reward);
        Ok(snapshot)
    }

    fn env_description(&self) -> EnvironmentDescription {
        self.env.env_description()
    }
}
