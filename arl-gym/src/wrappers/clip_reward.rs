use arl_core::env::{Env, EnvironmentDescription, SnapShot};
use candle_core::{Result, Tensor};

/// Replaces the reward by its sign. The original reward stays available as `raw_reward`.
pub struct ClipReward<E: Env> {
    env: E,
}

impl<E: Env> ClipReward<E> {
    pub fn new(env: E) -> Self {
        Self { env }
    }
}

fn sign(x: f32) -> f32 {
    if x > 0. {
        1.
    } else if x < 0. {
        -1.
    } else {
        0.
    }
}

impl<E: Env> Env for ClipReward<E> {
    fn reset(&mut self, seed: u64) -> Result<Tensor> {
        self.env.reset(seed)
    }

    fn step(&mut self, action: &Tensor) -> Result<SnapShot> {
        let mut snapshot = self.env.step(action)?;
        snapshot.raw_reward = Some(snapshot.tracked_reward());
        snapshot.reward = sign(snapshot.reward);
        Ok(snapshot)
    }

    fn env_description(&self) -> EnvironmentDescription {
        self.env.env_description()
    }
}
