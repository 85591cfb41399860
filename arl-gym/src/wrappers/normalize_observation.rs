use arl_core::{
    env::{Env, EnvironmentDescription, SnapShot},
    utils::running_mean::RunningMeanStd,
};
use candle_core::{Device, Result, Tensor};

/// Normalizes observations with running statistics of every observation seen so far, clipped
/// to `[-clip, clip]`.
pub struct NormalizeObservation<E: Env> {
    env: E,
    obs_rms: RunningMeanStd,
    clip: f32,
}

impl<E: Env> NormalizeObservation<E> {
    pub fn new(env: E, clip: f32) -> Result<Self> {
        let shape = env.env_description().observation_shape;
        let obs_rms = RunningMeanStd::new(shape.as_slice(), Device::Cpu)?;
        Ok(Self { env, obs_rms, clip })
    }

    fn normalize(&mut self, observation: &Tensor) -> Result<Tensor> {
        self.obs_rms.update(&observation.unsqueeze(0)?)?;
        self.obs_rms.normalize(observation, self.clip)
    }
}

impl<E: Env> Env for NormalizeObservation<E> {
    fn reset(&mut self, seed: u64) -> Result<Tensor> {
        let observation = self.env.reset(seed)?;
        self.normalize(&observation)
    }

    fn step(&mut self, action: &Tensor) -> Result<SnapShot> {
        let mut snapshot = self.env.step(action)?;
        snapshot.state = self.normalize(&snapshot.state)?;
        Ok(snapshot)
    }

    fn env_description(&self) -> EnvironmentDescription {
        self.env.env_description()
    }
}
