use super::{EnvSlot, Sampler};
use crate::{
    distributions::Distribution,
    env::{Env, EnvironmentDescription, RolloutMode},
    utils::rollout_buffer::RolloutBuffer,
};
use candle_core::{Error, Result};

/// Steps every environment one after the other on the calling thread.
pub struct VecEnvPool<E: Env> {
    slots: Vec<EnvSlot<E>>,
    env_description: EnvironmentDescription,
}

impl<E: Env> VecEnvPool<E> {
    pub fn new(envs: Vec<E>) -> Result<Self> {
        let Some(first) = envs.first() else {
            return Err(Error::Msg("an env pool needs at least one env".into()));
        };
        let env_description = first.env_description();
        Ok(Self {
            slots: envs.into_iter().map(EnvSlot::new).collect(),
            env_description,
        })
    }
}

impl<E: Env> Sampler for VecEnvPool<E> {
    fn env_description(&self) -> EnvironmentDescription {
        self.env_description.clone()
    }

    fn num_envs(&self) -> usize {
        self.slots.len()
    }

    fn collect_rollouts<D: Distribution + Clone + 'static>(
        &mut self,
        distr: &D,
        rollout_mode: RolloutMode,
    ) -> Result<Vec<RolloutBuffer>> {
        self.slots
            .iter_mut()
            .map(|slot| slot.rollout(distr, rollout_mode))
            .collect()
    }
}
