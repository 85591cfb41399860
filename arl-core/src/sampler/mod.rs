pub mod thread_env_pool;
pub mod vec_env_pool;

use crate::{
    distributions::{Distribution, sample_on_device},
    env::{Env, EnvironmentDescription, RolloutMode},
    rng::random_seed,
    utils::rollout_buffer::RolloutBuffer,
};
use candle_core::{Result, Tensor};
use thread_env_pool::ThreadEnvPool;
use vec_env_pool::VecEnvPool;

pub trait Sampler {
    fn env_description(&self) -> EnvironmentDescription;

    fn num_envs(&self) -> usize;

    /// Runs the given distribution in every environment. One buffer is returned per
    /// environment, in environment order.
    fn collect_rollouts<D: Distribution + Clone + 'static>(
        &mut self,
        distr: &D,
        rollout_mode: RolloutMode,
    ) -> Result<Vec<RolloutBuffer>>;
}

/// A single environment together with the observation it is currently sitting in. In step bound
/// mode the observation survives between rollouts so episodes can span several of them.
pub struct EnvSlot<E: Env> {
    pub env: E,
    pub current_state: Option<Tensor>,
}

impl<E: Env> EnvSlot<E> {
    pub fn new(env: E) -> Self {
        Self {
            env,
            current_state: None,
        }
    }

    fn reset(&mut self) -> Result<Tensor> {
        self.env.reset(random_seed())
    }

    // appends one transition to `buffer` and returns whether the episode ended
    fn step<D: Distribution + ?Sized>(
        &mut self,
        distr: &D,
        state: Tensor,
        buffer: &mut RolloutBuffer,
    ) -> Result<(Tensor, bool)> {
        let (action, logp) = sample_on_device(distr, &state)?;
        let snapshot = self.env.step(&action)?;
        let done = snapshot.done();
        let logp = logp.to_scalar::<f32>()?;
        buffer.push_step(state, action, snapshot.reward, done, logp);
        buffer.set_raw_reward(snapshot.tracked_reward());
        buffer.set_room(snapshot.room);
        let next_state = if done { self.reset()? } else { snapshot.state };
        Ok((next_state, done))
    }

    pub fn rollout<D: Distribution + ?Sized>(
        &mut self,
        distr: &D,
        rollout_mode: RolloutMode,
    ) -> Result<RolloutBuffer> {
        let mut buffer = RolloutBuffer::default();
        let mut state = match (rollout_mode, self.current_state.take()) {
            (RolloutMode::StepBound { .. }, Some(state)) => state,
            _ => self.reset()?,
        };
        match rollout_mode {
            RolloutMode::StepBound { n_steps } => {
                for _ in 0..n_steps {
                    (state, _) = self.step(distr, state, &mut buffer)?;
                }
            }
            RolloutMode::EpisodeBound { n_episodes } => {
                let mut finished = 0;
                while finished < n_episodes {
                    let done;
                    (state, done) = self.step(distr, state, &mut buffer)?;
                    if done {
                        finished += 1;
                    }
                }
            }
        }
        buffer.set_last_state(state.clone());
        self.current_state = Some(state);
        Ok(buffer)
    }
}

pub enum EnvPoolKind<E: Env> {
    Vec(VecEnvPool<E>),
    Thread(ThreadEnvPool),
}

impl<E: Env> Sampler for EnvPoolKind<E> {
    fn env_description(&self) -> EnvironmentDescription {
        match self {
            Self::Vec(pool) => pool.env_description(),
            Self::Thread(pool) => pool.env_description(),
        }
    }

    fn num_envs(&self) -> usize {
        match self {
            Self::Vec(pool) => pool.num_envs(),
            Self::Thread(pool) => pool.num_envs(),
        }
    }

    fn collect_rollouts<D: Distribution + Clone + 'static>(
        &mut self,
        distr: &D,
        rollout_mode: RolloutMode,
    ) -> Result<Vec<RolloutBuffer>> {
        match self {
            Self::Vec(pool) => pool.collect_rollouts(distr, rollout_mode),
            Self::Thread(pool) => pool.collect_rollouts(distr, rollout_mode),
        }
    }
}
