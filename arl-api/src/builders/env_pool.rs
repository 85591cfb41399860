use arl_core::{
    env::Env,
    sampler::{EnvPoolKind, thread_env_pool::ThreadEnvPool, vec_env_pool::VecEnvPool},
};
use candle_core::Result;

#[derive(Debug, Clone, Copy, Default)]
pub enum EnvPoolType {
    /// Every env is stepped on the learner thread.
    #[default]
    Vec,
    /// One actor thread per env, seeded from `seed`.
    Thread { seed: u64 },
}

impl EnvPoolType {
    pub fn build<E: Env + Send + 'static>(self, envs: Vec<E>) -> Result<EnvPoolKind<E>> {
        match self {
            Self::Vec => Ok(EnvPoolKind::Vec(VecEnvPool::new(envs)?)),
            Self::Thread { seed } => {
                log::info!("starting {} actor threads", envs.len());
                Ok(EnvPoolKind::Thread(ThreadEnvPool::new(envs, seed)?))
            }
        }
    }
}
