use anyhow::Result;
use arl_core::{
    distributions::categorical_distribution::CategoricalDistribution,
    env::{Env, EnvironmentDescription, RolloutMode, SnapShot, Space, action_index},
    rng::seed_rng,
    sampler::{Sampler, thread_env_pool::ThreadEnvPool, vec_env_pool::VecEnvPool},
};
use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};

// Walk along a line of `length` cells; the episode ends at either end.
struct Corridor {
    length: i64,
    position: i64,
}

impl Corridor {
    fn new(length: i64) -> Self {
        Self {
            length,
            position: length / 2,
        }
    }

    fn observation(&self) -> candle_core::Result<Tensor> {
        Tensor::new(&[self.position as f32], &Device::Cpu)
    }
}

impl Env for Corridor {
    fn reset(&mut self, _seed: u64) -> candle_core::Result<Tensor> {
        self.position = self.length / 2;
        self.observation()
    }

    fn step(&mut self, action: &Tensor) -> candle_core::Result<SnapShot> {
        self.position += if action_index(action)? == 0 { -1 } else { 1 };
        let terminated = self.position <= 0 || self.position >= self.length;
        let reward = if self.position >= self.length { 1. } else { 0. };
        Ok(SnapShot::new(self.observation()?, reward, terminated, false))
    }

    fn env_description(&self) -> EnvironmentDescription {
        EnvironmentDescription::new(Space::continous_from_dims(&[1]), Space::Discrete(2))
    }
}

fn policy() -> Result<CategoricalDistribution> {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    Ok(CategoricalDistribution::build(1, 2, &[8], &vb, Device::Cpu, "policy")?)
}

#[test]
fn step_bound_rollouts_have_fixed_length() -> Result<()> {
    seed_rng(0);
    let mut pool = VecEnvPool::new(vec![Corridor::new(4), Corridor::new(4)])?;
    let rollouts = pool.collect_rollouts(&policy()?, RolloutMode::StepBound { n_steps: 10 })?;
    assert_eq!(rollouts.len(), 2);
    for rb in rollouts.iter() {
        assert_eq!(rb.len(), 10);
        assert_eq!(rb.states.len(), 11);
    }
    Ok(())
}

#[test]
fn episode_bound_rollouts_end_on_done() -> Result<()> {
    seed_rng(1);
    let mut pool = VecEnvPool::new(vec![Corridor::new(4)])?;
    let rollouts = pool.collect_rollouts(&policy()?, RolloutMode::EpisodeBound { n_episodes: 3 })?;
    let rb = &rollouts[0];
    assert_eq!(rb.num_episodes(), 3);
    assert_eq!(rb.dones.last(), Some(&true));
    Ok(())
}

#[test]
fn thread_pool_matches_env_order() -> Result<()> {
    let mut pool = ThreadEnvPool::new(vec![Corridor::new(4), Corridor::new(6), Corridor::new(8)], 3)?;
    assert_eq!(pool.num_envs(), 3);
    let distr = policy()?;
    for _ in 0..2 {
        let rollouts = pool.collect_rollouts(&distr, RolloutMode::StepBound { n_steps: 16 })?;
        assert_eq!(rollouts.len(), 3);
        assert!(rollouts.iter().all(|rb| rb.len() == 16));
    }
    Ok(())
}

#[test]
fn empty_pools_are_rejected() {
    assert!(VecEnvPool::<Corridor>::new(vec![]).is_err());
    assert!(ThreadEnvPool::new(Vec::<Corridor>::new(), 0).is_err());
}

// Fails on the given step, either with an error or by panicking.
struct Faulty {
    fail_at: usize,
    panic: bool,
    steps: usize,
}

impl Env for Faulty {
    fn reset(&mut self, _seed: u64) -> candle_core::Result<Tensor> {
        Tensor::new(&[0f32], &Device::Cpu)
    }

    fn step(&mut self, _action: &Tensor) -> candle_core::Result<SnapShot> {
        self.steps += 1;
        if self.steps == self.fail_at {
            if self.panic {
                panic!("simulator crashed");
            }
            return Err(candle_core::Error::Msg("simulator lost".into()));
        }
        Ok(SnapShot::new(Tensor::new(&[0f32], &Device::Cpu)?, 0., false, false))
    }

    fn env_description(&self) -> EnvironmentDescription {
        EnvironmentDescription::new(Space::continous_from_dims(&[1]), Space::Discrete(2))
    }
}

fn faulty_pool(panic: bool) -> Result<ThreadEnvPool> {
    let envs = vec![
        Faulty {
            fail_at: usize::MAX,
            panic,
            steps: 0,
        },
        Faulty {
            fail_at: 3,
            panic,
            steps: 0,
        },
    ];
    Ok(ThreadEnvPool::new(envs, 0)?)
}

#[test]
fn failing_actor_reports_an_error() -> Result<()> {
    let mut pool = faulty_pool(false)?;
    let err = pool
        .collect_rollouts(&policy()?, RolloutMode::StepBound { n_steps: 5 })
        .err()
        .map(|err| err.to_string());
    assert!(err.is_some_and(|err| err.contains("simulator lost")));
    Ok(())
}

#[test]
fn panicking_actor_does_not_block_the_learner() -> Result<()> {
    let mut pool = faulty_pool(true)?;
    let distr = policy()?;
    let err = pool
        .collect_rollouts(&distr, RolloutMode::StepBound { n_steps: 5 })
        .err()
        .map(|err| err.to_string());
    assert!(err.is_some_and(|err| err.contains("simulator crashed")));
    // the actor survives its panic and keeps serving rollouts
    let rollouts = pool.collect_rollouts(&distr, RolloutMode::StepBound { n_steps: 5 })?;
    assert_eq!(rollouts.len(), 2);
    Ok(())
}
