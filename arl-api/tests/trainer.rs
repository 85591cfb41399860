use anyhow::Result;
use arl_agents::AgentKind;
use arl_api::{
    builders::{
        ActorCriticBuilder, LearningModuleType, Network,
        agents::{A2CBuilder, PPOBuilder, VPGBuilder},
        env_pool::EnvPoolType,
    },
    trainer::{Trainer, TrainerConfig},
    utils::checkpoint::load_checkpoint,
};
use arl_core::{
    agents::Agent,
    distributions::{Distribution, DistributionKind},
    policies::ValueFunction,
    env::{Env, EnvironmentDescription, RolloutMode, SnapShot, Space},
    rng::seed_rng,
    sampler::vec_env_pool::VecEnvPool,
};
use arl_gym::{make_env, make_envs};
use candle_core::{DType, Device, Tensor};

// Every episode lasts exactly `length` steps and pays 1 per step. A new room starts every
// fourth step.
struct FixedLength {
    length: usize,
    steps: usize,
}

impl FixedLength {
    fn new(length: usize) -> Self {
        Self { length, steps: 0 }
    }

    fn observation(&self) -> candle_core::Result<Tensor> {
        Tensor::new(&[self.steps as f32 / self.length as f32], &Device::Cpu)
    }
}

impl Env for FixedLength {
    fn reset(&mut self, _seed: u64) -> candle_core::Result<Tensor> {
        self.steps = 0;
        self.observation()
    }

    fn step(&mut self, _action: &Tensor) -> candle_core::Result<SnapShot> {
        self.steps += 1;
        let terminated = self.steps >= self.length;
        Ok(SnapShot::new(self.observation()?, 1., terminated, false).with_room(self.steps / 4))
    }

    fn env_description(&self) -> EnvironmentDescription {
        EnvironmentDescription::new(Space::continous_from_dims(&[1]), Space::Discrete(2))
    }
}

fn scratch_dir(name: &str) -> Result<std::path::PathBuf> {
    let dir = std::env::temp_dir().join(format!("arl-api-{}-{name}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

#[test]
fn ppo_iterations_write_rows_and_checkpoints() -> Result<()> {
    seed_rng(0);
    let dir = scratch_dir("ppo")?;
    let sampler = EnvPoolType::Vec.build(make_envs("CartPole-v1", 2)?)?;
    let env_description = make_env("CartPole-v1")?.env_description();
    let ppo = PPOBuilder::default().build(&env_description, &Device::Cpu)?;
    let config = TrainerConfig {
        environment_name: "CartPole-v1".into(),
        num_iterations: 2,
        num_train_steps: 256,
        num_eval_steps: 100,
        results_csv_path: Some(dir.join("logs").join("results.csv")),
        checkpoint_dir: Some(dir.clone()),
        ..Default::default()
    };
    let mut trainer = Trainer::new(
        sampler,
        AgentKind::PPO(ppo),
        make_env("CartPole-v1")?,
        RolloutMode::StepBound { n_steps: 64 },
        config,
    )?;
    let logs = trainer.run()?;
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[1].step, 512);
    assert!(logs[0].train_num_episodes > 0);
    assert!(logs[0].eval_episode_return.is_finite());

    let csv = std::fs::read_to_string(dir.join("logs").join("results.csv"))?;
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("iteration,step,train_step_rate"));

    let checkpoint = dir.join("CartPole-v1_iteration_2.safetensors");
    let varmaps = trainer.algorithm.agent.learning_module().varmaps();
    let metadata = load_checkpoint(&varmaps, &checkpoint)?;
    assert_eq!(metadata.iteration, 2);
    assert_eq!(metadata.environment, "CartPole-v1");

    let returns = trainer
        .evaluator
        .episode_returns(trainer.algorithm.agent.distribution(), 2)?;
    assert_eq!(returns.len(), 2);
    // cartpole pays 1 per step, at most 500 steps
    assert!(returns.iter().all(|r| *r >= 1. && *r <= 500.));
    Ok(())
}

#[test]
fn thread_pool_drives_a2c() -> Result<()> {
    seed_rng(1);
    let sampler = EnvPoolType::Thread { seed: 1 }.build(make_envs("CartPole-v1", 3)?)?;
    let env_description = make_env("CartPole-v1")?.env_description();
    let a2c = A2CBuilder::default().build(&env_description, &Device::Cpu)?;
    let config = TrainerConfig {
        num_iterations: 1,
        num_train_steps: 300,
        num_eval_steps: 50,
        ..Default::default()
    };
    let mut trainer = Trainer::new(
        sampler,
        AgentKind::A2C(a2c),
        make_env("CartPole-v1")?,
        RolloutMode::StepBound { n_steps: 20 },
        config,
    )?;
    let logs = trainer.run()?;
    assert!(logs[0].train_step_rate > 0.);
    Ok(())
}

#[test]
fn continuous_actions_get_a_gaussian_policy() -> Result<()> {
    let env_description = make_env("Pendulum-v1")?.env_description();
    let vpg = VPGBuilder::default().build(&env_description, &Device::Cpu)?;
    assert!(matches!(vpg.distribution, DistributionKind::DiagGaussian(_)));
    let conv = ActorCriticBuilder {
        network: Network::Conv,
        ..Default::default()
    };
    assert!(conv.build(&env_description, &Device::Cpu).is_err());
    Ok(())
}

#[test]
fn episodes_spanning_iterations_report_their_full_return() -> Result<()> {
    seed_rng(2);
    let sampler = VecEnvPool::new(vec![FixedLength::new(10)])?;
    let a2c = A2CBuilder::default().build(&FixedLength::new(10).env_description(), &Device::Cpu)?;
    let config = TrainerConfig {
        num_iterations: 3,
        num_train_steps: 7,
        num_eval_steps: 10,
        ..Default::default()
    };
    let mut trainer = Trainer::new(
        sampler,
        AgentKind::A2C(a2c),
        FixedLength::new(10),
        RolloutMode::StepBound { n_steps: 7 },
        config,
    )?;
    let logs = trainer.run()?;
    // episodes end at steps 10 and 20, inside the second and third iteration
    let finished: Vec<_> = logs.iter().map(|log| log.train_num_episodes).collect();
    assert_eq!(finished, vec![0, 1, 1]);
    for log in logs.iter().filter(|log| log.train_num_episodes > 0) {
        assert_eq!(log.train_episode_return, 10.);
        // steps 1..=10 pass rooms 0, 1 and 2
        assert_eq!(log.train_episode_visited_rooms, 3.);
    }
    assert_eq!(logs[0].train_episode_visited_rooms, 0.);
    assert_eq!(logs[2].eval_episode_return, 10.);
    assert_eq!(logs[2].eval_episode_visited_rooms, 3.);
    Ok(())
}

#[test]
fn shared_actor_critic_trains_one_conv_body() -> Result<()> {
    let env_description =
        EnvironmentDescription::new(Space::continous_from_dims(&[4, 36, 36]), Space::Discrete(6))
            .with_observation_shape(vec![4, 36, 36]);
    let builder = |learning_module_type| ActorCriticBuilder {
        network: Network::Conv,
        learning_module_type,
        ..Default::default()
    };

    let shared = builder(LearningModuleType::Paralell {
        max_grad_norm: Some(5.),
    });
    let (distribution, learning_module) = shared.build(&env_description, &Device::Cpu)?;
    let varmaps = learning_module.varmaps();
    assert_eq!(varmaps.len(), 1);
    // conv0..2 and fc once, a dense layer for each head
    assert_eq!(varmaps[0].all_vars().len(), 8 + 2 + 2);
    let observation = Tensor::zeros((2, 4, 36, 36), DType::F32, &Device::Cpu)?;
    assert_eq!(learning_module.calculate_values(&observation)?.dims(), &[2]);
    assert_eq!(distribution.entropy(&observation)?.dims(), &[2]);

    let decoupled = builder(LearningModuleType::Decoupled {
        policy_max_grad_norm: None,
        value_max_grad_norm: None,
    });
    let (_, learning_module) = decoupled.build(&env_description, &Device::Cpu)?;
    let sizes: Vec<usize> = learning_module
        .varmaps()
        .iter()
        .map(|varmap| varmap.all_vars().len())
        .collect();
    assert_eq!(sizes, vec![10, 10]);
    Ok(())
}
