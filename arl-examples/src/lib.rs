use arl_agents::AgentKind;
use arl_api::{
    builders::{
        ActorCriticBuilder, LearningModuleType, Network,
        agents::PPOBuilder,
        env_pool::EnvPoolType,
    },
    trainer::{IterationLog, Trainer, TrainerConfig},
};
use arl_core::env::RolloutMode;
use arl_gym::BoxedEnv;
use candle_core::{Device, Result};
use clap::Args;
use std::path::PathBuf;

/// Flags shared by the deep RL chapter programs.
#[derive(Args, Debug, Clone)]
pub struct TrainingArgs {
    #[arg(long, default_value = "CartPole-v1")]
    pub environment_name: String,

    /// Play an Atari game through gymnasium, e.g. `ALE/Pong-v5`. Needs the `python` feature.
    #[arg(long, default_value_t = false)]
    pub atari: bool,

    #[arg(long, default_value_t = 4)]
    pub environment_frame_skip: usize,

    #[arg(long, default_value_t = 4)]
    pub environment_frame_stack: usize,

    #[arg(long, default_value_t = 84)]
    pub environment_screen_size: usize,

    /// End training episodes of Atari games on a lost life. Evaluation always plays full games.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub terminal_on_life_loss: bool,

    #[arg(long, default_value_t = 8)]
    pub num_actors: usize,

    #[arg(long, default_value_t = 100)]
    pub num_iterations: usize,

    /// Environment steps over all actors per iteration.
    #[arg(long, default_value_t = 20_000)]
    pub num_train_steps: usize,

    #[arg(long, default_value_t = 5_000)]
    pub num_eval_steps: usize,

    #[arg(long, default_value_t = 1)]
    pub seed: u64,

    /// Checkpoints are only written when this directory exists.
    #[arg(long)]
    pub checkpoint_dir: Option<PathBuf>,

    #[arg(long)]
    pub results_csv_path: Option<PathBuf>,

    /// Also log to `runs/<dir>` for tensorboard.
    #[arg(long)]
    pub tensorboard_log_dir: Option<String>,

    #[arg(long, default_value_t = false)]
    pub cuda: bool,
}

impl TrainingArgs {
    pub fn trainer_config(&self) -> TrainerConfig {
        TrainerConfig {
            environment_name: self.environment_name.clone(),
            num_iterations: self.num_iterations,
            num_train_steps: self.num_train_steps,
            num_eval_steps: self.num_eval_steps,
            step_multiplier: if self.atari {
                self.environment_frame_skip
            } else {
                1
            },
            results_csv_path: self.results_csv_path.clone(),
            checkpoint_dir: self.checkpoint_dir.clone(),
            tensorboard_log_dir: self.tensorboard_log_dir.clone(),
        }
    }

    pub fn device(&self) -> Result<Device> {
        if self.cuda {
            Device::cuda_if_available(0)
        } else {
            Ok(Device::Cpu)
        }
    }

    pub fn make_env(&self) -> Result<BoxedEnv> {
        if self.atari {
            make_atari_env(self, self.terminal_on_life_loss)
        } else {
            arl_gym::make_env(&self.environment_name)
        }
    }

    pub fn make_eval_env(&self) -> Result<BoxedEnv> {
        if self.atari {
            make_atari_env(self, false)
        } else {
            arl_gym::make_env(&self.environment_name)
        }
    }

    pub fn network(&self, hidden: &[usize]) -> Network {
        if self.atari {
            Network::Conv
        } else {
            Network::Mlp {
                hidden: hidden.to_vec(),
            }
        }
    }

    /// One environment per actor.
    pub fn make_envs(&self) -> Result<Vec<BoxedEnv>> {
        if self.num_actors == 0 {
            return Err(candle_core::Error::Msg(
                "at least one actor is required".into(),
            ));
        }
        (0..self.num_actors).map(|_| self.make_env()).collect()
    }
}

#[cfg(feature = "python")]
fn make_atari_env(args: &TrainingArgs, terminal_on_life_loss: bool) -> Result<BoxedEnv> {
    use arl_gym::{
        gym::GymEnv,
        wrappers::{clip_reward::ClipReward, frame_stack::FrameStack},
    };
    let env = GymEnv::atari(
        &args.environment_name,
        args.environment_frame_skip,
        args.environment_screen_size,
        terminal_on_life_loss,
    )?;
    Ok(Box::new(FrameStack::new(
        ClipReward::new(env),
        args.environment_frame_stack,
    )))
}

#[cfg(not(feature = "python"))]
fn make_atari_env(_: &TrainingArgs, _: bool) -> Result<BoxedEnv> {
    Err(candle_core::Error::Msg(
        "atari games need the `python` feature".into(),
    ))
}

/// Runs the iteration loop with a fresh evaluation env and returns the per iteration logs.
pub fn train(
    args: &TrainingArgs,
    agent: AgentKind,
    rollout_mode: RolloutMode,
    env_pool_type: EnvPoolType,
) -> Result<Vec<IterationLog>> {
    let sampler = env_pool_type.build(args.make_envs()?)?;
    let mut trainer = Trainer::new(
        sampler,
        agent,
        args.make_eval_env()?,
        rollout_mode,
        args.trainer_config(),
    )?;
    trainer.run()
}

/// PPO hyper parameters shared by the PPO programs.
#[derive(Args, Debug, Clone)]
pub struct PPOArgs {
    #[arg(long, default_value_t = 3e-4)]
    pub learning_rate: f64,

    #[arg(long, default_value_t = 0.99)]
    pub discount: f32,

    #[arg(long, default_value_t = 0.95)]
    pub gae_lambda: f32,

    #[arg(long, default_value_t = 0.2)]
    pub clip_epsilon: f32,

    #[arg(long, default_value_t = 4)]
    pub update_epochs: usize,

    #[arg(long, default_value_t = 64)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 0.0)]
    pub entropy_coef: f32,

    #[arg(long, default_value_t = 0.5)]
    pub value_coef: f32,

    /// Stop the epochs early once the approximate KL exceeds 1.5 times this.
    #[arg(long)]
    pub target_kl: Option<f32>,

    #[arg(long, default_value_t = 0.5)]
    pub max_grad_norm: f32,

    /// Transitions collected per actor before each update.
    #[arg(long, default_value_t = 128)]
    pub sequence_length: usize,

    #[arg(long, value_delimiter = ',', default_value = "64,64")]
    pub hidden: Vec<usize>,
}

impl PPOArgs {
    pub fn builder(&self, training: &TrainingArgs) -> PPOBuilder {
        PPOBuilder {
            actor_critic: ActorCriticBuilder {
                network: training.network(&self.hidden),
                learning_module_type: LearningModuleType::Decoupled {
                    policy_max_grad_norm: Some(self.max_grad_norm),
                    value_max_grad_norm: Some(self.max_grad_norm),
                },
                learning_rate: self.learning_rate,
                ..Default::default()
            },
            clip_range: self.clip_epsilon,
            gamma: self.discount,
            lambda: self.gae_lambda,
            sample_size: self.batch_size,
            n_epochs: self.update_epochs,
            ent_coef: self.entropy_coef,
            vf_coef: self.value_coef,
            target_kl: self.target_kl,
        }
    }

    pub fn rollout_mode(&self) -> RolloutMode {
        RolloutMode::StepBound {
            n_steps: self.sequence_length,
        }
    }
}

pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

#[cfg(test)]
mod test {
    use super::{PPOArgs, TrainingArgs};
    use arl_api::builders::Network;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct Args {
        #[command(flatten)]
        training: TrainingArgs,

        #[command(flatten)]
        ppo: PPOArgs,
    }

    #[test]
    fn frame_skip_only_scales_atari_steps() {
        let args = Args::parse_from(["ppo", "--environment-frame-skip", "4"]);
        assert_eq!(args.training.trainer_config().step_multiplier, 1);
        let args = Args::parse_from(["ppo", "--atari", "--environment-name", "ALE/Pong-v5"]);
        assert_eq!(args.training.trainer_config().step_multiplier, 4);
        assert!(matches!(args.training.network(&[64]), Network::Conv));
    }

    #[test]
    fn ppo_flags_reach_the_builder() {
        let args = Args::parse_from([
            "ppo",
            "--clip-epsilon",
            "0.1",
            "--hidden",
            "32,16",
            "--target-kl",
            "0.02",
        ]);
        let builder = args.ppo.builder(&args.training);
        assert_eq!(builder.clip_range, 0.1);
        assert_eq!(builder.n_epochs, 4);
        assert_eq!(builder.target_kl, Some(0.02));
        match builder.actor_critic.network {
            Network::Mlp { hidden } => assert_eq!(hidden, vec![32, 16]),
            Network::Conv => panic!("expected an MLP"),
        }
    }

    #[test]
    fn life_loss_ends_training_episodes_by_default() {
        let args = Args::parse_from(["ppo", "--atari"]);
        assert!(args.training.terminal_on_life_loss);
        let args = Args::parse_from(["ppo", "--atari", "--terminal-on-life-loss", "false"]);
        assert!(!args.training.terminal_on_life_loss);
    }

    #[test]
    fn zero_actors_is_an_error() {
        let args = Args::parse_from(["ppo", "--num-actors", "0"]);
        assert!(args.training.make_envs().is_err());
    }
}
