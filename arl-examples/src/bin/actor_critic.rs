use arl_agents::AgentKind;
use arl_api::builders::{
    ActorCriticBuilder, LearningModuleType, agents::A2CBuilder, env_pool::EnvPoolType,
};
use arl_core::{
    env::{Env, RolloutMode},
    rng::seed_rng,
};
use arl_examples::{TrainingArgs, init_logging, train};
use clap::Parser;

/// Advantage actor-critic with a shared optimizer over policy and value heads.
#[derive(Parser, Debug)]
struct Args {
    #[command(flatten)]
    training: TrainingArgs,

    #[arg(long, default_value_t = 2.5e-4)]
    learning_rate: f64,

    #[arg(long, default_value_t = 0.99)]
    discount: f32,

    /// 1 gives the n-step returns of the classic algorithm.
    #[arg(long, default_value_t = 1.0)]
    gae_lambda: f32,

    #[arg(long, default_value_t = 0.025)]
    entropy_coef: f32,

    #[arg(long, default_value_t = 0.5)]
    value_coef: f32,

    /// Leave unset to learn from the whole rollout at once.
    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    clip_grad: bool,

    #[arg(long, default_value_t = 5.0)]
    max_grad_norm: f32,

    /// Transitions collected per actor before each update.
    #[arg(long, default_value_t = 128)]
    sequence_length: usize,

    #[arg(long, value_delimiter = ',', default_value = "64,64")]
    hidden: Vec<usize>,
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse();
    seed_rng(args.training.seed);
    let device = args.training.device()?;
    let env_description = args.training.make_env()?.env_description();
    let a2c = A2CBuilder {
        actor_critic: ActorCriticBuilder {
            network: args.training.network(&args.hidden),
            learning_module_type: LearningModuleType::Paralell {
                max_grad_norm: args.clip_grad.then_some(args.max_grad_norm),
            },
            learning_rate: args.learning_rate,
            init_log_std: 0.,
        },
        gamma: args.discount,
        lambda: args.gae_lambda,
        ent_coef: args.entropy_coef,
        value_coef: args.value_coef,
        sample_size: args.batch_size,
    }
    .build(&env_description, &device)?;
    let rollout_mode = RolloutMode::StepBound {
        n_steps: args.sequence_length,
    };
    let logs = train(
        &args.training,
        AgentKind::A2C(a2c),
        rollout_mode,
        EnvPoolType::Vec,
    )?;
    if let Some(last) = logs.last() {
        log::info!("finished: {last}");
    }
    Ok(())
}
