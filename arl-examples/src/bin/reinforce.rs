use arl_agents::AgentKind;
use arl_api::builders::{ActorCriticBuilder, agents::VPGBuilder, env_pool::EnvPoolType};
use arl_core::{
    env::{Env, RolloutMode},
    rng::seed_rng,
};
use arl_examples::{TrainingArgs, init_logging, train};
use clap::Parser;

/// REINFORCE on whole episodes, optionally with a learned state value baseline.
#[derive(Parser, Debug)]
struct Args {
    #[command(flatten)]
    training: TrainingArgs,

    #[arg(long, default_value_t = 2e-3)]
    learning_rate: f64,

    #[arg(long, default_value_t = 0.99)]
    discount: f32,

    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    baseline: bool,

    /// Episodes collected per actor before each update.
    #[arg(long, default_value_t = 1)]
    episodes_per_update: usize,

    #[arg(long, value_delimiter = ',', default_value = "64,64")]
    hidden: Vec<usize>,
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse();
    seed_rng(args.training.seed);
    let device = args.training.device()?;
    let env_description = args.training.make_env()?.env_description();
    let vpg = VPGBuilder {
        actor_critic: ActorCriticBuilder {
            network: args.training.network(&args.hidden),
            learning_rate: args.learning_rate,
            ..Default::default()
        },
        gamma: args.discount,
        baseline: args.baseline,
    }
    .build(&env_description, &device)?;
    let rollout_mode = RolloutMode::EpisodeBound {
        n_episodes: args.episodes_per_update,
    };
    let logs = train(
        &args.training,
        AgentKind::VPG(vpg),
        rollout_mode,
        EnvPoolType::Vec,
    )?;
    if let Some(last) = logs.last() {
        log::info!("finished: {last}");
    }
    Ok(())
}
