use arl_agents::AgentKind;
use arl_api::builders::env_pool::EnvPoolType;
use arl_core::{env::Env, rng::seed_rng};
use arl_examples::{PPOArgs, TrainingArgs, init_logging, train};
use clap::Parser;

/// PPO with one actor thread per environment. The learner broadcasts the current policy at the
/// start of every rollout and waits for all actors before updating.
#[derive(Parser, Debug)]
struct Args {
    #[command(flatten)]
    training: TrainingArgs,

    #[command(flatten)]
    ppo: PPOArgs,
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse();
    seed_rng(args.training.seed);
    let device = args.training.device()?;
    let env_description = args.training.make_env()?.env_description();
    let ppo = args
        .ppo
        .builder(&args.training)
        .build(&env_description, &device)?;
    let env_pool_type = EnvPoolType::Thread {
        seed: args.training.seed,
    };
    let logs = train(
        &args.training,
        AgentKind::PPO(ppo),
        args.ppo.rollout_mode(),
        env_pool_type,
    )?;
    if let Some(last) = logs.last() {
        log::info!("finished: {last}");
    }
    Ok(())
}
