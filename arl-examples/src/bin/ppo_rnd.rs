use arl_agents::{
    AgentKind,
    rnd::{IntrinsicCritic, Rnd, RndPPOHooks},
};
use arl_api::builders::env_pool::EnvPoolType;
use arl_core::{env::Env, rng::seed_rng};
use arl_examples::{PPOArgs, TrainingArgs, init_logging, train};
use clap::{CommandFactory, FromArgMatches, Parser};

/// PPO with random network distillation as an exploration bonus. Defaults to the sparse reward
/// mountain car; with `--atari --environment-name ALE/MontezumaRevenge-v5` it explores rooms.
#[derive(Parser, Debug)]
struct Args {
    #[command(flatten)]
    training: TrainingArgs,

    #[command(flatten)]
    ppo: PPOArgs,

    #[arg(long, default_value_t = 2.0)]
    extrinsic_coef: f32,

    #[arg(long, default_value_t = 1.0)]
    intrinsic_coef: f32,

    #[arg(long, default_value_t = 0.99)]
    intrinsic_discount: f32,

    #[arg(long, default_value_t = 64)]
    rnd_embedding_size: usize,

    #[arg(long, default_value_t = 1e-4)]
    rnd_learning_rate: f64,

    /// Share of each batch the predictor is trained on.
    #[arg(long, default_value_t = 0.25)]
    rnd_update_proportion: f32,
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let matches = Args::command()
        .mut_arg("environment_name", |arg| arg.default_value("MountainCar-v0"))
        .get_matches();
    let args = Args::from_arg_matches(&matches)?;
    seed_rng(args.training.seed);
    let device = args.training.device()?;
    let env_description = args.training.make_env()?.env_description();

    let builder = args.ppo.builder(&args.training);
    let (rnd, critic) = if args.training.atari {
        let observation_shape = &env_description.observation_shape;
        let rnd = Rnd::conv(
            observation_shape,
            args.rnd_embedding_size,
            args.rnd_learning_rate,
            args.rnd_update_proportion,
            device.clone(),
        )?;
        let critic = IntrinsicCritic::conv(observation_shape, args.ppo.learning_rate, &device)?;
        (rnd, critic)
    } else {
        let observation_size = env_description.observation_size();
        let rnd = Rnd::mlp(
            observation_size,
            &args.ppo.hidden,
            args.rnd_embedding_size,
            args.rnd_learning_rate,
            args.rnd_update_proportion,
            device.clone(),
        )?;
        let critic = IntrinsicCritic::mlp(
            observation_size,
            &args.ppo.hidden,
            args.ppo.learning_rate,
            &device,
        )?;
        (rnd, critic)
    };
    let hooks = RndPPOHooks::new(
        builder.default_hooks(),
        rnd,
        critic,
        args.extrinsic_coef,
        args.intrinsic_coef,
        args.intrinsic_discount,
        device.clone(),
    )?;
    let ppo = builder.build_with_hooks(&env_description, &device, Box::new(hooks))?;
    let logs = train(
        &args.training,
        AgentKind::PPO(ppo),
        args.ppo.rollout_mode(),
        EnvPoolType::Vec,
    )?;
    if let Some(last) = logs.last() {
        log::info!("finished: {last}");
    }
    Ok(())
}
