use arl_examples::init_logging;
use arl_gym::{classic_control::mountain_car::MountainCar, wrappers::time_limit::TimeLimit};
use arl_tabular::{
    linear_vfa::{LinearQFunction, semi_gradient_sarsa},
    runs::run_parallel,
    tile_coding::TileCoder,
};
use clap::Parser;

#[derive(Parser, Debug)]
struct Args {
    /// Step size before it is split across the tilings.
    #[arg(long, default_value_t = 0.5)]
    learning_rate: f64,

    #[arg(long, default_value_t = 1.0)]
    discount: f64,

    #[arg(long, default_value_t = 0.0)]
    epsilon: f64,

    #[arg(long, default_value_t = 8)]
    num_tilings: usize,

    #[arg(long, default_value_t = 8)]
    num_tiles: usize,

    #[arg(long, default_value_t = 4096)]
    iht_size: usize,

    #[arg(long, default_value_t = 500)]
    num_episodes: usize,

    #[arg(long, default_value_t = 10)]
    num_runs: usize,

    #[arg(long, default_value_t = 1000)]
    max_episode_steps: usize,

    #[arg(long, default_value_t = 1)]
    seed: u64,
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse();
    let (low, high) = MountainCar::bounds();
    let low = low.map(f64::from);
    let high = high.map(f64::from);

    let runs = run_parallel(args.num_runs, args.seed, |run| {
        let coder = TileCoder::new(args.iht_size, args.num_tilings, args.num_tiles, &low, &high);
        let mut q = LinearQFunction::new(coder, 3, args.learning_rate);
        let mut env = TimeLimit::new(MountainCar::default(), args.max_episode_steps);
        let lengths = semi_gradient_sarsa(
            &mut env,
            &mut q,
            args.discount,
            args.epsilon,
            args.num_episodes,
        )?;
        log::info!("run {run} done");
        // cost to go at the bottom of the valley
        let cost_to_go = -q.values(&[-0.5, 0.]).into_iter().fold(f64::MIN, f64::max);
        candle_core::Result::Ok((lengths, cost_to_go))
    })
    .into_iter()
    .collect::<candle_core::Result<Vec<_>>>()?;

    let num_runs = runs.len() as f64;
    let report_every = (args.num_episodes / 20).max(1);
    println!("Average steps per episode over {} runs:", runs.len());
    for episode in (0..args.num_episodes).step_by(report_every) {
        let mean = runs
            .iter()
            .map(|(lengths, _)| lengths[episode] as f64)
            .sum::<f64>()
            / num_runs;
        println!("  episode {:<5} {:>8.1}", episode + 1, mean);
    }
    let cost_to_go = runs.iter().map(|(_, c)| c).sum::<f64>() / num_runs;
    println!("Estimated cost to go from (-0.5, 0): {cost_to_go:.1}");
    Ok(())
}
