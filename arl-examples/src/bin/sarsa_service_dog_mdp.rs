use arl_examples::init_logging;
use arl_tabular::{
    dog_mdp::{DogMdp, STATE_NAMES},
    dp::{compute_vstar_from_qstar, format_state_value},
    runs::{average_tables, run_parallel},
    td::{q_learning, sarsa},
};
use clap::{Parser, ValueEnum};

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Method {
    Sarsa,
    QLearning,
}

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, value_enum, default_value_t = Method::Sarsa)]
    method: Method,

    #[arg(long, default_value_t = 0.9)]
    discount: f64,

    #[arg(long, default_value_t = 1.0)]
    begin_epsilon: f64,

    #[arg(long, default_value_t = 0.01)]
    end_epsilon: f64,

    #[arg(long, default_value_t = 0.01)]
    learning_rate: f64,

    /// Independent runs averaged per update budget.
    #[arg(long, default_value_t = 100)]
    num_runs: usize,

    #[arg(long, value_delimiter = ',', default_value = "100,1000,10000,20000,50000")]
    num_updates: Vec<usize>,

    #[arg(long, default_value_t = 1)]
    seed: u64,
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse();
    log::info!(
        "running {:?} on the service dog MDP, {} runs per budget",
        args.method,
        args.num_runs
    );
    let env = DogMdp::default();
    for &num_updates in args.num_updates.iter() {
        let tables = run_parallel(args.num_runs, args.seed, |_| {
            let mut env = DogMdp::default();
            let (discount, begin, end, lr) = (
                args.discount,
                args.begin_epsilon,
                args.end_epsilon,
                args.learning_rate,
            );
            let result = match args.method {
                Method::Sarsa => sarsa(&mut env, discount, begin, end, lr, num_updates),
                Method::QLearning => q_learning(&mut env, discount, begin, end, lr, num_updates),
            };
            result.map(|(_, q)| q)
        })
        .into_iter()
        .collect::<candle_core::Result<Vec<_>>>()?;
        let values = compute_vstar_from_qstar(&env, &average_tables(&tables));
        println!("State value function (number of updates={num_updates}):");
        println!("{}", format_state_value(&STATE_NAMES, &values));
    }
    Ok(())
}
