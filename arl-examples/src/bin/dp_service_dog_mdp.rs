use arl_examples::init_logging;
use arl_tabular::{
    TabularMdp,
    dog_mdp::{ACTION_NAMES, DogMdp, STATE_NAMES},
    dp::{Policy, format_state_value, policy_iteration, value_iteration},
    td::argmax_legal,
};
use clap::Parser;

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, default_value_t = 0.9)]
    discount: f64,

    /// Sweeps stop once no state value moves by more than this.
    #[arg(long, default_value_t = 1e-10)]
    delta_threshold: f64,
}

fn format_policy(mdp: &DogMdp, policy: &Policy) -> String {
    let mut out = String::new();
    for (state, probs) in policy.iter().enumerate() {
        let action = argmax_legal(probs, &mdp.legal_actions(state))
            .map_or("-", |action| ACTION_NAMES[action]);
        out.push_str(&format!("  {:<12} {}\n", STATE_NAMES[state], action));
    }
    out
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse();
    anyhow::ensure!(
        (0. ..=1.).contains(&args.discount),
        "discount must be in [0, 1]"
    );
    let mdp = DogMdp::default();

    let (policy, values) = policy_iteration(&mdp, args.discount, args.delta_threshold);
    println!("Policy iteration (discount={}):", args.discount);
    println!("{}", format_state_value(&STATE_NAMES, &values));
    println!("{}", format_policy(&mdp, &policy));

    let (policy, values) = value_iteration(&mdp, args.discount, args.delta_threshold);
    println!("Value iteration (discount={}):", args.discount);
    println!("{}", format_state_value(&STATE_NAMES, &values));
    println!("{}", format_policy(&mdp, &policy));
    Ok(())
}
