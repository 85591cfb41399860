use arl_examples::init_logging;
use arl_tabular::{
    dog_mrp::{DogMrp, STATE_NAMES},
    dp::{compute_mrp_state_value, format_state_value},
};
use clap::Parser;

#[derive(Parser, Debug)]
struct Args {
    /// Discount factors to evaluate the MRP with.
    #[arg(long, value_delimiter = ',', default_value = "0,0.3,0.5,0.7,0.9,1")]
    discounts: Vec<f64>,
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse();
    let mrp = DogMrp::default();
    for discount in args.discounts {
        anyhow::ensure!(
            (0. ..=1.).contains(&discount),
            "discount {discount} is not in [0, 1]"
        );
        let values = compute_mrp_state_value(&mrp, discount);
        println!("State value function for service dog example MRP (discount={discount}):");
        println!("{}", format_state_value(&STATE_NAMES, &values));
    }
    Ok(())
}
