use anyhow::Result;
use arl_core::rng::seed_rng;
use arl_gym::{classic_control::mountain_car::MountainCar, wrappers::time_limit::TimeLimit};
use arl_tabular::{
    dog_mdp::DogMdp,
    dp::{compute_vstar_from_qstar, value_iteration},
    linear_vfa::{LinearQFunction, LinearVFunction, semi_gradient_sarsa, semi_gradient_td0},
    runs::{average_tables, run_parallel},
    td::sarsa,
    tile_coding::TileCoder,
};

fn mountain_car_coder() -> TileCoder {
    let (low, high) = MountainCar::bounds();
    let low = low.map(f64::from);
    let high = high.map(f64::from);
    TileCoder::new(4096, 8, 8, &low, &high)
}

#[test]
fn semi_gradient_sarsa_shortens_episodes() -> Result<()> {
    seed_rng(0);
    let mut env = TimeLimit::new(MountainCar::default(), 1000);
    let mut q = LinearQFunction::new(mountain_car_coder(), 3, 0.5);
    let lengths = semi_gradient_sarsa(&mut env, &mut q, 1., 0., 100)?;
    let first: f64 = lengths[..10].iter().sum::<usize>() as f64 / 10.;
    let last: f64 = lengths[90..].iter().sum::<usize>() as f64 / 10.;
    assert!(last < first, "first {first} last {last}");
    Ok(())
}

#[test]
fn td0_values_are_negative_step_counts() -> Result<()> {
    seed_rng(1);
    let mut env = TimeLimit::new(MountainCar::default(), 200);
    let mut v = LinearVFunction::new(mountain_car_coder(), 0.1);
    // push along the velocity
    semi_gradient_td0(&mut env, &mut v, |s| if s[1] < 0. { 0 } else { 2 }, 1., 50)?;
    let start_value = v.value(&[-0.5, 0.]);
    assert!(start_value < 0.);
    assert!(start_value > -200.);
    Ok(())
}

#[test]
fn averaged_sarsa_approaches_optimal_values() -> Result<()> {
    let results = run_parallel(8, 0, |_| {
        let mut env = DogMdp::default();
        sarsa(&mut env, 0.9, 1.0, 0.01, 0.1, 10_000).map(|(_, q)| q)
    })
    .into_iter()
    .collect::<candle_core::Result<Vec<_>>>()?;
    let env = DogMdp::default();
    let v = compute_vstar_from_qstar(&env, &average_tables(&results));
    let (_, v_star) = value_iteration(&env, 0.9, 1e-10);
    // room 3 is visited often enough to be accurate
    assert!((v[2] - v_star[2]).abs() < 1.);
    Ok(())
}
