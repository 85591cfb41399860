pub mod cartpole;
pub mod mountain_car;
pub mod pendulum;

use rand::{Rng, SeedableRng, rngs::StdRng};

pub(crate) fn uniform(rng: &mut StdRng, low: f32, high: f32) -> f32 {
    rng.random_range(low..high)
}

pub(crate) fn seeded(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}
