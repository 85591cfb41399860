// Every thread owns its own generator. Actor threads reseed theirs from the pool seed so runs
// stay reproducible no matter which thread samples.

use rand::{Rng, SeedableRng, rngs::StdRng};
use std::cell::RefCell;

thread_local! {
    pub static RNG: RefCell<StdRng> = RefCell::new(StdRng::seed_from_u64(0));
}

pub fn seed_rng(seed: u64) {
    RNG.with_borrow_mut(|rng| *rng = StdRng::seed_from_u64(seed));
}

pub fn with_rng<T>(f: impl FnOnce(&mut StdRng) -> T) -> T {
    RNG.with_borrow_mut(f)
}

/// Draws a fresh environment seed from the thread local generator.
pub fn random_seed() -> u64 {
    RNG.with_borrow_mut(|rng| rng.random::<u64>())
}

#[cfg(test)]
mod test {
    use super::{random_seed, seed_rng};

    #[test]
    fn reseeding_repeats_the_sequence() {
        seed_rng(42);
        let first = (random_seed(), random_seed());
        seed_rng(42);
        let second = (random_seed(), random_seed());
        assert_eq!(first, second);
    }
}
