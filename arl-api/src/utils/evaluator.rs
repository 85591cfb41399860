use super::trackers::{Tracker, TrackerKind};
use arl_core::{
    distributions::{Distribution, greedy_on_device},
    env::Env,
    rng::random_seed,
};
use candle_core::Result;

/// Runs the most likely action of a policy in its own environment.
pub struct Evaluator<E: Env> {
    pub env: E,
}

impl<E: Env> Evaluator<E> {
    pub fn new(env: E) -> Self {
        Self { env }
    }

    /// Steps the environment `num_steps` times, starting from a fresh episode and resetting after
    /// every finished one. Each transition is fed to `trackers`.
    pub fn run<D: Distribution + ?Sized>(
        &mut self,
        distribution: &D,
        num_steps: usize,
        trackers: &mut [TrackerKind],
    ) -> Result<()> {
        let mut state = self.env.reset(random_seed())?;
        for _ in 0..num_steps {
            let action = greedy_on_device(distribution, &state)?;
            let snapshot = self.env.step(&action)?;
            let done = snapshot.done();
            for tracker in trackers.iter_mut() {
                if let Some(room) = snapshot.room {
                    tracker.visit_room(0, room);
                }
                tracker.step(0, snapshot.tracked_reward(), done);
            }
            state = if done {
                self.env.reset(random_seed())?
            } else {
                snapshot.state
            };
        }
        Ok(())
    }

    /// Returns of `n_episodes` full greedy episodes.
    pub fn episode_returns<D: Distribution + ?Sized>(
        &mut self,
        distribution: &D,
        n_episodes: usize,
    ) -> Result<Vec<f32>> {
        let mut returns = Vec::with_capacity(n_episodes);
        for _ in 0..n_episodes {
            let mut state = self.env.reset(random_seed())?;
            let mut episode_return = 0.;
            loop {
                let action = greedy_on_device(distribution, &state)?;
                let snapshot = self.env.step(&action)?;
                episode_return += snapshot.tracked_reward();
                if snapshot.done() {
                    break;
                }
                state = snapshot.state;
            }
            returns.push(episode_return);
        }
        Ok(returns)
    }
}
