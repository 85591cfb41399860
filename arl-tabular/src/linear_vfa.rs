//! Linear value function approximation over tile coded features.

use crate::{td::epsilon_greedy, tile_coding::TileCoder};
use arl_core::{
    env::{Env, one_hot},
    rng::random_seed,
};
use candle_core::{Device, Result, Tensor};

fn observation_to_vec(observation: &Tensor) -> Result<Vec<f64>> {
    Ok(observation
        .flatten_all()?
        .to_vec1::<f32>()?
        .into_iter()
        .map(f64::from)
        .collect())
}

/// `q(s, a) = sum of the weights of the tiles active for (s, a)`.
#[derive(Debug, Clone)]
pub struct LinearQFunction {
    coder: TileCoder,
    weights: Vec<f64>,
    num_actions: usize,
    step_size: f64,
}

impl LinearQFunction {
    /// `learning_rate` is split evenly across the tilings.
    pub fn new(coder: TileCoder, num_actions: usize, learning_rate: f64) -> Self {
        let weights = vec![0.; coder.iht().size()];
        let step_size = learning_rate / coder.num_tilings() as f64;
        Self {
            coder,
            weights,
            num_actions,
            step_size,
        }
    }

    pub fn num_actions(&self) -> usize {
        self.num_actions
    }

    pub fn value(&mut self, state: &[f64], action: usize) -> f64 {
        self.coder
            .active_tiles(state, Some(action))
            .iter()
            .map(|t| self.weights[*t])
            .sum()
    }

    pub fn values(&mut self, state: &[f64]) -> Vec<f64> {
        (0..self.num_actions).map(|a| self.value(state, a)).collect()
    }

    /// Moves `q(state, action)` towards `target`.
    pub fn update(&mut self, state: &[f64], action: usize, target: f64) {
        let active = self.coder.active_tiles(state, Some(action));
        let estimate: f64 = active.iter().map(|t| self.weights[*t]).sum();
        let delta = target - estimate;
        for t in active {
            self.weights[t] += self.step_size * delta;
        }
    }
}

/// `v(s) = sum of the weights of the tiles active for s`.
#[derive(Debug, Clone)]
pub struct LinearVFunction {
    coder: TileCoder,
    weights: Vec<f64>,
    step_size: f64,
}

impl LinearVFunction {
    pub fn new(coder: TileCoder, learning_rate: f64) -> Self {
        let weights = vec![0.; coder.iht().size()];
        let step_size = learning_rate / coder.num_tilings() as f64;
        Self {
            coder,
            weights,
            step_size,
        }
    }

    pub fn value(&mut self, state: &[f64]) -> f64 {
        self.coder
            .active_tiles(state, None)
            .iter()
            .map(|t| self.weights[*t])
            .sum()
    }

    pub fn update(&mut self, state: &[f64], target: f64) {
        let active = self.coder.active_tiles(state, None);
        let estimate: f64 = active.iter().map(|t| self.weights[*t]).sum();
        let delta = target - estimate;
        for t in active {
            self.weights[t] += self.step_size * delta;
        }
    }
}

/// Episodic semi-gradient SARSA with an epsilon greedy behaviour policy. Returns the number of
/// steps of every episode.
pub fn semi_gradient_sarsa<E: Env>(
    env: &mut E,
    q: &mut LinearQFunction,
    discount: f64,
    epsilon: f64,
    num_episodes: usize,
) -> Result<Vec<usize>> {
    let num_actions = q.num_actions();
    let actions = (0..num_actions).collect::<Vec<_>>();
    let mut episode_lengths = Vec::with_capacity(num_episodes);
    for episode in 0..num_episodes {
        let mut state = observation_to_vec(&env.reset(random_seed())?)?;
        let mut action = epsilon_greedy(&q.values(&state), &actions, epsilon).unwrap_or(0);
        let mut steps = 0;
        loop {
            let snapshot = env.step(&one_hot(action, num_actions, &Device::Cpu)?)?;
            steps += 1;
            let next_state = observation_to_vec(&snapshot.state)?;
            let reward = snapshot.reward as f64;
            if snapshot.terminated {
                q.update(&state, action, reward);
                break;
            }
            let next_action = epsilon_greedy(&q.values(&next_state), &actions, epsilon).unwrap_or(0);
            let target = reward + discount * q.value(&next_state, next_action);
            q.update(&state, action, target);
            if snapshot.truncated {
                break;
            }
            state = next_state;
            action = next_action;
        }
        log::debug!("episode {episode} finished after {steps} steps");
        episode_lengths.push(steps);
    }
    Ok(episode_lengths)
}

/// Semi-gradient TD(0) evaluation of `policy`, which maps an observation to an action index.
pub fn semi_gradient_td0<E: Env, P: FnMut(&[f64]) -> usize>(
    env: &mut E,
    v: &mut LinearVFunction,
    mut policy: P,
    discount: f64,
    num_episodes: usize,
) -> Result<()> {
    let num_actions = env.env_description().action_size();
    for _ in 0..num_episodes {
        let mut state = observation_to_vec(&env.reset(random_seed())?)?;
        loop {
            let action = policy(&state);
            let snapshot = env.step(&one_hot(action, num_actions, &Device::Cpu)?)?;
            let next_state = observation_to_vec(&snapshot.state)?;
            let reward = snapshot.reward as f64;
            let target = if snapshot.terminated {
                reward
            } else {
                reward + discount * v.value(&next_state)
            };
            v.update(&state, target);
            if snapshot.done() {
                break;
            }
            state = next_state;
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::{LinearQFunction, LinearVFunction};
    use crate::tile_coding::TileCoder;

    #[test]
    fn repeated_updates_converge_to_target() {
        let coder = TileCoder::new(512, 8, 8, &[0.], &[1.]);
        let mut q = LinearQFunction::new(coder, 2, 0.5);
        for _ in 0..50 {
            q.update(&[0.3], 1, -3.);
        }
        assert!((q.value(&[0.3], 1) + 3.).abs() < 1e-3);
        assert_eq!(q.value(&[0.3], 0), 0.);
    }

    #[test]
    fn state_values_generalise_to_neighbours() {
        let coder = TileCoder::new(512, 8, 4, &[0.], &[1.]);
        let mut v = LinearVFunction::new(coder, 1.);
        v.update(&[0.5], 8.);
        assert!((v.value(&[0.5]) - 8.).abs() < 1e-9);
        let neighbour = v.value(&[0.52]);
        assert!(neighbour > 0. && neighbour <= 8.);
        assert!(v.value(&[0.99]) < 8.);
    }
}
