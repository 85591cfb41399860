use crate::policies::ValueFunction;
use candle_core::{Device, Result, Tensor};
use derive_more::{Deref, DerefMut};

/// Trajectory of a single environment. `states` holds one more element than the other vectors:
/// the state reached after the last recorded step, used to bootstrap the value estimate.
#[derive(Debug, Default, Clone)]
pub struct RolloutBuffer {
    pub states: Vec<Tensor>,
    pub actions: Vec<Tensor>,
    pub rewards: Vec<f32>,
    pub dones: Vec<bool>,
    pub logps: Vec<f32>,
    // unclipped rewards, only used for statistics
    pub raw_rewards: Vec<f32>,
    // room reached by each step, when the env reports one
    pub rooms: Vec<Option<usize>>,
}

impl RolloutBuffer {
    pub fn push_step(&mut self, state: Tensor, action: Tensor, reward: f32, done: bool, logp: f32) {
        self.states.push(state);
        self.actions.push(action);
        self.rewards.push(reward);
        self.dones.push(done);
        self.logps.push(logp);
        self.raw_rewards.push(reward);
        self.rooms.push(None);
    }

    pub fn set_room(&mut self, room: Option<usize>) {
        if let Some(last) = self.rooms.last_mut() {
            *last = room;
        }
    }

    pub fn set_raw_reward(&mut self, raw_reward: f32) {
        if let Some(last) = self.raw_rewards.last_mut() {
            *last = raw_reward;
        }
    }

    pub fn set_last_state(&mut self, state: Tensor) {
        self.states.push(state);
    }

    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    pub fn num_episodes(&self) -> usize {
        self.dones.iter().filter(|d| **d).count()
    }

    /// Stacks the observations that have an action attached, dropping the bootstrap state.
    pub fn stacked_states(&self) -> Result<Tensor> {
        Tensor::stack(&self.states[..self.len()], 0)
    }

    /// Stacks the observations reached after every step.
    pub fn stacked_next_states(&self) -> Result<Tensor> {
        Tensor::stack(&self.states[1..], 0)
    }
}

#[derive(Debug, Clone, Deref, DerefMut)]
pub struct Advantages(pub Vec<Vec<f32>>);

#[derive(Debug, Clone, Deref, DerefMut)]
pub struct Returns(pub Vec<Vec<f32>>);

#[derive(Debug, Clone, Deref, DerefMut)]
pub struct Logps(pub Vec<Vec<f32>>);

impl Advantages {
    /// Shifts and scales all advantages, across every buffer, to zero mean and unit std.
    pub fn normalize(&mut self) {
        let count = self.0.iter().map(|adv| adv.len()).sum::<usize>();
        if count == 0 {
            log::warn!("Cannot normalize empty advantages batch");
            return;
        }
        let mean = self.0.iter().flatten().sum::<f32>() / count as f32;
        let variance = self
            .0
            .iter()
            .flatten()
            .map(|x| (*x - mean).powi(2))
            .sum::<f32>()
            / count as f32;
        let std = variance.sqrt() + 1e-8;
        for x in self.0.iter_mut().flatten() {
            *x = (*x - mean) / std;
        }
    }

    /// Elementwise `self_coef * self + other_coef * other`.
    pub fn combine(&self, self_coef: f32, other: &Advantages, other_coef: f32) -> Advantages {
        Advantages(
            self.0
                .iter()
                .zip(other.0.iter())
                .map(|(a, b)| {
                    a.iter()
                        .zip(b.iter())
                        .map(|(a, b)| self_coef * a + other_coef * b)
                        .collect()
                })
                .collect(),
        )
    }
}

/// Discounted returns of a reward sequence. Accumulation restarts at every `done`, and the
/// return of the open tail is bootstrapped with `bootstrap`.
pub fn discounted_returns(rewards: &[f32], dones: &[bool], gamma: f32, bootstrap: f32) -> Vec<f32> {
    let mut returns = vec![0.; rewards.len()];
    let mut g_t = bootstrap;
    for i in (0..rewards.len()).rev() {
        if dones[i] {
            g_t = 0.;
        }
        g_t = rewards[i] + gamma * g_t;
        returns[i] = g_t;
    }
    returns
}

/// Generalized advantage estimation. `values` has one more entry than `rewards`, the last one
/// being the estimate of the state reached after the final step. With `lambda = 1` this is the
/// finite horizon advantage `G_t - V(s_t)`.
pub fn gae(
    rewards: &[f32],
    values: &[f32],
    dones: &[bool],
    gamma: f32,
    lambda: f32,
) -> (Vec<f32>, Vec<f32>) {
    let total_steps = rewards.len();
    debug_assert_eq!(values.len(), total_steps + 1);
    let mut advantages: Vec<f32> = vec![0.; total_steps];
    let mut returns: Vec<f32> = vec![0.; total_steps];
    let mut last_gae_lam: f32 = 0.;
    for i in (0..total_steps).rev() {
        let next_non_terminal = if dones[i] {
            last_gae_lam = 0.;
            0f32
        } else {
            1.
        };
        let delta = rewards[i] + next_non_terminal * gamma * values[i + 1] - values[i];
        last_gae_lam = delta + next_non_terminal * gamma * lambda * last_gae_lam;
        advantages[i] = last_gae_lam;
        returns[i] = last_gae_lam + values[i];
    }
    (advantages, returns)
}

/// Values of every state in `buffer`, the bootstrap state included. The states are moved to
/// `device`, where the value function lives.
pub fn buffer_values<V: ValueFunction>(
    buffer: &RolloutBuffer,
    value_func: &V,
    device: &Device,
) -> Result<Vec<f32>> {
    let states = Tensor::stack(&buffer.states, 0)?.to_device(device)?;
    value_func.calculate_values(&states)?.detach().to_vec1()
}

pub fn calculate_advantages_and_returns<V: ValueFunction>(
    rollouts: &[RolloutBuffer],
    value_func: &V,
    gamma: f32,
    lambda: f32,
    device: &Device,
) -> Result<(Advantages, Returns)> {
    let mut advantages = Vec::with_capacity(rollouts.len());
    let mut returns = Vec::with_capacity(rollouts.len());
    for buffer in rollouts {
        let values = buffer_values(buffer, value_func, device)?;
        let (adv, ret) = gae(&buffer.rewards, &values, &buffer.dones, gamma, lambda);
        advantages.push(adv);
        returns.push(ret);
    }
    Ok((Advantages(advantages), Returns(returns)))
}

pub fn rollout_logps(rollouts: &[RolloutBuffer]) -> Logps {
    Logps(rollouts.iter().map(|rb| rb.logps.clone()).collect())
}

#[cfg(test)]
mod test {
    use super::{Advantages, discounted_returns, gae};

    #[test]
    fn discounted_return_of_short_trajectory() {
        let returns = discounted_returns(&[1., 1., 1.], &[false, false, true], 0.9, 0.);
        let expected = [2.71f32, 1.9, 1.];
        for (r, e) in returns.iter().zip(expected) {
            assert!((r - e).abs() < 1e-6, "{r} != {e}");
        }
    }

    #[test]
    fn discounted_returns_restart_after_done_and_bootstrap_the_tail() {
        let returns = discounted_returns(&[1., 2., 3.], &[true, false, false], 0.5, 4.);
        assert_eq!(returns, vec![1., 2. + 0.5 * (3. + 0.5 * 4.), 3. + 0.5 * 4.]);
    }

    #[test]
    fn gae_with_unit_lambda_matches_monte_carlo_advantage() {
        let rewards = [1., 0., 2.];
        let values = [0.5, 0.25, 1., 3.];
        let dones = [false, false, false];
        let gamma = 0.9;
        let (adv, ret) = gae(&rewards, &values, &dones, gamma, 1.);
        let mc = discounted_returns(&rewards, &dones, gamma, values[3]);
        for i in 0..3 {
            assert!((ret[i] - mc[i]).abs() < 1e-5);
            assert!((adv[i] - (mc[i] - values[i])).abs() < 1e-5);
        }
    }

    #[test]
    fn gae_with_zero_lambda_is_td_error() {
        let (adv, _) = gae(&[1., 1.], &[0.5, 0.5, 10.], &[false, true], 0.9, 0.);
        assert!((adv[0] - (1. + 0.9 * 0.5 - 0.5)).abs() < 1e-6);
        // a terminal step does not bootstrap
        assert!((adv[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn normalized_advantages_have_zero_mean_unit_std() {
        let mut advantages = Advantages(vec![vec![1., 2., 3.], vec![4.]]);
        advantages.normalize();
        let flat: Vec<f32> = advantages.iter().flatten().copied().collect();
        let mean = flat.iter().sum::<f32>() / 4.;
        let var = flat.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / 4.;
        assert!(mean.abs() < 1e-6);
        assert!((var - 1.).abs() < 1e-4);
    }
}
