//! Dynamic programming on known models.

use crate::{QTable, TabularMdp, TabularMrp};
use std::fmt::Write;

/// `policy[state][action]` is the probability of taking `action` in `state`.
pub type Policy = Vec<Vec<f64>>;

const MAX_SWEEPS: usize = 1_000_000;

fn max_abs_diff(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs())
        .fold(0., f64::max)
}

/// Evaluates an MRP by sweeping the Bellman expectation equation until no state value moves by
/// more than 1e-10. Terminal states are worth zero.
pub fn compute_mrp_state_value<M: TabularMrp>(mrp: &M, discount: f64) -> Vec<f64> {
    assert!((0.0..=1.0).contains(&discount), "discount must lie in [0, 1]");
    let mut values = vec![0.; mrp.num_states()];
    for _ in 0..MAX_SWEEPS {
        let new_values = (0..mrp.num_states())
            .map(|s| {
                if mrp.is_terminal(s) {
                    return 0.;
                }
                let expected_next: f64 = mrp
                    .transitions(s)
                    .iter()
                    .map(|(p, next)| p * values[*next])
                    .sum();
                mrp.reward(s) + discount * expected_next
            })
            .collect::<Vec<_>>();
        let delta = max_abs_diff(&values, &new_values);
        values = new_values;
        if delta < 1e-10 {
            return values;
        }
    }
    log::warn!("MRP evaluation did not converge after {MAX_SWEEPS} sweeps");
    values
}

// expected one step return of `action` in `state` under `values`
fn action_value<M: TabularMdp>(mdp: &M, state: usize, action: usize, values: &[f64], discount: f64) -> f64 {
    mdp.dynamics(state, action)
        .iter()
        .map(|(p, next, reward)| p * (reward + discount * values[*next]))
        .sum()
}

pub fn uniform_random_policy<M: TabularMdp>(mdp: &M) -> Policy {
    (0..mdp.num_states())
        .map(|s| {
            let mut probs = vec![0.; mdp.num_actions()];
            let legal = mdp.legal_actions(s);
            for a in legal.iter() {
                probs[*a] = 1. / legal.len() as f64;
            }
            probs
        })
        .collect()
}

pub fn policy_evaluation<M: TabularMdp>(
    mdp: &M,
    policy: &Policy,
    discount: f64,
    delta_threshold: f64,
) -> Vec<f64> {
    let mut values = vec![0.; mdp.num_states()];
    for _ in 0..MAX_SWEEPS {
        let new_values = (0..mdp.num_states())
            .map(|s| {
                if mdp.is_terminal(s) {
                    return 0.;
                }
                mdp.legal_actions(s)
                    .into_iter()
                    .map(|a| policy[s][a] * action_value(mdp, s, a, &values, discount))
                    .sum()
            })
            .collect::<Vec<f64>>();
        let delta = max_abs_diff(&values, &new_values);
        values = new_values;
        if delta < delta_threshold {
            return values;
        }
    }
    log::warn!("policy evaluation did not converge after {MAX_SWEEPS} sweeps");
    values
}

fn greedy_action<M: TabularMdp>(mdp: &M, state: usize, values: &[f64], discount: f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for a in mdp.legal_actions(state) {
        let q = action_value(mdp, state, a, values, discount);
        if best.is_none_or(|(_, best_q)| q > best_q) {
            best = Some((a, q));
        }
    }
    best.map(|(a, _)| a)
}

/// Deterministic policy acting greedily with respect to `values`.
pub fn policy_improvement<M: TabularMdp>(mdp: &M, values: &[f64], discount: f64) -> Policy {
    (0..mdp.num_states())
        .map(|s| {
            let mut probs = vec![0.; mdp.num_actions()];
            if let Some(a) = greedy_action(mdp, s, values, discount) {
                probs[a] = 1.;
            }
            probs
        })
        .collect()
}

pub fn policy_iteration<M: TabularMdp>(mdp: &M, discount: f64, delta_threshold: f64) -> (Policy, Vec<f64>) {
    let mut policy = uniform_random_policy(mdp);
    loop {
        let values = policy_evaluation(mdp, &policy, discount, delta_threshold);
        let improved = policy_improvement(mdp, &values, discount);
        if improved == policy {
            return (policy, values);
        }
        policy = improved;
    }
}

pub fn value_iteration<M: TabularMdp>(mdp: &M, discount: f64, delta_threshold: f64) -> (Policy, Vec<f64>) {
    let mut values = vec![0.; mdp.num_states()];
    for _ in 0..MAX_SWEEPS {
        let new_values = (0..mdp.num_states())
            .map(|s| {
                greedy_action(mdp, s, &values, discount)
                    .filter(|_| !mdp.is_terminal(s))
                    .map(|a| action_value(mdp, s, a, &values, discount))
                    .unwrap_or(0.)
            })
            .collect::<Vec<_>>();
        let delta = max_abs_diff(&values, &new_values);
        values = new_values;
        if delta < delta_threshold {
            break;
        }
    }
    (policy_improvement(mdp, &values, discount), values)
}

/// `q[s][a]` for every legal action, zero elsewhere.
pub fn compute_q_from_v<M: TabularMdp>(mdp: &M, values: &[f64], discount: f64) -> QTable {
    (0..mdp.num_states())
        .map(|s| {
            let mut q = vec![0.; mdp.num_actions()];
            if !mdp.is_terminal(s) {
                for a in mdp.legal_actions(s) {
                    q[a] = action_value(mdp, s, a, values, discount);
                }
            }
            q
        })
        .collect()
}

/// `v(s) = max_a q(s, a)` over the legal actions, zero for terminal states.
pub fn compute_vstar_from_qstar<M: TabularMdp>(mdp: &M, q: &QTable) -> Vec<f64> {
    (0..mdp.num_states())
        .map(|s| {
            if mdp.is_terminal(s) {
                return 0.;
            }
            mdp.legal_actions(s)
                .into_iter()
                .map(|a| q[s][a])
                .fold(f64::NEG_INFINITY, f64::max)
        })
        .map(|v| if v.is_finite() { v } else { 0. })
        .collect()
}

pub fn format_state_value<N: AsRef<str>>(state_names: &[N], values: &[f64]) -> String {
    let mut out = String::new();
    for (name, value) in state_names.iter().zip(values) {
        let _ = writeln!(out, "  {:<12} {:>8.2}", name.as_ref(), value);
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{dog_mdp::DogMdp, dog_mrp::DogMrp};

    #[test]
    fn myopic_mrp_values_are_the_rewards() {
        let values = compute_mrp_state_value(&DogMrp::default(), 0.);
        assert_eq!(values, vec![-2., -1., -1., 1., 10., 0.]);
    }

    #[test]
    fn mrp_values_satisfy_bellman_equation() {
        let mrp = DogMrp::default();
        for discount in [0.3, 0.5, 0.9, 1.] {
            let v = compute_mrp_state_value(&mrp, discount);
            for s in 0..mrp.num_states() {
                if mrp.is_terminal(s) {
                    continue;
                }
                let expected: f64 = mrp.transitions(s).iter().map(|(p, n)| p * v[*n]).sum();
                assert!((v[s] - (mrp.reward(s) + discount * expected)).abs() < 1e-8);
            }
        }
    }

    #[test]
    fn dog_mdp_optimal_values() {
        let mdp = DogMdp::default();
        let (policy, v) = value_iteration(&mdp, 0.9, 1e-10);
        let expected = [6.2, 8., 10., 6.2, 0.];
        for (v, e) in v.iter().zip(expected) {
            assert!((v - e).abs() < 1e-6, "{v} != {e}");
        }
        assert_eq!(policy[2][crate::dog_mdp::SEARCH], 1.);
        let (pi_policy, pi_v) = policy_iteration(&mdp, 0.9, 1e-10);
        assert_eq!(pi_policy, policy);
        assert!(max_abs_diff(&pi_v, &v) < 1e-6);
    }

    #[test]
    fn vstar_from_qstar_recovers_values() {
        let mdp = DogMdp::default();
        let (_, v) = value_iteration(&mdp, 0.9, 1e-10);
        let q = compute_q_from_v(&mdp, &v, 0.9);
        let recovered = compute_vstar_from_qstar(&mdp, &q);
        assert!(max_abs_diff(&recovered, &v) < 1e-6);
        let text = format_state_value(&crate::dog_mdp::STATE_NAMES, &recovered);
        assert!(text.contains("Room 3"));
        assert!(text.contains("10.00"));
    }
}
