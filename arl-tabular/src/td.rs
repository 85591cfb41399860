//! Model free control with temporal difference updates.

use crate::{QTable, TabularEnv};
use arl_core::{rng::with_rng, utils::schedule::LinearSchedule};
use candle_core::Result;
use rand::{Rng, seq::IndexedRandom};

pub fn argmax_legal(q: &[f64], legal_actions: &[usize]) -> Option<usize> {
    let best = legal_actions
        .iter()
        .map(|a| q[*a])
        .fold(f64::NEG_INFINITY, f64::max);
    let best_actions = legal_actions
        .iter()
        .copied()
        .filter(|a| q[*a] == best)
        .collect::<Vec<_>>();
    // ties are broken at random
    with_rng(|rng| best_actions.choose(rng).copied())
}

pub fn epsilon_greedy(q: &[f64], legal_actions: &[usize], epsilon: f64) -> Option<usize> {
    let explore = with_rng(|rng| rng.random::<f64>() < epsilon);
    if explore {
        with_rng(|rng| legal_actions.choose(rng).copied())
    } else {
        argmax_legal(q, legal_actions)
    }
}

/// Greedy deterministic policy read off a Q table, `None` for states without legal actions.
pub fn greedy_policy<E: TabularEnv>(env: &E, q: &QTable) -> Vec<Option<usize>> {
    (0..env.num_states())
        .map(|s| {
            let legal = env.legal_actions(s);
            legal
                .iter()
                .copied()
                .max_by(|a, b| q[s][*a].total_cmp(&q[s][*b]))
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
enum TdTarget {
    Sarsa,
    QLearning,
}

fn td_control<E: TabularEnv>(
    env: &mut E,
    target: TdTarget,
    discount: f64,
    begin_epsilon: f64,
    end_epsilon: f64,
    learning_rate: f64,
    num_updates: usize,
) -> Result<(Vec<Option<usize>>, QTable)> {
    assert!((0.0..=1.0).contains(&discount), "discount must lie in [0, 1]");
    assert!(
        (0.0..=1.0).contains(&begin_epsilon) && (0.0..=1.0).contains(&end_epsilon),
        "epsilon must lie in [0, 1]"
    );
    assert!(learning_rate > 0. && learning_rate <= 1., "learning rate must lie in (0, 1]");
    assert!(num_updates > 0, "num_updates must be positive");

    let mut q: QTable = vec![vec![0.; env.num_actions()]; env.num_states()];
    let schedule = LinearSchedule::new(begin_epsilon, end_epsilon, 0, num_updates);
    let mut t = 0;
    while t < num_updates {
        let mut state = env.reset();
        let mut action = epsilon_greedy(&q[state], &env.legal_actions(state), schedule.value(t));
        while let Some(a) = action {
            let transition = env.step(a)?;
            let next_state = transition.next_state;
            let next_legal = env.legal_actions(next_state);
            let next_action = epsilon_greedy(&q[next_state], &next_legal, schedule.value(t));
            let bootstrap = if transition.terminated {
                0.
            } else {
                match target {
                    TdTarget::Sarsa => next_action.map_or(0., |na| q[next_state][na]),
                    TdTarget::QLearning => argmax_legal(&q[next_state], &next_legal)
                        .map_or(0., |na| q[next_state][na]),
                }
            };
            let td_target = transition.reward + discount * bootstrap;
            q[state][a] += learning_rate * (td_target - q[state][a]);
            t += 1;
            if transition.done() || t >= num_updates {
                break;
            }
            state = next_state;
            action = next_action;
        }
    }
    Ok((greedy_policy(env, &q), q))
}

/// On-policy TD control. Epsilon decays linearly from `begin_epsilon` to `end_epsilon` over
/// `num_updates` updates. Returns the greedy policy and the learned Q table.
pub fn sarsa<E: TabularEnv>(
    env: &mut E,
    discount: f64,
    begin_epsilon: f64,
    end_epsilon: f64,
    learning_rate: f64,
    num_updates: usize,
) -> Result<(Vec<Option<usize>>, QTable)> {
    td_control(
        env,
        TdTarget::Sarsa,
        discount,
        begin_epsilon,
        end_epsilon,
        learning_rate,
        num_updates,
    )
}

/// Off-policy TD control, bootstrapping from the greedy next action.
pub fn q_learning<E: TabularEnv>(
    env: &mut E,
    discount: f64,
    begin_epsilon: f64,
    end_epsilon: f64,
    learning_rate: f64,
    num_updates: usize,
) -> Result<(Vec<Option<usize>>, QTable)> {
    td_control(
        env,
        TdTarget::QLearning,
        discount,
        begin_epsilon,
        end_epsilon,
        learning_rate,
        num_updates,
    )
}
