use crate::{TabularEnv, TabularMdp, Transition};
use arl_core::rng::with_rng;
use candle_core::{Error, Result};
use rand::Rng;

pub const STATE_NAMES: [&str; 5] = ["Room 1", "Room 2", "Room 3", "Outside", "Found item"];
pub const ACTION_NAMES: [&str; 6] = [
    "go_room1",
    "go_room2",
    "go_room3",
    "go_outside",
    "go_inside",
    "search",
];

pub const ROOM1: usize = 0;
pub const ROOM2: usize = 1;
pub const ROOM3: usize = 2;
pub const OUTSIDE: usize = 3;
pub const FOUND_ITEM: usize = 4;

pub const GO_ROOM1: usize = 0;
pub const GO_ROOM2: usize = 1;
pub const GO_ROOM3: usize = 2;
pub const GO_OUTSIDE: usize = 3;
pub const GO_INSIDE: usize = 4;
pub const SEARCH: usize = 5;

/// The service dog MDP. Moving costs -1, staying outside is free, searching room 3 finds the
/// item (+10) and ends the episode. Episodes are truncated after `max_episode_steps`.
#[derive(Debug, Clone)]
pub struct DogMdp {
    max_episode_steps: usize,
    state: usize,
    steps: usize,
}

impl Default for DogMdp {
    fn default() -> Self {
        Self::new(100)
    }
}

impl DogMdp {
    pub fn new(max_episode_steps: usize) -> Self {
        Self {
            max_episode_steps,
            state: ROOM1,
            steps: 0,
        }
    }
}

impl TabularMdp for DogMdp {
    fn num_states(&self) -> usize {
        STATE_NAMES.len()
    }

    fn num_actions(&self) -> usize {
        ACTION_NAMES.len()
    }

    fn is_terminal(&self, state: usize) -> bool {
        state == FOUND_ITEM
    }

    fn legal_actions(&self, state: usize) -> Vec<usize> {
        match state {
            ROOM1 => vec![GO_ROOM2],
            ROOM2 => vec![GO_ROOM1, GO_ROOM3, GO_OUTSIDE],
            ROOM3 => vec![GO_ROOM2, SEARCH],
            OUTSIDE => vec![GO_OUTSIDE, GO_INSIDE],
            _ => vec![],
        }
    }

    fn dynamics(&self, state: usize, action: usize) -> Vec<(f64, usize, f64)> {
        match (state, action) {
            (ROOM1, GO_ROOM2) => vec![(1., ROOM2, -1.)],
            (ROOM2, GO_ROOM1) => vec![(1., ROOM1, -1.)],
            (ROOM2, GO_ROOM3) => vec![(1., ROOM3, -1.)],
            (ROOM2, GO_OUTSIDE) => vec![(1., OUTSIDE, -1.)],
            (ROOM3, GO_ROOM2) => vec![(1., ROOM2, -1.)],
            (ROOM3, SEARCH) => vec![(1., FOUND_ITEM, 10.)],
            (OUTSIDE, GO_OUTSIDE) => vec![(1., OUTSIDE, 0.)],
            (OUTSIDE, GO_INSIDE) => vec![(1., ROOM2, -1.)],
            _ => vec![],
        }
    }

    fn state_name(&self, state: usize) -> String {
        STATE_NAMES[state].to_owned()
    }

    fn action_name(&self, action: usize) -> String {
        ACTION_NAMES[action].to_owned()
    }
}

impl TabularEnv for DogMdp {
    fn reset(&mut self) -> usize {
        self.state = ROOM1;
        self.steps = 0;
        self.state
    }

    fn step(&mut self, action: usize) -> Result<Transition> {
        if self.is_terminal(self.state) {
            return Err(Error::Msg("episode is over, call reset".into()));
        }
        let outcomes = self.dynamics(self.state, action);
        if outcomes.is_empty() {
            return Err(Error::Msg(format!(
                "{} is not legal in {}",
                self.action_name(action),
                self.state_name(self.state)
            )));
        }
        let sample: f64 = with_rng(|rng| rng.random());
        let mut cumulative = 0.;
        let mut outcome = outcomes[outcomes.len() - 1];
        for candidate in outcomes {
            cumulative += candidate.0;
            if sample < cumulative {
                outcome = candidate;
                break;
            }
        }
        let (_, next_state, reward) = outcome;
        self.state = next_state;
        self.steps += 1;
        let terminated = self.is_terminal(next_state);
        Ok(Transition {
            next_state,
            reward,
            terminated,
            truncated: !terminated && self.steps >= self.max_episode_steps,
        })
    }
}
