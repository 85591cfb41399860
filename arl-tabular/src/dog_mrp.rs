use crate::TabularMrp;

pub const STATE_NAMES: [&str; 6] = ["Room 1", "Room 2", "Room 3", "Outside", "Found item", "End"];
pub const END: usize = 5;

/// The service dog example: a dog walks through three rooms and the garden, looking for an item.
#[derive(Debug, Clone)]
pub struct DogMrp {
    transition_matrix: [[f64; 6]; 6],
    rewards: [f64; 6],
}

impl Default for DogMrp {
    fn default() -> Self {
        Self {
            transition_matrix: [
                [0.0, 1.0, 0.0, 0.0, 0.0, 0.0],
                [0.2, 0.0, 0.4, 0.4, 0.0, 0.0],
                [0.0, 0.2, 0.0, 0.0, 0.8, 0.0],
                [0.0, 0.2, 0.0, 0.8, 0.0, 0.0],
                [0.0, 0.0, 0.0, 0.0, 0.0, 1.0],
                [0.0, 0.0, 0.0, 0.0, 0.0, 1.0],
            ],
            rewards: [-2.0, -1.0, -1.0, 1.0, 10.0, 0.0],
        }
    }
}

impl TabularMrp for DogMrp {
    fn num_states(&self) -> usize {
        STATE_NAMES.len()
    }

    fn is_terminal(&self, state: usize) -> bool {
        state == END
    }

    fn reward(&self, state: usize) -> f64 {
        self.rewards[state]
    }

    fn transitions(&self, state: usize) -> Vec<(f64, usize)> {
        self.transition_matrix[state]
            .iter()
            .enumerate()
            .filter(|(_, p)| **p > 0.)
            .map(|(next, p)| (*p, next))
            .collect()
    }

    fn state_name(&self, state: usize) -> String {
        STATE_NAMES[state].to_owned()
    }
}
