pub mod dog_mdp;
pub mod dog_mrp;
pub mod dp;
pub mod linear_vfa;
pub mod runs;
pub mod td;
pub mod tile_coding;

/// A finite Markov reward process. The reward of a state is received when leaving it.
pub trait TabularMrp {
    fn num_states(&self) -> usize;

    fn is_terminal(&self, state: usize) -> bool;

    fn reward(&self, state: usize) -> f64;

    /// `(probability, next_state)` pairs.
    fn transitions(&self, state: usize) -> Vec<(f64, usize)>;

    fn state_name(&self, state: usize) -> String;
}

/// A finite MDP with a known model.
pub trait TabularMdp {
    fn num_states(&self) -> usize;

    fn num_actions(&self) -> usize;

    fn is_terminal(&self, state: usize) -> bool;

    fn legal_actions(&self, state: usize) -> Vec<usize>;

    /// `(probability, next_state, reward)` triples for taking `action` in `state`.
    fn dynamics(&self, state: usize, action: usize) -> Vec<(f64, usize, f64)>;

    fn state_name(&self, state: usize) -> String;

    fn action_name(&self, action: usize) -> String;
}

/// A step of an episodic tabular environment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub next_state: usize,
    pub reward: f64,
    pub terminated: bool,
    pub truncated: bool,
}

impl Transition {
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// Sample based interface used by the model free methods.
pub trait TabularEnv: TabularMdp {
    fn reset(&mut self) -> usize;

    fn step(&mut self, action: usize) -> candle_core::Result<Transition>;
}

/// State or state-action values, `q[state][action]`.
pub type QTable = Vec<Vec<f64>>;
