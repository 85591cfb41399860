use crate::{distributions::Distribution, utils::rollout_buffer::RolloutBuffer};
use candle_core::Result;

pub trait Agent {
    type Dist: Distribution + Clone + 'static;

    /// Retrieves the distribution the samplers act with
    fn distribution(&self) -> &Self::Dist;

    /// Instruments learning with the rollout buffers collected
    fn learn(&mut self, rollouts: Vec<RolloutBuffer>) -> Result<()>;
}
