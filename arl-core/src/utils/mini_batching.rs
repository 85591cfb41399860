use super::rollout_buffer::{Advantages, Logps, Returns, RolloutBuffer};
use crate::rng::with_rng;
use candle_core::{Device, Result, Tensor};
use rand::seq::SliceRandom;

pub struct RolloutBatch {
    pub observations: Tensor,
    pub actions: Tensor,
    pub returns: Tensor,
    pub advantages: Tensor,
    pub logp_old: Tensor,
}

/// Shuffled mini-batches over every step of every buffer. The last batch may be smaller.
pub struct RolloutBatchIterator<'a> {
    rollouts: &'a [RolloutBuffer],
    advantages: &'a Advantages,
    returns: &'a Returns,
    logps: &'a Logps,
    indicies: Vec<(usize, usize)>,
    current: usize,
    sample_size: usize,
    device: Device,
}

impl<'a> RolloutBatchIterator<'a> {
    pub fn new(
        rollouts: &'a [RolloutBuffer],
        advantages: &'a Advantages,
        returns: &'a Returns,
        logps: &'a Logps,
        sample_size: usize,
        device: Device,
    ) -> Self {
        assert!(sample_size > 0, "sample_size must be positive");
        let mut indicies = rollouts
            .iter()
            .enumerate()
            .flat_map(|(i, rb)| (0..rb.len()).map(move |j| (i, j)))
            .collect::<Vec<_>>();
        with_rng(|rng| indicies.shuffle(rng));
        Self {
            rollouts,
            advantages,
            returns,
            logps,
            indicies,
            current: 0,
            sample_size,
            device,
        }
    }

    /// Yields every step once, in order, as a single batch.
    pub fn full_batch(
        rollouts: &'a [RolloutBuffer],
        advantages: &'a Advantages,
        returns: &'a Returns,
        logps: &'a Logps,
        device: Device,
    ) -> Self {
        let indicies = rollouts
            .iter()
            .enumerate()
            .flat_map(|(i, rb)| (0..rb.len()).map(move |j| (i, j)))
            .collect::<Vec<_>>();
        let sample_size = indicies.len().max(1);
        Self {
            rollouts,
            advantages,
            returns,
            logps,
            indicies,
            current: 0,
            sample_size,
            device,
        }
    }

    fn build_batch(&self, batch_indicies: &[(usize, usize)]) -> Result<RolloutBatch> {
        let mut states = Vec::with_capacity(batch_indicies.len());
        let mut actions = Vec::with_capacity(batch_indicies.len());
        let mut advantages = Vec::with_capacity(batch_indicies.len());
        let mut returns = Vec::with_capacity(batch_indicies.len());
        let mut logps = Vec::with_capacity(batch_indicies.len());
        for (rollout_idx, idx) in batch_indicies {
            let rb = &self.rollouts[*rollout_idx];
            states.push(&rb.states[*idx]);
            actions.push(&rb.actions[*idx]);
            advantages.push(self.advantages[*rollout_idx][*idx]);
            returns.push(self.returns[*rollout_idx][*idx]);
            logps.push(self.logps[*rollout_idx][*idx]);
        }
        let batch_size = batch_indicies.len();
        Ok(RolloutBatch {
            observations: Tensor::stack(&states, 0)?.to_device(&self.device)?,
            actions: Tensor::stack(&actions, 0)?.to_device(&self.device)?,
            returns: Tensor::from_vec(returns, batch_size, &self.device)?,
            advantages: Tensor::from_vec(advantages, batch_size, &self.device)?,
            logp_old: Tensor::from_vec(logps, batch_size, &self.device)?,
        })
    }
}

impl Iterator for RolloutBatchIterator<'_> {
    type Item = Result<RolloutBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current >= self.indicies.len() {
            return None;
        }
        let end = (self.current + self.sample_size).min(self.indicies.len());
        let batch = self.build_batch(&self.indicies[self.current..end]);
        self.current = end;
        Some(batch)
    }
}
