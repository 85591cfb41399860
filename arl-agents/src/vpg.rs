use crate::ActorCriticLearningModule;
use arl_core::{
    agents::Agent,
    distributions::Distribution,
    policies::learning_modules::PolicyValuesLosses,
    tensors::{PolicyLoss, ValueLoss},
    utils::{
        mini_batching::RolloutBatchIterator,
        rollout_buffer::{
            Advantages, Returns, RolloutBuffer, buffer_values, discounted_returns, rollout_logps,
        },
    },
};
use candle_core::{Device, Result};

/// REINFORCE. Monte Carlo returns, optionally minus a learned value baseline.
pub struct VPG<D: Distribution, LM: ActorCriticLearningModule> {
    pub distribution: D,
    pub learning_module: LM,
    pub device: Device,
    pub gamma: f32,
    pub baseline: bool,
}

impl<D: Distribution, LM: ActorCriticLearningModule> VPG<D, LM> {
    fn advantages_and_returns(&self, rollouts: &[RolloutBuffer]) -> Result<(Advantages, Returns)> {
        let mut advantages = Vec::with_capacity(rollouts.len());
        let mut returns = Vec::with_capacity(rollouts.len());
        for rb in rollouts {
            let values = buffer_values(rb, &self.learning_module, &self.device)?;
            // an unfinished tail is bootstrapped from the value of the last state
            let bootstrap = match rb.dones.last() {
                Some(false) => values[rb.len()],
                _ => 0.,
            };
            let ret = discounted_returns(&rb.rewards, &rb.dones, self.gamma, bootstrap);
            let adv = if self.baseline {
                ret.iter().zip(values.iter()).map(|(g, v)| g - v).collect()
            } else {
                ret.clone()
            };
            advantages.push(adv);
            returns.push(ret);
        }
        Ok((Advantages(advantages), Returns(returns)))
    }
}

impl<D: Distribution + Clone + 'static, LM: ActorCriticLearningModule> Agent for VPG<D, LM> {
    type Dist = D;

    fn distribution(&self) -> &Self::Dist {
        &self.distribution
    }

    fn learn(&mut self, rollouts: Vec<RolloutBuffer>) -> Result<()> {
        let (advantages, returns) = self.advantages_and_returns(&rollouts)?;
        let logps = rollout_logps(&rollouts);
        let batch_iter = RolloutBatchIterator::full_batch(
            &rollouts,
            &advantages,
            &returns,
            &logps,
            self.device.clone(),
        );
        for batch in batch_iter {
            let batch = batch?;
            let logps = self
                .distribution
                .log_probs(&batch.observations, &batch.actions)?;
            let policy_loss = PolicyLoss(batch.advantages.mul(&logps)?.mean_all()?.neg()?);
            let values_pred = self.learning_module.calculate_values(&batch.observations)?;
            let value_loss = if self.baseline {
                batch.returns.sub(&values_pred)?.sqr()?.mean_all()?
            } else {
                values_pred.mean_all()?.affine(0., 0.)?
            };
            self.learning_module.update(PolicyValuesLosses {
                policy_loss,
                value_loss: ValueLoss(value_loss),
            })?;
        }
        Ok(())
    }
}
