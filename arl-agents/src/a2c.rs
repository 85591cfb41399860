use crate::{ActorCriticLearningModule, HookResult, process_hook_result};
use arl_core::{
    agents::Agent,
    distributions::Distribution,
    policies::learning_modules::PolicyValuesLosses,
    tensors::{PolicyLoss, ValueLoss},
    utils::{
        mini_batching::{RolloutBatch, RolloutBatchIterator},
        rollout_buffer::{
            Advantages, Returns, RolloutBuffer, calculate_advantages_and_returns, rollout_logps,
        },
    },
};
use candle_core::{Device, Result};

pub trait A2CHooks<LM: ActorCriticLearningModule> {
    #[allow(clippy::ptr_arg)]
    fn before_learning_hook(
        &mut self,
        learning_module: &mut LM,
        rollout_buffers: &mut Vec<RolloutBuffer>,
        advantages: &mut Advantages,
        returns: &mut Returns,
    ) -> Result<HookResult>;
}

/// Normalizes the advantages over the whole rollout.
pub struct DefaultA2CHooks;

impl<LM: ActorCriticLearningModule> A2CHooks<LM> for DefaultA2CHooks {
    fn before_learning_hook(
        &mut self,
        _learning_module: &mut LM,
        _rollout_buffers: &mut Vec<RolloutBuffer>,
        advantages: &mut Advantages,
        _returns: &mut Returns,
    ) -> Result<HookResult> {
        advantages.normalize();
        Ok(HookResult::Continue)
    }
}

/// Synchronous advantage actor-critic. One pass over every rollout; with `lambda = 1` the
/// advantages are the finite horizon returns minus the value estimate.
pub struct A2C<D: Distribution, LM: ActorCriticLearningModule> {
    pub distribution: D,
    pub learning_module: LM,
    pub hooks: Box<dyn A2CHooks<LM>>,
    pub device: Device,
    pub gamma: f32,
    pub lambda: f32,
    pub ent_coef: f32,
    pub value_coef: f32,
    /// `None` learns on the whole rollout at once.
    pub sample_size: Option<usize>,
}

impl<D: Distribution, LM: ActorCriticLearningModule> A2C<D, LM> {
    fn losses(&self, batch: &RolloutBatch) -> Result<PolicyValuesLosses> {
        let logps = self
            .distribution
            .log_probs(&batch.observations, &batch.actions)?;
        let values_pred = self.learning_module.calculate_values(&batch.observations)?;
        let mut policy_objective = batch.advantages.mul(&logps)?.mean_all()?;
        if self.ent_coef != 0. {
            let entropy = self.distribution.entropy(&batch.observations)?.mean_all()?;
            policy_objective = (policy_objective + entropy.affine(self.ent_coef as f64, 0.)?)?;
        }
        let value_loss = batch
            .returns
            .sub(&values_pred)?
            .sqr()?
            .mean_all()?
            .affine(0.5 * self.value_coef as f64, 0.)?;
        Ok(PolicyValuesLosses {
            policy_loss: PolicyLoss(policy_objective.neg()?),
            value_loss: ValueLoss(value_loss),
        })
    }

    fn batching_loop(&mut self, batch_iter: RolloutBatchIterator) -> Result<()> {
        for batch in batch_iter {
            let losses = self.losses(&batch?)?;
            self.learning_module.update(losses)?;
        }
        Ok(())
    }
}

impl<D: Distribution + Clone + 'static, LM: ActorCriticLearningModule> Agent for A2C<D, LM> {
    type Dist = D;

    fn distribution(&self) -> &Self::Dist {
        &self.distribution
    }

    fn learn(&mut self, mut rollouts: Vec<RolloutBuffer>) -> Result<()> {
        let (mut advantages, mut returns) = calculate_advantages_and_returns(
            &rollouts,
            &self.learning_module,
            self.gamma,
            self.lambda,
            &self.device,
        )?;
        let before_learning_hook_res = self.hooks.before_learning_hook(
            &mut self.learning_module,
            &mut rollouts,
            &mut advantages,
            &mut returns,
        );
        process_hook_result!(before_learning_hook_res);
        let logps = rollout_logps(&rollouts);
        let batch_iter = match self.sample_size {
            Some(sample_size) => RolloutBatchIterator::new(
                &rollouts,
                &advantages,
                &returns,
                &logps,
                sample_size,
                self.device.clone(),
            ),
            None => RolloutBatchIterator::full_batch(
                &rollouts,
                &advantages,
                &returns,
                &logps,
                self.device.clone(),
            ),
        };
        self.batching_loop(batch_iter)
    }
}
