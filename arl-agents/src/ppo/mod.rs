pub mod hooks;

use crate::{ActorCriticLearningModule, HookResult, process_hook_result};
use arl_core::{
    agents::Agent,
    distributions::Distribution,
    policies::learning_modules::PolicyValuesLosses,
    tensors::{Logp, LogpDiff, PolicyLoss, ValueLoss, ValuesPred},
    utils::{
        mini_batching::{RolloutBatch, RolloutBatchIterator},
        rollout_buffer::{
            Advantages, Logps, Returns, RolloutBuffer, calculate_advantages_and_returns,
            rollout_logps,
        },
    },
};
use candle_core::{Device, Result, Tensor};
use std::ops::Deref;

pub struct PPOBatchData {
    pub logp: Logp,
    pub values_pred: ValuesPred,
    pub logp_diff: LogpDiff,
    pub ratio: Tensor,
}

pub trait PPOHooksTrait<D: Distribution, LM: ActorCriticLearningModule> {
    /// Called once per `learn`, after advantages and returns are computed.
    #[allow(clippy::ptr_arg)]
    fn before_learning_hook(
        &mut self,
        learning_module: &mut LM,
        distribution: &D,
        rollout_buffers: &mut Vec<RolloutBuffer>,
        advantages: &mut Advantages,
        returns: &mut Returns,
    ) -> Result<HookResult>;

    /// Called after every pass over the rollouts. `Continue` starts another epoch.
    fn rollout_hook(
        &mut self,
        learning_module: &mut LM,
        distribution: &D,
        rollout_buffers: &[RolloutBuffer],
    ) -> Result<HookResult>;

    /// Called before every optimizer step. May rewrite the losses; `Break` ends the current
    /// learning phase after the step.
    fn batch_hook(
        &mut self,
        learning_module: &mut LM,
        distribution: &D,
        rollout_batch: &RolloutBatch,
        policy_loss: &mut PolicyLoss,
        value_loss: &mut ValueLoss,
        data: &PPOBatchData,
    ) -> Result<HookResult>;
}

pub struct PPO<D: Distribution, LM: ActorCriticLearningModule> {
    pub distribution: D,
    pub learning_module: LM,
    pub hooks: Box<dyn PPOHooksTrait<D, LM>>,
    pub clip_range: f32,
    pub gamma: f32,
    pub lambda: f32,
    pub sample_size: usize,
    pub device: Device,
}

impl<D: Distribution, LM: ActorCriticLearningModule> PPO<D, LM> {
    // returns whether a hook asked to stop learning on this rollout
    fn batching_loop(&mut self, batch_iter: &mut RolloutBatchIterator) -> Result<bool> {
        for batch in batch_iter {
            let batch = batch?;
            let logp = Logp(
                self.distribution
                    .log_probs(&batch.observations, &batch.actions)?,
            );
            let values_pred =
                ValuesPred(self.learning_module.calculate_values(&batch.observations)?);
            let mut value_loss = ValueLoss(batch.returns.sub(&values_pred)?.sqr()?.mean_all()?);
            let logp_diff = LogpDiff((logp.deref() - &batch.logp_old)?);
            let ratio = logp_diff.exp()?;
            let clip_adv = (ratio.clamp(1. - self.clip_range, 1. + self.clip_range)?
                * &batch.advantages)?;
            let mut policy_loss = PolicyLoss(
                Tensor::minimum(&(&ratio * &batch.advantages)?, &clip_adv)?
                    .neg()?
                    .mean_all()?,
            );
            let ppo_data = PPOBatchData {
                logp,
                values_pred,
                logp_diff,
                ratio,
            };
            let hook_result = self.hooks.batch_hook(
                &mut self.learning_module,
                &self.distribution,
                &batch,
                &mut policy_loss,
                &mut value_loss,
                &ppo_data,
            )?;
            self.learning_module.update(PolicyValuesLosses {
                policy_loss,
                value_loss,
            })?;
            if hook_result == HookResult::Break {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn learning_loop(
        &mut self,
        rollouts: &[RolloutBuffer],
        advantages: &Advantages,
        returns: &Returns,
        logps: &Logps,
    ) -> Result<()> {
        loop {
            let mut batch_iter = RolloutBatchIterator::new(
                rollouts,
                advantages,
                returns,
                logps,
                self.sample_size,
                self.device.clone(),
            );
            if self.batching_loop(&mut batch_iter)? {
                return Ok(());
            }
            let rollout_hook_res =
                self.hooks
                    .rollout_hook(&mut self.learning_module, &self.distribution, rollouts);
            process_hook_result!(rollout_hook_res);
        }
    }
}

impl<D: Distribution + Clone + 'static, LM: ActorCriticLearningModule> Agent for PPO<D, LM> {
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
            &self.distribution,
            &mut rollouts,
            &mut advantages,
            &mut returns,
        );
        process_hook_result!(before_learning_hook_res);
        let logps = rollout_logps(&rollouts);
        self.learning_loop(&rollouts, &advantages, &returns, &logps)
    }
}
