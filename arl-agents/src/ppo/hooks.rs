use super::{PPOBatchData, PPOHooksTrait};
use crate::{ActorCriticLearningModule, HookResult};
use arl_core::{
    distributions::Distribution,
    tensors::{PolicyLoss, ValueLoss},
    utils::{
        mini_batching::RolloutBatch,
        rollout_buffer::{Advantages, Returns, RolloutBuffer},
    },
};
use candle_core::Result;

/// Hooks that never interfere: one epoch, losses left as they are.
pub struct EmptyPPOHooks;

impl<D: Distribution, LM: ActorCriticLearningModule> PPOHooksTrait<D, LM> for EmptyPPOHooks {
    fn before_learning_hook(
        &mut self,
        _learning_module: &mut LM,
        _distribution: &D,
        _rollout_buffers: &mut Vec<RolloutBuffer>,
        _advantages: &mut Advantages,
        _returns: &mut Returns,
    ) -> Result<HookResult> {
        Ok(HookResult::Continue)
    }

    fn rollout_hook(
        &mut self,
        _learning_module: &mut LM,
        _distribution: &D,
        _rollout_buffers: &[RolloutBuffer],
    ) -> Result<HookResult> {
        Ok(HookResult::Break)
    }

    fn batch_hook(
        &mut self,
        _learning_module: &mut LM,
        _distribution: &D,
        _rollout_batch: &RolloutBatch,
        _policy_loss: &mut PolicyLoss,
        _value_loss: &mut ValueLoss,
        _data: &PPOBatchData,
    ) -> Result<HookResult> {
        Ok(HookResult::Continue)
    }
}

/// Normalized advantages, `n_epochs` passes per rollout, entropy bonus, value coefficient and
/// an approximate KL early stop.
#[derive(Debug, Clone)]
pub struct DefaultPPOHooks {
    pub ent_coef: f32,
    pub vf_coef: f32,
    pub target_kl: Option<f32>,
    pub n_epochs: usize,
    current_epoch: usize,
}

impl Default for DefaultPPOHooks {
    fn default() -> Self {
        Self::new(10, 0., 0.5, None)
    }
}

impl DefaultPPOHooks {
    pub fn new(n_epochs: usize, ent_coef: f32, vf_coef: f32, target_kl: Option<f32>) -> Self {
        assert!(n_epochs > 0, "n_epochs must be positive");
        assert!(ent_coef >= 0., "ent_coef must be non negative");
        Self {
            ent_coef,
            vf_coef,
            target_kl,
            n_epochs,
            current_epoch: 1,
        }
    }

    pub fn current_epoch(&self) -> usize {
        self.current_epoch
    }
}

impl<D: Distribution, LM: ActorCriticLearningModule> PPOHooksTrait<D, LM> for DefaultPPOHooks {
    fn before_learning_hook(
        &mut self,
        _learning_module: &mut LM,
        _distribution: &D,
        _rollout_buffers: &mut Vec<RolloutBuffer>,
        advantages: &mut Advantages,
        _returns: &mut Returns,
    ) -> Result<HookResult> {
        self.current_epoch = 1;
        advantages.normalize();
        Ok(HookResult::Continue)
    }

    fn rollout_hook(
        &mut self,
        _learning_module: &mut LM,
        _distribution: &D,
        _rollout_buffers: &[RolloutBuffer],
    ) -> Result<HookResult> {
        if self.current_epoch >= self.n_epochs {
            Ok(HookResult::Break)
        } else {
            self.current_epoch += 1;
            Ok(HookResult::Continue)
        }
    }

    fn batch_hook(
        &mut self,
        _learning_module: &mut LM,
        distribution: &D,
        rollout_batch: &RolloutBatch,
        policy_loss: &mut PolicyLoss,
        value_loss: &mut ValueLoss,
        data: &PPOBatchData,
    ) -> Result<HookResult> {
        if self.ent_coef != 0. {
            let entropy = distribution
                .entropy(&rollout_batch.observations)?
                .mean_all()?;
            let entropy_loss = entropy.affine(-self.ent_coef as f64, 0.)?;
            *policy_loss = PolicyLoss(policy_loss.add(&entropy_loss)?);
        }
        *value_loss = ValueLoss(value_loss.affine(self.vf_coef as f64, 0.)?);
        let approx_kl = -(data.logp_diff.mean_all()?.to_scalar::<f32>()?);
        match self.target_kl {
            Some(target_kl) if approx_kl > 1.5 * target_kl => {
                log::debug!(
                    "early stop at epoch {} with approx kl {approx_kl:.4}",
                    self.current_epoch
                );
                Ok(HookResult::Break)
            }
            _ => Ok(HookResult::Continue),
        }
    }
}
