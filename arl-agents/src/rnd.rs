//! Random network distillation. A fixed, randomly initialised target network embeds the next
//! observation and a predictor network learns to reproduce the embedding. The prediction error
//! is large on observations the agent rarely sees and serves as an intrinsic reward.

use crate::{
    ActorCriticLearningModule, HookResult,
    ppo::{PPOBatchData, PPOHooksTrait, hooks::DefaultPPOHooks},
};
use arl_core::{
    distributions::Distribution,
    policies::{OptimizerWithMaxGrad, ValueFunction},
    rng::with_rng,
    tensors::{PolicyLoss, ValueLoss},
    thread_safe_sequential::{
        ThreadSafeSequential, build_conv_net, build_conv_net_with_scale, build_sequential,
    },
    utils::{
        mini_batching::RolloutBatch,
        rollout_buffer::{Advantages, Returns, RolloutBuffer, buffer_values, gae},
        running_mean::{RewardForwardFilter, RunningMeanStd},
    },
};
use candle_core::{DType, Device, Error, Result, Tensor};
use candle_nn::{Module, VarBuilder, VarMap};
use rand::Rng;

pub struct Rnd {
    target: ThreadSafeSequential,
    predictor: ThreadSafeSequential,
    predictor_optimizer: OptimizerWithMaxGrad,
    obs_rms: RunningMeanStd,
    obs_clip: f32,
    update_proportion: f32,
    device: Device,
}

impl Rnd {
    pub fn new(
        target: ThreadSafeSequential,
        predictor: ThreadSafeSequential,
        predictor_optimizer: OptimizerWithMaxGrad,
        observation_shape: &[usize],
        update_proportion: f32,
        device: Device,
    ) -> Result<Self> {
        assert!(
            update_proportion > 0. && update_proportion <= 1.,
            "update_proportion must be in (0, 1]"
        );
        Ok(Self {
            target,
            predictor,
            predictor_optimizer,
            obs_rms: RunningMeanStd::new(observation_shape, device.clone())?,
            obs_clip: 5.,
            update_proportion,
            device,
        })
    }

    /// MLP target and predictor over flat observations. The target's variables live in a varmap
    /// no optimizer ever sees.
    pub fn mlp(
        observation_size: usize,
        hidden: &[usize],
        embedding_size: usize,
        lr: f64,
        update_proportion: f32,
        device: Device,
    ) -> Result<Self> {
        let layers = [hidden, &[embedding_size][..]].concat();
        let target_varmap = VarMap::new();
        let target_vb = VarBuilder::from_varmap(&target_varmap, DType::F32, &device);
        let target = build_sequential(observation_size, &layers, &target_vb, "rnd_target")?;
        let predictor_varmap = VarMap::new();
        let predictor_vb = VarBuilder::from_varmap(&predictor_varmap, DType::F32, &device);
        let predictor =
            build_sequential(observation_size, &layers, &predictor_vb, "rnd_predictor")?;
        let predictor_optimizer = OptimizerWithMaxGrad::adam(predictor_varmap, lr, None)?;
        Self::new(
            target,
            predictor,
            predictor_optimizer,
            &[observation_size],
            update_proportion,
            device,
        )
    }

    /// Conv target and predictor for `[C, H, W]` pixel observations. The nets see observations
    /// after the running normalisation, so the pixel scaling of the Atari body is left out.
    pub fn conv(
        observation_shape: &[usize],
        embedding_size: usize,
        lr: f64,
        update_proportion: f32,
        device: Device,
    ) -> Result<Self> {
        let head = [embedding_size];
        let target_varmap = VarMap::new();
        let target_vb = VarBuilder::from_varmap(&target_varmap, DType::F32, &device);
        let target =
            build_conv_net_with_scale(observation_shape, &head, &target_vb, "rnd_target", 1.)?;
        let predictor_varmap = VarMap::new();
        let predictor_vb = VarBuilder::from_varmap(&predictor_varmap, DType::F32, &device);
        let predictor = build_conv_net_with_scale(
            observation_shape,
            &head,
            &predictor_vb,
            "rnd_predictor",
            1.,
        )?;
        let predictor_optimizer = OptimizerWithMaxGrad::adam(predictor_varmap, lr, None)?;
        Self::new(
            target,
            predictor,
            predictor_optimizer,
            observation_shape,
            update_proportion,
            device,
        )
    }

    pub fn update_observation_stats(&mut self, next_states: &Tensor) -> Result<()> {
        self.obs_rms.update(next_states)
    }

    // per sample mean squared error between predictor and target embeddings
    fn prediction_errors(&self, next_states: &Tensor) -> Result<Tensor> {
        let obs = self.obs_rms.normalize(next_states, self.obs_clip)?;
        let target = self.target.forward(&obs)?.detach();
        let predicted = self.predictor.forward(&obs)?;
        predicted.sub(&target)?.sqr()?.mean(1)
    }

    /// One intrinsic reward per row of `next_states`.
    pub fn intrinsic_rewards(&self, next_states: &Tensor) -> Result<Vec<f32>> {
        let next_states = next_states.to_device(&self.device)?;
        self.prediction_errors(&next_states)?.detach().to_vec1()
    }

    /// One predictor step on a random `update_proportion` share of `next_states`. Returns the
    /// loss.
    pub fn train_predictor(&mut self, next_states: &Tensor) -> Result<f32> {
        let next_states = next_states.to_device(&self.device)?;
        let errors = self.prediction_errors(&next_states)?;
        let n = errors.dim(0)?;
        let mask: Vec<f32> = with_rng(|rng| {
            (0..n)
                .map(|_| {
                    if rng.random::<f32>() < self.update_proportion {
                        1.
                    } else {
                        0.
                    }
                })
                .collect()
        });
        let kept = mask.iter().sum::<f32>().max(1.);
        let mask = Tensor::from_vec(mask, n, &self.device)?;
        let loss = errors.mul(&mask)?.sum_all()?.affine(1. / kept as f64, 0.)?;
        self.predictor_optimizer.backward_step(&loss)?;
        loss.to_scalar()
    }
}

/// Value head estimating the discounted sum of intrinsic rewards.
pub struct IntrinsicCritic {
    pub value_net: ThreadSafeSequential,
    pub optimizer: OptimizerWithMaxGrad,
}

impl IntrinsicCritic {
    pub fn mlp(observation_size: usize, hidden: &[usize], lr: f64, device: &Device) -> Result<Self> {
        let layers = [hidden, &[1][..]].concat();
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let value_net = build_sequential(observation_size, &layers, &vb, "int_value")?;
        let optimizer = OptimizerWithMaxGrad::adam(varmap, lr, None)?;
        Ok(Self {
            value_net,
            optimizer,
        })
    }

    pub fn conv(observation_shape: &[usize], lr: f64, device: &Device) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let value_net = build_conv_net(observation_shape, &[1], &vb, "int_value")?;
        let optimizer = OptimizerWithMaxGrad::adam(varmap, lr, None)?;
        Ok(Self {
            value_net,
            optimizer,
        })
    }

    fn train(&mut self, states: &Tensor, returns: &Tensor) -> Result<()> {
        let values = self.calculate_values(states)?;
        let loss = returns.sub(&values)?.sqr()?.mean_all()?;
        self.optimizer.backward_step(&loss)
    }
}

impl ValueFunction for IntrinsicCritic {
    fn calculate_values(&self, observation: &Tensor) -> Result<Tensor> {
        self.value_net.forward(observation)?.squeeze(1)
    }
}

/// PPO hooks adding the RND exploration bonus. Before learning, the advantages are replaced by
/// `ext_coef * extrinsic + int_coef * intrinsic`, where the intrinsic part is a non-episodic GAE
/// over normalised intrinsic rewards. The intrinsic critic and the predictor are trained on the
/// same rollout. Every env has to contribute the same number of steps.
pub struct RndPPOHooks {
    pub inner: DefaultPPOHooks,
    pub rnd: Rnd,
    pub critic: IntrinsicCritic,
    pub ext_coef: f32,
    pub int_coef: f32,
    pub int_gamma: f32,
    pub int_lambda: f32,
    reward_filter: RewardForwardFilter,
    reward_rms: RunningMeanStd,
    device: Device,
}

impl RndPPOHooks {
    pub fn new(
        inner: DefaultPPOHooks,
        rnd: Rnd,
        critic: IntrinsicCritic,
        ext_coef: f32,
        int_coef: f32,
        int_gamma: f32,
        device: Device,
    ) -> Result<Self> {
        Ok(Self {
            inner,
            rnd,
            critic,
            ext_coef,
            int_coef,
            int_gamma,
            int_lambda: 0.95,
            reward_filter: RewardForwardFilter::new(int_gamma),
            reward_rms: RunningMeanStd::new((), device.clone())?,
            device,
        })
    }

    // divides the rewards by the running std of their discounted forward sums
    fn normalize_intrinsic_rewards(&mut self, int_rewards: &mut [Vec<f32>]) -> Result<()> {
        let Some(steps) = int_rewards.first().map(|r| r.len()) else {
            return Ok(());
        };
        if int_rewards.iter().any(|r| r.len() != steps) {
            return Err(Error::Msg(
                "intrinsic rewards need rollouts of equal length".into(),
            ));
        }
        let mut filtered = Vec::with_capacity(steps * int_rewards.len());
        for t in 0..steps {
            let rewards_t: Vec<f32> = int_rewards.iter().map(|r| r[t]).collect();
            filtered.extend(self.reward_filter.update(&rewards_t));
        }
        let n = filtered.len();
        self.reward_rms
            .update(&Tensor::from_vec(filtered, n, &self.device)?)?;
        let std = self.reward_rms.std()?.to_scalar::<f32>()?;
        for r in int_rewards.iter_mut().flatten() {
            *r /= std;
        }
        Ok(())
    }

    fn intrinsic_advantages(
        &mut self,
        rollouts: &[RolloutBuffer],
    ) -> Result<(Advantages, Returns, Tensor)> {
        let next_states = rollouts
            .iter()
            .map(|rb| rb.stacked_next_states())
            .collect::<Result<Vec<_>>>()?;
        let all_next_states = Tensor::cat(&next_states, 0)?.to_device(&self.device)?;
        self.rnd.update_observation_stats(&all_next_states)?;
        let mut int_rewards = next_states
            .iter()
            .map(|s| self.rnd.intrinsic_rewards(s))
            .collect::<Result<Vec<_>>>()?;
        self.normalize_intrinsic_rewards(&mut int_rewards)?;
        let mean_int_reward = int_rewards.iter().flatten().sum::<f32>()
            / int_rewards.iter().map(|r| r.len()).sum::<usize>().max(1) as f32;
        log::debug!("mean intrinsic reward {mean_int_reward:.4}");
        let mut advantages = Vec::with_capacity(rollouts.len());
        let mut returns = Vec::with_capacity(rollouts.len());
        for (rb, rewards) in rollouts.iter().zip(int_rewards.iter()) {
            let values = buffer_values(rb, &self.critic, &self.device)?;
            // the novelty stream does not end with the episode
            let dones = vec![false; rewards.len()];
            let (adv, ret) = gae(rewards, &values, &dones, self.int_gamma, self.int_lambda);
            advantages.push(adv);
            returns.push(ret);
        }
        Ok((Advantages(advantages), Returns(returns), all_next_states))
    }
}

impl<D: Distribution, LM: ActorCriticLearningModule> PPOHooksTrait<D, LM> for RndPPOHooks {
    fn before_learning_hook(
        &mut self,
        learning_module: &mut LM,
        distribution: &D,
        rollout_buffers: &mut Vec<RolloutBuffer>,
        advantages: &mut Advantages,
        returns: &mut Returns,
    ) -> Result<HookResult> {
        let (int_advantages, int_returns, next_states) =
            self.intrinsic_advantages(rollout_buffers)?;
        *advantages = advantages.combine(self.ext_coef, &int_advantages, self.int_coef);

        let states = rollout_buffers
            .iter()
            .map(|rb| rb.stacked_states())
            .collect::<Result<Vec<_>>>()?;
        let states = Tensor::cat(&states, 0)?.to_device(&self.device)?;
        let int_returns: Vec<f32> = int_returns.iter().flatten().copied().collect();
        let n = int_returns.len();
        let int_returns = Tensor::from_vec(int_returns, n, &self.device)?;
        for _ in 0..self.inner.n_epochs {
            self.critic.train(&states, &int_returns)?;
            self.rnd.train_predictor(&next_states)?;
        }

        PPOHooksTrait::<D, LM>::before_learning_hook(
            &mut self.inner,
            learning_module,
            distribution,
            rollout_buffers,
            advantages,
            returns,
        )
    }

    fn rollout_hook(
        &mut self,
        learning_module: &mut LM,
        distribution: &D,
        rollout_buffers: &[RolloutBuffer],
    ) -> Result<HookResult> {
        PPOHooksTrait::<D, LM>::rollout_hook(
            &mut self.inner,
            learning_module,
            distribution,
            rollout_buffers,
        )
    }

    fn batch_hook(
        &mut self,
        learning_module: &mut LM,
        distribution: &D,
        rollout_batch: &RolloutBatch,
        policy_loss: &mut PolicyLoss,
        value_loss: &mut ValueLoss,
        data: &PPOBatchData,
    ) -> Result<HookResult> {
        PPOHooksTrait::<D, LM>::batch_hook(
            &mut self.inner,
            learning_module,
            distribution,
            rollout_batch,
            policy_loss,
            value_loss,
            data,
        )
    }
}

#[cfg(test)]
mod test {
    use super::{IntrinsicCritic, Rnd};
    use arl_core::{policies::ValueFunction, rng::seed_rng};
    use candle_core::{DType, Device, Result, Tensor};

    #[test]
    fn prediction_error_shrinks_on_a_familiar_state() -> Result<()> {
        seed_rng(3);
        let mut rnd = Rnd::mlp(2, &[32], 8, 1e-2, 1., Device::Cpu)?;
        let familiar = Tensor::new(&[[0.5f32, -0.5]], &Device::Cpu)?.repeat((16, 1))?;
        rnd.update_observation_stats(&Tensor::randn(0f32, 1., (64, 2), &Device::Cpu)?)?;
        let before = rnd.intrinsic_rewards(&familiar)?[0];
        for _ in 0..50 {
            rnd.train_predictor(&familiar)?;
        }
        let after = rnd.intrinsic_rewards(&familiar)?[0];
        assert!(after < before, "{after} >= {before}");
        Ok(())
    }

    #[test]
    fn one_reward_per_state() -> Result<()> {
        let rnd = Rnd::mlp(3, &[4], 4, 1e-3, 0.25, Device::Cpu)?;
        let states = Tensor::zeros((5, 3), DType::F32, &Device::Cpu)?;
        let rewards = rnd.intrinsic_rewards(&states)?;
        assert_eq!(rewards.len(), 5);
        assert!(rewards.iter().all(|r| r.is_finite() && *r >= 0.));
        Ok(())
    }

    #[test]
    fn conv_nets_score_frame_stacks() -> Result<()> {
        seed_rng(4);
        let shape = [2, 36, 36];
        let mut rnd = Rnd::conv(&shape, 16, 1e-3, 1., Device::Cpu)?;
        let frames = Tensor::rand(0f32, 255., (3, 2, 36, 36), &Device::Cpu)?;
        rnd.update_observation_stats(&frames)?;
        let rewards = rnd.intrinsic_rewards(&frames)?;
        assert_eq!(rewards.len(), 3);
        assert!(rewards.iter().all(|r| r.is_finite() && *r >= 0.));
        assert!(rnd.train_predictor(&frames)?.is_finite());
        let critic = IntrinsicCritic::conv(&shape, 1e-3, &Device::Cpu)?;
        assert_eq!(critic.calculate_values(&frames)?.dims(), &[3]);
        Ok(())
    }
}
