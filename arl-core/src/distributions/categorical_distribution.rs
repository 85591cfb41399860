use super::Distribution;
use crate::{
    env::one_hot,
    rng::with_rng,
    thread_safe_sequential::{ThreadSafeSequential, build_conv_net_on_trunk, build_sequential},
};
use candle_core::{Device, Error, Result, Tensor};
use candle_nn::ops::{log_softmax, softmax};
use candle_nn::{Module, VarBuilder};
use rand::distr::Distribution as RandDistributiion;
use rand::distr::weighted::WeightedIndex;

#[derive(Clone, Debug)]
pub struct CategoricalDistribution {
    action_size: usize,
    logits: ThreadSafeSequential,
    device: Device,
}

impl CategoricalDistribution {
    pub fn new(action_size: usize, logits: ThreadSafeSequential, device: Device) -> Self {
        Self {
            action_size,
            logits,
            device,
        }
    }

    pub fn build(
        input_dim: usize,
        action_size: usize,
        layers: &[usize],
        vb: &VarBuilder,
        device: Device,
        prefix: &str,
    ) -> Result<Self> {
        let layers = [layers, &[action_size][..]].concat();
        let logits = build_sequential(input_dim, &layers, vb, prefix)?;
        Ok(Self {
            action_size,
            logits,
            device,
        })
    }

    /// Logits on top of the conv body named `trunk_prefix`, see
    /// [`build_conv_net_on_trunk`](crate::thread_safe_sequential::build_conv_net_on_trunk).
    pub fn build_conv(
        observation_shape: &[usize],
        action_size: usize,
        vb: &VarBuilder,
        device: Device,
        trunk_prefix: &str,
        prefix: &str,
    ) -> Result<Self> {
        let logits =
            build_conv_net_on_trunk(observation_shape, &[action_size], vb, trunk_prefix, prefix)?;
        Ok(Self {
            action_size,
            logits,
            device,
        })
    }

    pub fn action_probs(&self, states: &Tensor) -> Result<Tensor> {
        softmax(&self.logits.forward(states)?, 1)
    }
}

impl Distribution for CategoricalDistribution {
    fn get_action(&self, observation: &Tensor) -> Result<(Tensor, Tensor)> {
        let logits = self.logits.forward(observation)?.detach();
        let action_probs: Vec<f32> = softmax(&logits, 1)?.squeeze(0)?.to_vec1()?;
        let distribution = WeightedIndex::new(&action_probs).map_err(Error::wrap)?;
        let action = with_rng(|rng| distribution.sample(rng));
        let logp = log_softmax(&logits, 1)?.squeeze(0)?.get(action)?;
        let action = one_hot(action, self.action_size, &self.device)?;
        Ok((action, logp))
    }

    fn greedy_action(&self, observation: &Tensor) -> Result<Tensor> {
        let logits = self.logits.forward(observation)?.detach();
        let action = logits.squeeze(0)?.argmax(0)?.to_scalar::<u32>()?;
        one_hot(action as usize, self.action_size, &self.device)
    }

    fn log_probs(&self, states: &Tensor, actions: &Tensor) -> Result<Tensor> {
        let logits = self.logits.forward(states)?;
        let log_probs = log_softmax(&logits, 1)?;
        actions.mul(&log_probs)?.sum(1)
    }

    fn entropy(&self, states: &Tensor) -> Result<Tensor> {
        let logits = self.logits.forward(states)?;
        let log_probs = log_softmax(&logits, 1)?;
        let probs = log_probs.exp()?;
        probs.mul(&log_probs)?.sum(1)?.neg()
    }

    fn std(&self) -> Result<f32> {
        Err(Error::Msg(
            "a categorical distribution has no standard deviation".into(),
        ))
    }

    fn device(&self) -> &Device {
        &self.device
    }
}

#[cfg(test)]
mod test {
    use super::CategoricalDistribution;
    use crate::{distributions::Distribution, env::action_index, rng::seed_rng};
    use candle_core::{DType, Device, Result, Tensor};
    use candle_nn::{VarBuilder, VarMap};

    #[test]
    fn sampled_actions_are_one_hot() -> Result<()> {
        seed_rng(3);
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let dist = CategoricalDistribution::build(4, 3, &[8], &vb, Device::Cpu, "policy")?;
        let obs = Tensor::ones((1, 4), DType::F32, &Device::Cpu)?;
        let (action, logp) = dist.get_action(&obs)?;
        assert_eq!(action.dims(), &[3]);
        assert_eq!(action.sum_all()?.to_scalar::<f32>()?, 1.);
        assert!(logp.to_scalar::<f32>()? <= 0.);
        let recomputed = dist.log_probs(&obs, &action.unsqueeze(0)?)?;
        let diff = (recomputed.squeeze(0)?.to_scalar::<f32>()? - logp.to_scalar::<f32>()?).abs();
        assert!(diff < 1e-5);
        assert!(action_index(&dist.greedy_action(&obs)?)? < 3);
        Ok(())
    }

    #[test]
    fn uniform_logits_have_maximal_entropy() -> Result<()> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let dist = CategoricalDistribution::build(2, 4, &[], &vb, Device::Cpu, "policy")?;
        // zero input and zero bias give equal logits
        let states = Tensor::zeros((2, 2), DType::F32, &Device::Cpu)?;
        let entropy: Vec<f32> = dist.entropy(&states)?.to_vec1()?;
        for e in entropy {
            assert!((e - 4f32.ln()).abs() < 1e-5);
        }
        Ok(())
    }
}
