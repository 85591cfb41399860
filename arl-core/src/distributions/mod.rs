pub mod categorical_distribution;
pub mod diagonal_distribution;

use candle_core::{Device, Result, Tensor};
use categorical_distribution::CategoricalDistribution;
use diagonal_distribution::DiagGaussianDistribution;
use enum_dispatch::enum_dispatch;

#[enum_dispatch]
pub trait Distribution: Send + Sync {
    /// Samples an action for a batch of one observation. Returns the flattened action and its
    /// log probability as a scalar tensor.
    fn get_action(&self, observation: &Tensor) -> Result<(Tensor, Tensor)>;

    /// The most likely action, used by evaluation actors.
    fn greedy_action(&self, observation: &Tensor) -> Result<Tensor>;

    fn log_probs(&self, states: &Tensor, actions: &Tensor) -> Result<Tensor>;

    /// Per sample entropy of the action distribution at `states`.
    fn entropy(&self, states: &Tensor) -> Result<Tensor>;

    fn std(&self) -> Result<f32>;

    /// Where the parameters live. Observations are moved here before a forward pass.
    fn device(&self) -> &Device;
}

/// Action and log probability for a single CPU observation, handed back on the CPU so
/// environments never see device tensors.
pub fn sample_on_device<D: Distribution + ?Sized>(
    distr: &D,
    observation: &Tensor,
) -> Result<(Tensor, Tensor)> {
    let observation = observation.to_device(distr.device())?.unsqueeze(0)?;
    let (action, logp) = distr.get_action(&observation)?;
    Ok((action.to_device(&Device::Cpu)?, logp.to_device(&Device::Cpu)?))
}

/// Greedy counterpart of [`sample_on_device`].
pub fn greedy_on_device<D: Distribution + ?Sized>(
    distr: &D,
    observation: &Tensor,
) -> Result<Tensor> {
    let observation = observation.to_device(distr.device())?.unsqueeze(0)?;
    distr.greedy_action(&observation)?.to_device(&Device::Cpu)
}

#[enum_dispatch(Distribution)]
#[derive(Debug, Clone)]
pub enum DistributionKind {
    Categorical(CategoricalDistribution),
    DiagGaussian(DiagGaussianDistribution),
}

#[cfg(test)]
mod test {
    use super::{
        Distribution, categorical_distribution::CategoricalDistribution, greedy_on_device,
        sample_on_device,
    };
    use crate::rng::seed_rng;
    use candle_core::{DType, Device, Result, Tensor};
    use candle_nn::{VarBuilder, VarMap};

    #[test]
    fn actions_come_back_to_the_cpu() -> Result<()> {
        seed_rng(5);
        // a cuda build runs the policy on the gpu, everything else stays on the cpu
        let device = Device::cuda_if_available(0)?;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let dist = CategoricalDistribution::build(3, 2, &[8], &vb, device.clone(), "policy")?;
        assert!(dist.device().same_device(&device));
        let observation = Tensor::new(&[0.5f32, -1., 2.], &Device::Cpu)?;
        let (action, logp) = sample_on_device(&dist, &observation)?;
        assert!(action.device().is_cpu());
        assert_eq!(action.dims(), &[2]);
        assert!(logp.to_scalar::<f32>()? <= 0.);
        let greedy = greedy_on_device(&dist, &observation)?;
        assert!(greedy.device().is_cpu());
        assert_eq!(greedy.sum_all()?.to_scalar::<f32>()?, 1.);
        Ok(())
    }
}
