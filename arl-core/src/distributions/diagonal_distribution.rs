use super::Distribution;
use crate::{
    rng::with_rng,
    thread_safe_sequential::{ThreadSafeSequential, build_sequential},
};
use candle_core::{Device, Result, Tensor};
use candle_nn::{Init, Module, VarBuilder};
use rand::Rng;
use rand_distr::StandardNormal;
use std::f32;

// drawn from the thread local generator, so sampled actions follow the run seed
fn standard_normal(size: usize) -> Vec<f32> {
    with_rng(|rng| (0..size).map(|_| rng.sample::<f32, _>(StandardNormal)).collect())
}

/// Gaussian policy with a state dependent mean and a learned, state independent log std.
#[derive(Debug, Clone)]
pub struct DiagGaussianDistribution {
    mu_net: ThreadSafeSequential,
    log_std: Tensor,
}

impl DiagGaussianDistribution {
    pub fn new(mu_net: ThreadSafeSequential, log_std: Tensor) -> Self {
        Self { mu_net, log_std }
    }

    pub fn build(
        input_dim: usize,
        action_size: usize,
        layers: &[usize],
        vb: &VarBuilder,
        init_log_std: f64,
        prefix: &str,
    ) -> Result<Self> {
        let layers = [layers, &[action_size][..]].concat();
        let mu_net = build_sequential(input_dim, &layers, vb, prefix)?;
        let log_std = vb.get_with_hints(action_size, &format!("{prefix}log_std"), Init::Const(init_log_std))?;
        Ok(Self { mu_net, log_std })
    }
}

impl Distribution for DiagGaussianDistribution {
    fn get_action(&self, observation: &Tensor) -> Result<(Tensor, Tensor)> {
        let mu = self.mu_net.forward(observation)?.detach();
        let action_size = self.log_std.dim(0)?;
        let noise = Tensor::from_vec(standard_normal(action_size), (1, action_size), mu.device())?;
        let std = self.log_std.detach().exp()?.unsqueeze(0)?;
        let action = (mu + std.mul(&noise)?)?.detach();
        let logp = self.log_probs(observation, &action)?.detach().squeeze(0)?;
        Ok((action.squeeze(0)?, logp))
    }

    fn greedy_action(&self, observation: &Tensor) -> Result<Tensor> {
        self.mu_net.forward(observation)?.detach().squeeze(0)
    }

    fn log_probs(&self, states: &Tensor, actions: &Tensor) -> Result<Tensor> {
        let mu = self.mu_net.forward(states)?;
        let log_std = self.log_std.broadcast_as(mu.shape())?;
        let var = log_std.exp()?.sqr()?;
        let log_sqrt_2pi = f32::ln(f32::sqrt(2f32 * f32::consts::PI)) as f64;
        let log_probs = ((actions.broadcast_sub(&mu)?.sqr()? / (var * 2.)?)?.neg()? - log_std)?
            .affine(1., -log_sqrt_2pi)?;
        log_probs.sum(1)
    }

    fn entropy(&self, states: &Tensor) -> Result<Tensor> {
        let batch_size = states.dim(0)?;
        let per_dim = self
            .log_std
            .affine(1., 0.5 * ((2. * std::f64::consts::PI).ln() + 1.))?;
        per_dim.sum_all()?.broadcast_as(batch_size)?.contiguous()
    }

    fn std(&self) -> Result<f32> {
        self.log_std.exp()?.mean_all()?.to_scalar::<f32>()
    }

    fn device(&self) -> &Device {
        self.log_std.device()
    }
}
