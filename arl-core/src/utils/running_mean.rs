use candle_core::shape::Dim;
use candle_core::{DType, Device, Result, Shape, Tensor};

/// Running mean and (biased) variance over the leading axis of every batch it sees.
#[derive(Debug, Clone)]
pub struct RunningMeanStd {
    pub mean: Tensor,
    pub var: Tensor,
    pub count: f32,
    pub device: Device,
}

pub fn biased_var<D: Dim>(t: &Tensor, dim: D) -> Result<Tensor> {
    let dim = dim.to_index(t.shape(), "var")?;
    let mean = t.mean_keepdim(dim)?;
    let squares = t.broadcast_sub(&mean)?.sqr()?;
    (squares.sum_keepdim(dim)? / t.dim(dim)? as f64)?.squeeze(dim)
}

impl RunningMeanStd {
    pub fn new<S: Into<Shape> + Copy>(shape: S, device: Device) -> Result<Self> {
        let mean = Tensor::zeros(shape, DType::F32, &device)?;
        let var = Tensor::zeros(shape, DType::F32, &device)?;
        Ok(Self {
            mean,
            var,
            count: 0.,
            device,
        })
    }

    pub fn update(&mut self, batch: &Tensor) -> Result<()> {
        let batch = batch.to_device(&self.device)?;
        let batch_mean = batch.mean(0)?;
        let batch_var = biased_var(&batch, 0)?;
        let batch_count = batch.dim(0)? as f32;
        self.update_from_moments(batch_mean, batch_var, batch_count)
    }

    // parallel variant of Welford's algorithm
    fn update_from_moments(
        &mut self,
        batch_mean: Tensor,
        batch_var: Tensor,
        batch_count: f32,
    ) -> Result<()> {
        if batch_count == 0. {
            return Ok(());
        }
        let delta = batch_mean.sub(&self.mean)?;
        let tot_count = self.count + batch_count;
        self.mean = self
            .mean
            .add(&delta.affine((batch_count / tot_count) as f64, 0.)?)?;
        let m_a = self.var.affine(self.count as f64, 0.)?;
        let m_b = batch_var.affine(batch_count as f64, 0.)?;
        let m_2 = m_a
            .add(&m_b)?
            .add(&delta.sqr()?.affine((self.count * batch_count / tot_count) as f64, 0.)?)?;
        self.var = m_2.affine(1. / tot_count as f64, 0.)?;
        self.count = tot_count;
        Ok(())
    }

    pub fn std(&self) -> Result<Tensor> {
        self.var.affine(1., 1e-8)?.sqrt()
    }

    /// `(x - mean) / std`, clamped to `[-clip, clip]`. `x` may carry a leading batch axis.
    pub fn normalize(&self, x: &Tensor, clip: f32) -> Result<Tensor> {
        let x = x.to_device(&self.device)?;
        x.broadcast_sub(&self.mean)?
            .broadcast_div(&self.std()?)?
            .clamp(-clip, clip)
    }
}

/// Discounted running sum of a reward stream, `r_t' = gamma * r_{t-1}' + r_t`, tracked per
/// environment. Intrinsic rewards are scaled by the std of these sums.
#[derive(Debug, Clone)]
pub struct RewardForwardFilter {
    gamma: f32,
    rewems: Option<Vec<f32>>,
}

impl RewardForwardFilter {
    pub fn new(gamma: f32) -> Self {
        Self {
            gamma,
            rewems: None,
        }
    }

    /// Folds one reward per environment into the filter and returns the filtered values.
    pub fn update(&mut self, rewards: &[f32]) -> Vec<f32> {
        let gamma = self.gamma;
        let rewems = self.rewems.get_or_insert_with(|| vec![0.; rewards.len()]);
        if rewems.len() != rewards.len() {
            *rewems = vec![0.; rewards.len()];
        }
        for (rewem, reward) in rewems.iter_mut().zip(rewards) {
            *rewem = *rewem * gamma + reward;
        }
        rewems.clone()
    }
}
