use candle_core::Result;
use candle_core::Tensor;
use candle_core::backprop::GradStore;
use candle_nn::VarMap;

/// Backpropagates `t` and rescales the gradients of `varmap` so their global L2 norm is at most
/// `max_norm`.
pub fn clip_grad(t: &Tensor, varmap: &VarMap, max_norm: f32) -> Result<GradStore> {
    let mut grad_store = t.backward()?;
    let all_vars = varmap.all_vars();
    let mut total_norm_squared = 0.0f32;
    for var in all_vars.iter() {
        if let Some(grad) = grad_store.get(var.as_tensor()) {
            total_norm_squared += grad.sqr()?.sum_all()?.to_scalar::<f32>()?;
        }
    }
    let total_norm = total_norm_squared.sqrt();
    if total_norm > max_norm {
        let clip_coef = (max_norm / (total_norm + 1e-6)) as f64;
        for var in all_vars.iter() {
            let Some(old_grad) = grad_store.get(var.as_tensor()) else {
                continue;
            };
            let new_grad = old_grad.affine(clip_coef, 0.)?;
            grad_store.insert(var.as_tensor(), new_grad);
        }
    }
    Ok(grad_store)
}

#[cfg(test)]
mod test {
    use super::clip_grad;
    use candle_core::{DType, Device, Result, Tensor};
    use candle_nn::{Init, VarBuilder, VarMap};

    #[test]
    fn gradients_are_rescaled_to_max_norm() -> Result<()> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let w = vb.get_with_hints(2, "w", Init::Const(0.))?;
        // d/dw of (3 w0 + 4 w1) is [3, 4], norm 5
        let coefs = Tensor::new(&[3f32, 4.], &Device::Cpu)?;
        let loss = w.mul(&coefs)?.sum_all()?;
        let grads = clip_grad(&loss, &varmap, 1.)?;
        let grad: Vec<f32> = grads.get(&w).expect("gradient for w").to_vec1()?;
        assert!((grad[0] - 0.6).abs() < 1e-4);
        assert!((grad[1] - 0.8).abs() < 1e-4);
        Ok(())
    }
}
