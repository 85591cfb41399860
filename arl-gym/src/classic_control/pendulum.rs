use super::{seeded, uniform};
use arl_core::env::{Env, EnvironmentDescription, SnapShot, Space};
use candle_core::{Device, Result, Tensor};
use std::f32::consts::PI;

const MAX_SPEED: f32 = 8.;
const MAX_TORQUE: f32 = 2.;
const DT: f32 = 0.05;
const G: f32 = 10.;
const M: f32 = 1.;
const L: f32 = 1.;

fn angle_normalize(x: f32) -> f32 {
    (x + PI).rem_euclid(2. * PI) - PI
}

/// Swing up task with a continuous torque. Never terminates on its own.
#[derive(Debug, Default, Clone)]
pub struct Pendulum {
    theta: f32,
    theta_dot: f32,
}

impl Pendulum {
    fn observation(&self) -> Result<Tensor> {
        Tensor::new(
            &[self.theta.cos(), self.theta.sin(), self.theta_dot],
            &Device::Cpu,
        )
    }
}

impl Env for Pendulum {
    fn reset(&mut self, seed: u64) -> Result<Tensor> {
        let mut rng = seeded(seed);
        self.theta = uniform(&mut rng, -PI, PI);
        self.theta_dot = uniform(&mut rng, -1., 1.);
        self.observation()
    }

    fn step(&mut self, action: &Tensor) -> Result<SnapShot> {
        let torque = action
            .flatten_all()?
            .get(0)?
            .to_scalar::<f32>()?
            .clamp(-MAX_TORQUE, MAX_TORQUE);
        let cost = angle_normalize(self.theta).powi(2)
            + 0.1 * self.theta_dot.powi(2)
            + 0.001 * torque.powi(2);
        let theta_dot = self.theta_dot
            + (3. * G / (2. * L) * self.theta.sin() + 3. / (M * L * L) * torque) * DT;
        self.theta_dot = theta_dot.clamp(-MAX_SPEED, MAX_SPEED);
        self.theta += self.theta_dot * DT;
        Ok(SnapShot::new(self.observation()?, -cost, false, false))
    }

    fn env_description(&self) -> EnvironmentDescription {
        let observation_space = Space::continous_from_dims(&[3]);
        let action_space = Space::bounded(vec![-MAX_TORQUE], vec![MAX_TORQUE])
            .unwrap_or_else(|_| Space::continous_from_dims(&[1]));
        EnvironmentDescription::new(observation_space, action_space)
    }
}

#[cfg(test)]
mod test {
    use super::{Pendulum, angle_normalize};
    use arl_core::env::Env;
    use candle_core::{Device, Result, Tensor};
    use std::f32::consts::PI;

    #[test]
    fn angles_wrap_into_pi_range() {
        assert!((angle_normalize(2. * PI + 0.5) - 0.5).abs() < 1e-5);
        assert!((angle_normalize(-0.5) + 0.5).abs() < 1e-6);
    }

    #[test]
    fn rewards_are_non_positive() -> Result<()> {
        let mut env = Pendulum::default();
        env.reset(5)?;
        for torque in [-5f32, 0., 1.5] {
            let snapshot = env.step(&Tensor::new(&[torque], &Device::Cpu)?)?;
            assert!(snapshot.reward <= 0.);
            assert!(!snapshot.done());
            assert_eq!(snapshot.state.dims(), &[3]);
        }
        Ok(())
    }
}
