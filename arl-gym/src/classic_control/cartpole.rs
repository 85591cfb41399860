use super::{seeded, uniform};
use arl_core::env::{Env, EnvironmentDescription, SnapShot, Space, action_index};
use candle_core::{Device, Result, Tensor};

const GRAVITY: f32 = 9.8;
const CART_MASS: f32 = 1.0;
const POLE_MASS: f32 = 0.1;
const TOTAL_MASS: f32 = CART_MASS + POLE_MASS;
// half the pole length
const POLE_LENGTH: f32 = 0.5;
const POLE_MASS_LENGTH: f32 = POLE_MASS * POLE_LENGTH;
const FORCE_MAG: f32 = 10.0;
const TAU: f32 = 0.02;
const X_THRESHOLD: f32 = 2.4;
const THETA_THRESHOLD: f32 = 12.0 * 2.0 * std::f32::consts::PI / 360.0;

/// Pole balancing on a cart, with explicit Euler integration. Reward 1 for every step, the
/// episode terminates once the pole tilts past 12 degrees or the cart leaves the track.
#[derive(Debug, Default, Clone)]
pub struct CartPole {
    // x, x_dot, theta, theta_dot
    state: [f32; 4],
}

impl CartPole {
    fn observation(&self) -> Result<Tensor> {
        Tensor::new(&self.state, &Device::Cpu)
    }
}

impl Env for CartPole {
    fn reset(&mut self, seed: u64) -> Result<Tensor> {
        let mut rng = seeded(seed);
        self.state = std::array::from_fn(|_| uniform(&mut rng, -0.05, 0.05));
        self.observation()
    }

    fn step(&mut self, action: &Tensor) -> Result<SnapShot> {
        let [x, x_dot, theta, theta_dot] = self.state;
        let force = if action_index(action)? == 1 {
            FORCE_MAG
        } else {
            -FORCE_MAG
        };
        let (sin_theta, cos_theta) = theta.sin_cos();
        let temp = (force + POLE_MASS_LENGTH * theta_dot * theta_dot * sin_theta) / TOTAL_MASS;
        let theta_acc = (GRAVITY * sin_theta - cos_theta * temp)
            / (POLE_LENGTH * (4.0 / 3.0 - POLE_MASS * cos_theta * cos_theta / TOTAL_MASS));
        let x_acc = temp - POLE_MASS_LENGTH * theta_acc * cos_theta / TOTAL_MASS;
        self.state = [
            x + TAU * x_dot,
            x_dot + TAU * x_acc,
            theta + TAU * theta_dot,
            theta_dot + TAU * theta_acc,
        ];
        let [x, _, theta, _] = self.state;
        let terminated = !(-X_THRESHOLD..=X_THRESHOLD).contains(&x)
            || !(-THETA_THRESHOLD..=THETA_THRESHOLD).contains(&theta);
        Ok(SnapShot::new(self.observation()?, 1., terminated, false))
    }

    fn env_description(&self) -> EnvironmentDescription {
        EnvironmentDescription::new(Space::continous_from_dims(&[4]), Space::Discrete(2))
    }
}
