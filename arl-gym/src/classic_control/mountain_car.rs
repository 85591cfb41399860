use super::{seeded, uniform};
use arl_core::env::{Env, EnvironmentDescription, SnapShot, Space, action_index};
use candle_core::{Device, Result, Tensor};

pub const MIN_POSITION: f32 = -1.2;
pub const MAX_POSITION: f32 = 0.6;
pub const MAX_SPEED: f32 = 0.07;
pub const GOAL_POSITION: f32 = 0.5;
const FORCE: f32 = 0.001;
const GRAVITY: f32 = 0.0025;

/// An underpowered car in a valley. Actions: push left, no push, push right. Every step costs -1
/// until the car reaches the flag on the right hill.
#[derive(Debug, Default, Clone)]
pub struct MountainCar {
    position: f32,
    velocity: f32,
}

impl MountainCar {
    fn observation(&self) -> Result<Tensor> {
        Tensor::new(&[self.position, self.velocity], &Device::Cpu)
    }

    pub fn bounds() -> ([f32; 2], [f32; 2]) {
        ([MIN_POSITION, -MAX_SPEED], [MAX_POSITION, MAX_SPEED])
    }
}

impl Env for MountainCar {
    fn reset(&mut self, seed: u64) -> Result<Tensor> {
        let mut rng = seeded(seed);
        self.position = uniform(&mut rng, -0.6, -0.4);
        self.velocity = 0.;
        self.observation()
    }

    fn step(&mut self, action: &Tensor) -> Result<SnapShot> {
        let direction = action_index(action)? as f32 - 1.;
        self.velocity += direction * FORCE + (3. * self.position).cos() * -GRAVITY;
        self.velocity = self.velocity.clamp(-MAX_SPEED, MAX_SPEED);
        self.position += self.velocity;
        self.position = self.position.clamp(MIN_POSITION, MAX_POSITION);
        if self.position == MIN_POSITION && self.velocity < 0. {
            self.velocity = 0.;
        }
        let terminated = self.position >= GOAL_POSITION && self.velocity >= 0.;
        Ok(SnapShot::new(self.observation()?, -1., terminated, false))
    }

    fn env_description(&self) -> EnvironmentDescription {
        let (low, high) = Self::bounds();
        let observation_space = Space::bounded(low.to_vec(), high.to_vec())
            .unwrap_or_else(|_| Space::continous_from_dims(&[2]));
        EnvironmentDescription::new(observation_space, Space::Discrete(3))
    }
}

#[cfg(test)]
mod test {
    use super::{MAX_SPEED, MountainCar};
    use arl_core::env::{Env, one_hot};
    use candle_core::{Device, Result};

    #[test]
    fn velocity_stays_bounded() -> Result<()> {
        let mut env = MountainCar::default();
        env.reset(3)?;
        let push_right = one_hot(2, 3, &Device::Cpu)?;
        for _ in 0..50 {
            let snapshot = env.step(&push_right)?;
            assert_eq!(snapshot.reward, -1.);
            let velocity = snapshot.state.to_vec1::<f32>()?[1];
            assert!(velocity.abs() <= MAX_SPEED);
        }
        Ok(())
    }

    #[test]
    fn rocking_reaches_the_goal() -> Result<()> {
        let mut env = MountainCar::default();
        env.reset(0)?;
        // push along the current velocity, the classic energy pumping policy
        let mut velocity = 0f32;
        for _ in 0..1000 {
            let action = if velocity < 0. { 0 } else { 2 };
            let snapshot = env.step(&one_hot(action, 3, &Device::Cpu)?)?;
            velocity = snapshot.state.to_vec1::<f32>()?[1];
            if snapshot.terminated {
                return Ok(());
            }
        }
        panic!("the energy pumping policy never reached the goal");
    }
}
