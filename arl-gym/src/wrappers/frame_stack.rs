use arl_core::env::{Env, EnvironmentDescription, SnapShot, Space};
use candle_core::{Result, Tensor};
use std::collections::VecDeque;

/// Concatenates the last `num_stack` observations along the first axis. After a reset the stack
/// is filled with copies of the first observation.
pub struct FrameStack<E: Env> {
    env: E,
    num_stack: usize,
    frames: VecDeque<Tensor>,
}

impl<E: Env> FrameStack<E> {
    pub fn new(env: E, num_stack: usize) -> Self {
        assert!(num_stack > 0, "num_stack must be positive");
        Self {
            env,
            num_stack,
            frames: VecDeque::with_capacity(num_stack),
        }
    }

    fn stacked(&self) -> Result<Tensor> {
        let frames = self.frames.iter().collect::<Vec<_>>();
        Tensor::cat(&frames, 0)
    }
}

impl<E: Env> Env for FrameStack<E> {
    fn reset(&mut self, seed: u64) -> Result<Tensor> {
        let observation = self.env.reset(seed)?;
        self.frames.clear();
        for _ in 0..self.num_stack {
            self.frames.push_back(observation.clone());
        }
        self.stacked()
    }

    fn step(&mut self, action: &Tensor) -> Result<SnapShot> {
        let mut snapshot = self.env.step(action)?;
        if self.frames.len() == self.num_stack {
            self.frames.pop_front();
        }
        self.frames.push_back(snapshot.state);
        snapshot.state = self.stacked()?;
        Ok(snapshot)
    }

    fn env_description(&self) -> EnvironmentDescription {
        let inner = self.env.env_description();
        let mut observation_shape = inner.observation_shape.clone();
        if let Some(first) = observation_shape.first_mut() {
            *first *= self.num_stack;
        }
        let observation_space =
            Space::continous_from_dims(&[inner.observation_space.size() * self.num_stack]);
        EnvironmentDescription::new(observation_space, inner.action_space)
            .with_observation_shape(observation_shape)
    }
}
