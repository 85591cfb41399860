use candle_core::{Device, Error, Result, Tensor};

#[derive(Debug, Clone)]
pub enum Space {
    Discrete(usize),
    Continous {
        min: Option<Tensor>,
        max: Option<Tensor>,
        size: usize,
    },
}

impl Space {
    pub fn continous_from_dims(dims: &[usize]) -> Self {
        Self::Continous {
            min: None,
            max: None,
            size: dims.iter().product(),
        }
    }

    pub fn bounded(min: Vec<f32>, max: Vec<f32>) -> Result<Self> {
        let size = min.len();
        if max.len() != size {
            return Err(Error::Msg(format!(
                "space bounds disagree: {size} lower vs {} upper",
                max.len()
            )));
        }
        Ok(Self::Continous {
            min: Some(Tensor::from_vec(min, size, &Device::Cpu)?),
            max: Some(Tensor::from_vec(max, size, &Device::Cpu)?),
            size,
        })
    }

    pub fn size(&self) -> usize {
        match &self {
            Self::Discrete(size) => *size,
            Self::Continous { size, .. } => *size,
        }
    }

    pub fn is_discrete(&self) -> bool {
        matches!(self, Self::Discrete(_))
    }
}

#[derive(Debug, Clone)]
pub struct EnvironmentDescription {
    pub observation_space: Space,
    pub action_space: Space,
    // flat observations use a single dimension, image stacks use [C, H, W]
    pub observation_shape: Vec<usize>,
}

impl EnvironmentDescription {
    pub fn new(observation_space: Space, action_space: Space) -> Self {
        let observation_shape = vec![observation_space.size()];
        Self {
            observation_space,
            action_space,
            observation_shape,
        }
    }

    pub fn with_observation_shape(mut self, observation_shape: Vec<usize>) -> Self {
        self.observation_shape = observation_shape;
        self
    }

    pub fn action_size(&self) -> usize {
        self.action_space.size()
    }

    pub fn observation_size(&self) -> usize {
        self.observation_space.size()
    }
}

#[derive(Debug, Clone)]
pub struct SnapShot {
    pub state: Tensor,
    pub reward: f32,
    pub terminated: bool,
    pub truncated: bool,
    // the reward before any wrapper clipped or scaled it
    pub raw_reward: Option<f32>,
    // room the agent is in, for games made of rooms such as Montezuma's Revenge
    pub room: Option<usize>,
}

impl SnapShot {
    pub fn new(state: Tensor, reward: f32, terminated: bool, truncated: bool) -> Self {
        Self {
            state,
            reward,
            terminated,
            truncated,
            raw_reward: None,
            room: None,
        }
    }

    pub fn with_room(mut self, room: usize) -> Self {
        self.room = Some(room);
        self
    }

    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }

    pub fn tracked_reward(&self) -> f32 {
        self.raw_reward.unwrap_or(self.reward)
    }
}

pub trait Env {
    fn reset(&mut self, seed: u64) -> Result<Tensor>;
    fn step(&mut self, action: &Tensor) -> Result<SnapShot>;
    fn env_description(&self) -> EnvironmentDescription;
}

impl<E: Env + ?Sized> Env for Box<E> {
    fn reset(&mut self, seed: u64) -> Result<Tensor> {
        (**self).reset(seed)
    }

    fn step(&mut self, action: &Tensor) -> Result<SnapShot> {
        (**self).step(action)
    }

    fn env_description(&self) -> EnvironmentDescription {
        (**self).env_description()
    }
}

#[derive(Debug, Clone, Copy)]
pub enum RolloutMode {
    EpisodeBound { n_episodes: usize },
    StepBound { n_steps: usize },
}

/// Recovers the integer action from a one-hot (or logit like) action tensor.
pub fn action_index(action: &Tensor) -> Result<usize> {
    let action = action.flatten_all()?;
    let index = action.argmax(0)?.to_scalar::<u32>()?;
    Ok(index as usize)
}

pub fn one_hot(index: usize, size: usize, device: &Device) -> Result<Tensor> {
    if index >= size {
        return Err(Error::Msg(format!(
            "action {index} is out of range for {size} actions"
        )));
    }
    let mut mask = vec![0f32; size];
    mask[index] = 1.;
    Tensor::from_vec(mask, size, device)
}
