//! Environment wrappers. Each one owns the wrapped env and is itself an [`Env`](arl_core::env::Env),
//! so they nest: `FrameStack::new(ClipReward::new(ActionRepeat::new(env, 4)), 4)`.

pub mod action_repeat;
pub mod clip_reward;
pub mod frame_stack;
pub mod normalize_observation;
pub mod time_limit;
