use anyhow::Result;
use arl_core::env::{Env, EnvironmentDescription, SnapShot, Space, one_hot};
use arl_gym::{
    classic_control::cartpole::CartPole,
    make_env,
    wrappers::{
        action_repeat::ActionRepeat, clip_reward::ClipReward, frame_stack::FrameStack,
        normalize_observation::NormalizeObservation, time_limit::TimeLimit,
    },
};
use candle_core::{Device, Tensor};

// Emits reward `t` at step t and the step count as observation; never terminates.
#[derive(Default)]
struct Counter {
    t: usize,
}

impl Env for Counter {
    fn reset(&mut self, _seed: u64) -> candle_core::Result<Tensor> {
        self.t = 0;
        Tensor::new(&[0f32, 0.], &Device::Cpu)
    }

    fn step(&mut self, _action: &Tensor) -> candle_core::Result<SnapShot> {
        self.t += 1;
        let state = Tensor::new(&[self.t as f32, -(self.t as f32)], &Device::Cpu)?;
        Ok(SnapShot::new(state, self.t as f32, false, false))
    }

    fn env_description(&self) -> EnvironmentDescription {
        EnvironmentDescription::new(Space::continous_from_dims(&[2]), Space::Discrete(2))
    }
}

fn noop() -> Result<Tensor> {
    Ok(one_hot(0, 2, &Device::Cpu)?)
}

#[test]
fn time_limit_truncates() -> Result<()> {
    let mut env = TimeLimit::new(Counter::default(), 3);
    env.reset(0)?;
    assert!(!env.step(&noop()?)?.truncated);
    assert!(!env.step(&noop()?)?.truncated);
    let last = env.step(&noop()?)?;
    assert!(last.truncated && !last.terminated);
    env.reset(0)?;
    assert!(!env.step(&noop()?)?.done());
    Ok(())
}

#[test]
fn action_repeat_sums_rewards() -> Result<()> {
    let mut env = ActionRepeat::new(Counter::default(), 4);
    env.reset(0)?;
    let snapshot = env.step(&noop()?)?;
    assert_eq!(snapshot.reward, 1. + 2. + 3. + 4.);
    assert_eq!(snapshot.state.to_vec1::<f32>()?, vec![4., -4.]);
    Ok(())
}

#[test]
fn action_repeat_stops_at_episode_end() -> Result<()> {
    let mut env = ActionRepeat::new(TimeLimit::new(Counter::default(), 2), 4);
    env.reset(0)?;
    let snapshot = env.step(&noop()?)?;
    assert!(snapshot.truncated);
    assert_eq!(snapshot.reward, 3.);
    Ok(())
}

#[test]
fn clip_reward_keeps_raw_reward() -> Result<()> {
    let mut env = ClipReward::new(ActionRepeat::new(Counter::default(), 2));
    env.reset(0)?;
    let snapshot = env.step(&noop()?)?;
    assert_eq!(snapshot.reward, 1.);
    assert_eq!(snapshot.tracked_reward(), 3.);
    Ok(())
}

#[test]
fn frame_stack_shifts_frames() -> Result<()> {
    let mut env = FrameStack::new(Counter::default(), 3);
    assert_eq!(env.env_description().observation_shape, vec![6]);
    let first = env.reset(0)?;
    assert_eq!(first.to_vec1::<f32>()?, vec![0.; 6]);
    env.step(&noop()?)?;
    let snapshot = env.step(&noop()?)?;
    assert_eq!(
        snapshot.state.to_vec1::<f32>()?,
        vec![0., 0., 1., -1., 2., -2.]
    );
    Ok(())
}

#[test]
fn normalized_observations_are_clipped() -> Result<()> {
    let mut env = NormalizeObservation::new(Counter::default(), 2.)?;
    env.reset(0)?;
    for _ in 0..20 {
        let snapshot = env.step(&noop()?)?;
        let max = snapshot.state.abs()?.max(0)?.to_scalar::<f32>()?;
        assert!(max <= 2.);
    }
    Ok(())
}

#[test]
fn make_env_applies_time_limits() -> Result<()> {
    let mut env = make_env("Pendulum-v1")?;
    assert!(!env.env_description().action_space.is_discrete());
    env.reset(0)?;
    let torque = Tensor::new(&[0f32], &Device::Cpu)?;
    let mut steps = 0;
    while !env.step(&torque)?.done() {
        steps += 1;
    }
    assert_eq!(steps + 1, 200);
    assert!(make_env("NoSuchEnv-v0").is_err() || cfg!(feature = "python"));
    let cartpole = CartPole::default();
    assert_eq!(cartpole.env_description().action_size(), 2);
    Ok(())
}
