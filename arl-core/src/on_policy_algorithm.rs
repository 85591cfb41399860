use crate::{
    Algorithm,
    agents::Agent,
    env::RolloutMode,
    sampler::Sampler,
    utils::rollout_buffer::RolloutBuffer,
};
use candle_core::Result;

macro_rules! break_on_hook_res {
    ($hook_res:expr) => {
        if $hook_res {
            break;
        }
    };
}

#[derive(Debug, Clone, Copy)]
pub enum LearningSchedule {
    RolloutBound {
        total_rollouts: usize,
        current_rollout: usize,
    },
    TotalStepBound {
        total_steps: usize,
        current_step: usize,
    },
}

impl LearningSchedule {
    pub fn rollout_bound(total_rollouts: usize) -> Self {
        Self::RolloutBound {
            total_rollouts,
            current_rollout: 0,
        }
    }

    pub fn total_step_bound(total_steps: usize) -> Self {
        Self::TotalStepBound {
            total_steps,
            current_step: 0,
        }
    }

    /// Accounts for a finished rollout. Returns true once the schedule is exhausted.
    pub fn advance(&mut self, rollouts: &[RolloutBuffer]) -> bool {
        match self {
            Self::RolloutBound {
                total_rollouts,
                current_rollout,
            } => {
                *current_rollout += 1;
                current_rollout >= total_rollouts
            }
            Self::TotalStepBound {
                total_steps,
                current_step,
            } => {
                let rollout_steps: usize = rollouts.iter().map(|rb| rb.len()).sum();
                *current_step += rollout_steps;
                current_step >= total_steps
            }
        }
    }
}

/// Every hook returns whether training should stop.
pub trait OnPolicyAlgorithmHooks {
    fn init_hook(&mut self) -> bool {
        false
    }

    fn post_rollout_hook(&mut self, rollouts: &mut [RolloutBuffer]) -> bool;

    fn post_training_hook(&mut self) -> bool {
        false
    }

    fn shutdown_hook(&mut self) -> Result<()> {
        Ok(())
    }
}

pub struct DefaultOnPolicyAlgorithmHooks {
    rollout_idx: usize,
    learning_schedule: LearningSchedule,
    schedule_exhausted: bool,
}

impl DefaultOnPolicyAlgorithmHooks {
    pub fn new(learning_schedule: LearningSchedule) -> Self {
        Self {
            rollout_idx: 0,
            learning_schedule,
            schedule_exhausted: false,
        }
    }
}

/// Sum of rewards and number of finished episodes over a set of rollouts.
pub fn rollout_stats(rollouts: &[RolloutBuffer]) -> (f32, usize) {
    let total_reward = rollouts
        .iter()
        .map(|rb| rb.raw_rewards.iter().sum::<f32>())
        .sum::<f32>();
    let episodes = rollouts.iter().map(|rb| rb.num_episodes()).sum();
    (total_reward, episodes)
}

impl OnPolicyAlgorithmHooks for DefaultOnPolicyAlgorithmHooks {
    fn post_rollout_hook(&mut self, rollouts: &mut [RolloutBuffer]) -> bool {
        let (total_reward, episodes) = rollout_stats(rollouts);
        let mean_return = if episodes > 0 {
            total_reward / episodes as f32
        } else {
            f32::NAN
        };
        log::info!(
            "rollout {:>4}: {episodes} finished episodes, reward {total_reward:.2}, mean return {mean_return:.2}",
            self.rollout_idx,
        );
        self.rollout_idx += 1;
        // the last rollout is still learned from
        self.schedule_exhausted = self.learning_schedule.advance(rollouts);
        false
    }

    fn post_training_hook(&mut self) -> bool {
        self.schedule_exhausted
    }
}

pub struct OnPolicyAlgorithm<S: Sampler, A: Agent, H: OnPolicyAlgorithmHooks> {
    pub sampler: S,
    pub agent: A,
    pub hooks: H,
    pub rollout_mode: RolloutMode,
}

impl<S: Sampler, A: Agent, H: OnPolicyAlgorithmHooks> Algorithm for OnPolicyAlgorithm<S, A, H> {
    fn train(&mut self) -> Result<()> {
        if self.hooks.init_hook() {
            return Ok(());
        }
        loop {
            // rollout phase
            let distribution = self.agent.distribution();
            let mut rollouts = self
                .sampler
                .collect_rollouts(distribution, self.rollout_mode)?;
            break_on_hook_res!(self.hooks.post_rollout_hook(&mut rollouts));

            // learning phase
            self.agent.learn(rollouts)?;
            break_on_hook_res!(self.hooks.post_training_hook());
        }
        self.hooks.shutdown_hook()
    }
}
