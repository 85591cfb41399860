pub mod a2c;
pub mod ppo;
pub mod rnd;
pub mod vpg;

use a2c::A2C;
use arl_core::{
    agents::Agent,
    distributions::DistributionKind,
    policies::{
        ValueFunction,
        learning_modules::{LearningModule, LearningModuleKind, PolicyValuesLosses},
    },
    utils::rollout_buffer::RolloutBuffer,
};
use candle_core::Result;
use ppo::PPO;
use vpg::VPG;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookResult {
    Continue,
    Break,
}

#[macro_export]
macro_rules! process_hook_result {
    ($hook_res:expr) => {
        match $hook_res? {
            $crate::HookResult::Continue => {}
            $crate::HookResult::Break => return Ok(()),
        }
    };
}

pub enum AgentKind {
    A2C(A2C<DistributionKind, LearningModuleKind>),
    PPO(PPO<DistributionKind, LearningModuleKind>),
    VPG(VPG<DistributionKind, LearningModuleKind>),
}

impl AgentKind {
    pub fn learning_module(&self) -> &LearningModuleKind {
        match self {
            Self::A2C(a2c) => &a2c.learning_module,
            Self::PPO(ppo) => &ppo.learning_module,
            Self::VPG(vpg) => &vpg.learning_module,
        }
    }
}

impl Agent for AgentKind {
    type Dist = DistributionKind;

    fn distribution(&self) -> &Self::Dist {
        match self {
            Self::A2C(a2c) => a2c.distribution(),
            Self::PPO(ppo) => ppo.distribution(),
            Self::VPG(vpg) => vpg.distribution(),
        }
    }

    fn learn(&mut self, rollouts: Vec<RolloutBuffer>) -> Result<()> {
        match self {
            Self::A2C(a2c) => a2c.learn(rollouts),
            Self::PPO(ppo) => ppo.learn(rollouts),
            Self::VPG(vpg) => vpg.learn(rollouts),
        }
    }
}

/// A learning module that owns the value function and steps on policy and value losses.
pub trait ActorCriticLearningModule:
    LearningModule<Losses = PolicyValuesLosses> + ValueFunction
{
}

impl<LM: LearningModule<Losses = PolicyValuesLosses> + ValueFunction> ActorCriticLearningModule
    for LM
{
}
