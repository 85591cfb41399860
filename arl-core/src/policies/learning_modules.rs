use crate::{
    policies::{OptimizerWithMaxGrad, ValueFunction},
    tensors::{PolicyLoss, ValueLoss},
    thread_safe_sequential::ThreadSafeSequential,
};
use candle_core::{Result, Tensor};
use candle_nn::{Module, VarMap};

/// Owns the trainable parameters of an agent and turns its losses into optimizer steps.
pub trait LearningModule {
    type Losses;

    fn update(&mut self, losses: Self::Losses) -> Result<()>;
}

pub struct PolicyValuesLosses {
    pub policy_loss: PolicyLoss,
    pub value_loss: ValueLoss,
}

// critic output is [batch, 1]
fn critic_values(critic: &ThreadSafeSequential, observations: &Tensor) -> Result<Tensor> {
    critic.forward(observations)?.squeeze(1)
}

/// Policy and critic have their own parameters and their own Adam state.
#[derive(Debug)]
pub struct DecoupledActorCriticLM {
    pub critic: ThreadSafeSequential,
    pub policy_optimizer: OptimizerWithMaxGrad,
    pub critic_optimizer: OptimizerWithMaxGrad,
}

impl LearningModule for DecoupledActorCriticLM {
    type Losses = PolicyValuesLosses;

    fn update(&mut self, losses: PolicyValuesLosses) -> Result<()> {
        self.policy_optimizer.backward_step(&losses.policy_loss)?;
        self.critic_optimizer.backward_step(&losses.value_loss)
    }
}

impl ValueFunction for DecoupledActorCriticLM {
    fn calculate_values(&self, observations: &Tensor) -> Result<Tensor> {
        critic_values(&self.critic, observations)
    }
}

/// Policy and critic share one varmap, so a single step on `policy_loss + value_loss` trains
/// both. The chapter 9 actor-critic clips the joint gradient.
#[derive(Debug)]
pub struct ParalellActorCriticLM {
    pub critic: ThreadSafeSequential,
    pub optimizer: OptimizerWithMaxGrad,
}

impl LearningModule for ParalellActorCriticLM {
    type Losses = PolicyValuesLosses;

    fn update(&mut self, losses: PolicyValuesLosses) -> Result<()> {
        let total_loss = (&*losses.policy_loss + &*losses.value_loss)?;
        self.optimizer.backward_step(&total_loss)
    }
}

impl ValueFunction for ParalellActorCriticLM {
    fn calculate_values(&self, observations: &Tensor) -> Result<Tensor> {
        critic_values(&self.critic, observations)
    }
}

#[derive(Debug)]
pub enum LearningModuleKind {
    Decoupled(DecoupledActorCriticLM),
    Paralell(ParalellActorCriticLM),
}

impl LearningModuleKind {
    /// Every varmap holding trainable parameters, policy first. Checkpoints store them in
    /// this order.
    pub fn varmaps(&self) -> Vec<&VarMap> {
        match self {
            Self::Decoupled(lm) => vec![&lm.policy_optimizer.varmap, &lm.critic_optimizer.varmap],
            Self::Paralell(lm) => vec![&lm.optimizer.varmap],
        }
    }
}

impl LearningModule for LearningModuleKind {
    type Losses = PolicyValuesLosses;

    fn update(&mut self, losses: PolicyValuesLosses) -> Result<()> {
        match self {
            Self::Decoupled(lm) => lm.update(losses),
            Self::Paralell(lm) => lm.update(losses),
        }
    }
}

impl ValueFunction for LearningModuleKind {
    fn calculate_values(&self, observations: &Tensor) -> Result<Tensor> {
        match self {
            Self::Decoupled(lm) => lm.calculate_values(observations),
            Self::Paralell(lm) => lm.calculate_values(observations),
        }
    }
}
