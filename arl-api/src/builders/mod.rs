pub mod agents;
pub mod env_pool;

use arl_core::{
    distributions::{
        DistributionKind, categorical_distribution::CategoricalDistribution,
        diagonal_distribution::DiagGaussianDistribution,
    },
    env::{EnvironmentDescription, Space},
    policies::{
        OptimizerWithMaxGrad,
        learning_modules::{DecoupledActorCriticLM, LearningModuleKind, ParalellActorCriticLM},
    },
    thread_safe_sequential::{ThreadSafeSequential, build_conv_net_on_trunk, build_sequential},
};
use candle_core::{DType, Device, Error, Result};
use candle_nn::{VarBuilder, VarMap};

#[derive(Debug, Clone)]
pub enum Network {
    Mlp { hidden: Vec<usize> },
    /// The Atari conv body, for `[C, H, W]` pixel observations.
    Conv,
}

#[derive(Debug, Clone)]
pub enum LearningModuleType {
    Paralell {
        max_grad_norm: Option<f32>,
    },
    Decoupled {
        policy_max_grad_norm: Option<f32>,
        value_max_grad_norm: Option<f32>,
    },
}

/// Policy and value network plus the optimizers stepping on them.
#[derive(Debug, Clone)]
pub struct ActorCriticBuilder {
    pub network: Network,
    pub learning_module_type: LearningModuleType,
    pub learning_rate: f64,
    pub init_log_std: f64,
}

impl Default for ActorCriticBuilder {
    fn default() -> Self {
        Self {
            network: Network::Mlp {
                hidden: vec![64, 64],
            },
            learning_module_type: LearningModuleType::Decoupled {
                policy_max_grad_norm: None,
                value_max_grad_norm: None,
            },
            learning_rate: 3e-4,
            init_log_std: 0.,
        }
    }
}

impl ActorCriticBuilder {
    // conv nets put their body under `trunk`; policy and value net share it when they share `vb`
    fn build_distribution(
        &self,
        env_description: &EnvironmentDescription,
        vb: &VarBuilder,
        device: &Device,
        trunk: &str,
    ) -> Result<DistributionKind> {
        let action_size = env_description.action_size();
        let observation_size = env_description.observation_size();
        match (&self.network, &env_description.action_space) {
            (Network::Mlp { hidden }, Space::Discrete(_)) => Ok(DistributionKind::Categorical(
                CategoricalDistribution::build(
                    observation_size,
                    action_size,
                    hidden,
                    vb,
                    device.clone(),
                    "policy",
                )?,
            )),
            (Network::Mlp { hidden }, Space::Continous { .. }) => {
                Ok(DistributionKind::DiagGaussian(DiagGaussianDistribution::build(
                    observation_size,
                    action_size,
                    hidden,
                    vb,
                    self.init_log_std,
                    "policy",
                )?))
            }
            (Network::Conv, Space::Discrete(_)) => Ok(DistributionKind::Categorical(
                CategoricalDistribution::build_conv(
                    &env_description.observation_shape,
                    action_size,
                    vb,
                    device.clone(),
                    trunk,
                    "policy_head",
                )?,
            )),
            (Network::Conv, Space::Continous { .. }) => Err(Error::Msg(
                "conv networks are only built for discrete action spaces".into(),
            )),
        }
    }

    fn build_value_net(
        &self,
        env_description: &EnvironmentDescription,
        vb: &VarBuilder,
        trunk: &str,
    ) -> Result<ThreadSafeSequential> {
        match &self.network {
            Network::Mlp { hidden } => {
                let layers = [&hidden[..], &[1]].concat();
                build_sequential(env_description.observation_size(), &layers, vb, "value")
            }
            Network::Conv => build_conv_net_on_trunk(
                &env_description.observation_shape,
                &[1],
                vb,
                trunk,
                "value_head",
            ),
        }
    }

    pub fn build(
        &self,
        env_description: &EnvironmentDescription,
        device: &Device,
    ) -> Result<(DistributionKind, LearningModuleKind)> {
        assert!(self.learning_rate > 0., "learning rate must be positive");
        let policy_varmap = VarMap::new();
        let policy_vb = VarBuilder::from_varmap(&policy_varmap, DType::F32, device);
        let (distribution, learning_module) = match &self.learning_module_type {
            LearningModuleType::Paralell { max_grad_norm } => {
                // critic shares the varmap, so one optimizer sees every parameter
                let distribution =
                    self.build_distribution(env_description, &policy_vb, device, "trunk")?;
                let critic = self.build_value_net(env_description, &policy_vb, "trunk")?;
                let optimizer =
                    OptimizerWithMaxGrad::adam(policy_varmap, self.learning_rate, *max_grad_norm)?;
                (
                    distribution,
                    LearningModuleKind::Paralell(ParalellActorCriticLM { critic, optimizer }),
                )
            }
            LearningModuleType::Decoupled {
                policy_max_grad_norm,
                value_max_grad_norm,
            } => {
                let distribution =
                    self.build_distribution(env_description, &policy_vb, device, "policy")?;
                let value_varmap = VarMap::new();
                let value_vb = VarBuilder::from_varmap(&value_varmap, DType::F32, device);
                let critic = self.build_value_net(env_description, &value_vb, "value")?;
                let learning_module = LearningModuleKind::Decoupled(DecoupledActorCriticLM {
                    critic,
                    policy_optimizer: OptimizerWithMaxGrad::adam(
                        policy_varmap,
                        self.learning_rate,
                        *policy_max_grad_norm,
                    )?,
                    critic_optimizer: OptimizerWithMaxGrad::adam(
                        value_varmap,
                        self.learning_rate,
                        *value_max_grad_norm,
                    )?,
                });
                (distribution, learning_module)
            }
        };
        Ok((distribution, learning_module))
    }
}
