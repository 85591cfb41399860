use super::{ActorCriticBuilder, LearningModuleType, Network};
use arl_agents::{
    a2c::{A2C, DefaultA2CHooks},
    ppo::{PPO, PPOHooksTrait, hooks::DefaultPPOHooks},
    vpg::VPG,
};
use arl_core::{
    distributions::DistributionKind, env::EnvironmentDescription,
    policies::learning_modules::LearningModuleKind,
};
use candle_core::{Device, Result};

pub type PPOKind = PPO<DistributionKind, LearningModuleKind>;

#[derive(Debug, Clone)]
pub struct PPOBuilder {
    pub actor_critic: ActorCriticBuilder,
    pub clip_range: f32,
    pub gamma: f32,
    pub lambda: f32,
    pub sample_size: usize,
    pub n_epochs: usize,
    pub ent_coef: f32,
    pub vf_coef: f32,
    pub target_kl: Option<f32>,
}

impl Default for PPOBuilder {
    fn default() -> Self {
        Self {
            actor_critic: ActorCriticBuilder::default(),
            clip_range: 0.2,
            gamma: 0.99,
            lambda: 0.95,
            sample_size: 64,
            n_epochs: 4,
            ent_coef: 0.,
            vf_coef: 0.5,
            target_kl: None,
        }
    }
}

impl PPOBuilder {
    pub fn default_hooks(&self) -> DefaultPPOHooks {
        DefaultPPOHooks::new(self.n_epochs, self.ent_coef, self.vf_coef, self.target_kl)
    }

    pub fn build(&self, env_description: &EnvironmentDescription, device: &Device) -> Result<PPOKind> {
        self.build_with_hooks(env_description, device, Box::new(self.default_hooks()))
    }

    pub fn build_with_hooks(
        &self,
        env_description: &EnvironmentDescription,
        device: &Device,
        hooks: Box<dyn PPOHooksTrait<DistributionKind, LearningModuleKind>>,
    ) -> Result<PPOKind> {
        assert!(
            self.clip_range > 0. && self.clip_range < 1.,
            "clip_range must be in (0, 1)"
        );
        assert!((0. ..=1.).contains(&self.gamma), "gamma must be in [0, 1]");
        assert!((0. ..=1.).contains(&self.lambda), "lambda must be in [0, 1]");
        let (distribution, learning_module) = self.actor_critic.build(env_description, device)?;
        Ok(PPO {
            distribution,
            learning_module,
            hooks,
            clip_range: self.clip_range,
            gamma: self.gamma,
            lambda: self.lambda,
            sample_size: self.sample_size,
            device: device.clone(),
        })
    }
}

/// Defaults of the chapter 9 actor-critic: one optimizer over a shared parameter set, gradients
/// clipped at norm 5.
#[derive(Debug, Clone)]
pub struct A2CBuilder {
    pub actor_critic: ActorCriticBuilder,
    pub gamma: f32,
    pub lambda: f32,
    pub ent_coef: f32,
    pub value_coef: f32,
    pub sample_size: Option<usize>,
}

impl Default for A2CBuilder {
    fn default() -> Self {
        Self {
            actor_critic: ActorCriticBuilder {
                network: Network::Mlp {
                    hidden: vec![64, 64],
                },
                learning_module_type: LearningModuleType::Paralell {
                    max_grad_norm: Some(5.),
                },
                learning_rate: 2.5e-4,
                init_log_std: 0.,
            },
            gamma: 0.99,
            lambda: 1.,
            ent_coef: 0.025,
            value_coef: 0.5,
            sample_size: None,
        }
    }
}

impl A2CBuilder {
    pub fn build(
        &self,
        env_description: &EnvironmentDescription,
        device: &Device,
    ) -> Result<A2C<DistributionKind, LearningModuleKind>> {
        assert!((0. ..=1.).contains(&self.gamma), "gamma must be in [0, 1]");
        let (distribution, learning_module) = self.actor_critic.build(env_description, device)?;
        Ok(A2C {
            distribution,
            learning_module,
            hooks: Box::new(DefaultA2CHooks),
            device: device.clone(),
            gamma: self.gamma,
            lambda: self.lambda,
            ent_coef: self.ent_coef,
            value_coef: self.value_coef,
            sample_size: self.sample_size,
        })
    }
}

#[derive(Debug, Clone)]
pub struct VPGBuilder {
    pub actor_critic: ActorCriticBuilder,
    pub gamma: f32,
    pub baseline: bool,
}

impl Default for VPGBuilder {
    fn default() -> Self {
        Self {
            actor_critic: ActorCriticBuilder {
                learning_rate: 2e-3,
                ..Default::default()
            },
            gamma: 0.99,
            baseline: true,
        }
    }
}

impl VPGBuilder {
    pub fn build(
        &self,
        env_description: &EnvironmentDescription,
        device: &Device,
    ) -> Result<VPG<DistributionKind, LearningModuleKind>> {
        assert!((0. ..=1.).contains(&self.gamma), "gamma must be in [0, 1]");
        let (distribution, learning_module) = self.actor_critic.build(env_description, device)?;
        Ok(VPG {
            distribution,
            learning_module,
            device: device.clone(),
            gamma: self.gamma,
            baseline: self.baseline,
        })
    }
}
