pub mod classic_control;
pub mod go;
#[cfg(feature = "python")]
pub mod gym;
pub mod wrappers;

use arl_core::env::Env;
use candle_core::{Error, Result};
use classic_control::{cartpole::CartPole, mountain_car::MountainCar, pendulum::Pendulum};
use wrappers::time_limit::TimeLimit;

pub type BoxedEnv = Box<dyn Env + Send>;

/// Builds one of the built in environments with its usual episode limit.
pub fn make_env(name: &str) -> Result<BoxedEnv> {
    let env: BoxedEnv = match name {
        "CartPole-v1" => Box::new(TimeLimit::new(CartPole::default(), 500)),
        "MountainCar-v0" => Box::new(TimeLimit::new(MountainCar::default(), 200)),
        "Pendulum-v1" => Box::new(TimeLimit::new(Pendulum::default(), 200)),
        #[cfg(feature = "python")]
        name => Box::new(gym::GymEnv::new(name, None)?),
        #[cfg(not(feature = "python"))]
        name => {
            return Err(Error::Msg(format!(
                "unknown environment {name}, build with the `python` feature for gymnasium envs"
            )));
        }
    };
    Ok(env)
}

/// `n` independent copies of the named environment.
pub fn make_envs(name: &str, n: usize) -> Result<Vec<BoxedEnv>> {
    if n == 0 {
        return Err(Error::Msg("at least one environment is required".into()));
    }
    (0..n).map(|_| make_env(name)).collect()
}
