use arl_core::env::{Env, EnvironmentDescription, SnapShot, Space, action_index};
use candle_core::{Device, Error, Result, Tensor};
use pyo3::{
    Bound, PyAny, PyErr, PyObject, PyResult, Python,
    types::{PyAnyMethods, PyDict},
};

fn py_err(err: PyErr) -> Error {
    Error::Msg(format!("python error: {err}"))
}

// numpy arrays come back flattened, any dtype
fn extract_array(array: &Bound<'_, PyAny>) -> PyResult<Vec<f32>> {
    array
        .call_method0("flatten")?
        .call_method1("astype", ("float32",))?
        .call_method0("tolist")?
        .extract()
}

/// A `gymnasium` environment driven through the embedded Python interpreter.
pub struct GymEnv {
    env: PyObject,
    env_description: EnvironmentDescription,
    // RAM byte holding the current room, reported with every step
    room_ram_index: Option<usize>,
}

// Montezuma's Revenge keeps the room number in RAM byte 3.
const MONTEZUMA_ROOM_RAM_INDEX: usize = 3;

impl GymEnv {
    pub fn new(name: &str, render_mode: Option<String>) -> Result<GymEnv> {
        Python::with_gil(|py| {
            let gym = py.import("gymnasium")?;
            let kwargs = PyDict::new(py);
            if let Some(render_mode) = render_mode {
                kwargs.set_item("render_mode", render_mode)?;
            }
            let env = gym.getattr("make")?.call((name,), Some(&kwargs))?;
            Self::from_py(py, env)
        })
        .map_err(py_err)?
    }

    /// An Atari game with the standard preprocessing: no-op starts, `frame_skip` repeated
    /// actions, grayscale frames resized to `screen_size` squared. Observations have shape
    /// `[1, screen_size, screen_size]`, ready to be stacked. With `terminal_on_life_loss` a lost
    /// life ends the episode, which training usually wants and evaluation does not.
    /// Montezuma's Revenge reports the current room with every step.
    pub fn atari(
        name: &str,
        frame_skip: usize,
        screen_size: usize,
        terminal_on_life_loss: bool,
    ) -> Result<GymEnv> {
        let env = Python::with_gil(|py| {
            let gym = py.import("gymnasium")?;
            let ale = py.import("ale_py")?;
            gym.getattr("register_envs")?.call1((ale,))?;
            let kwargs = PyDict::new(py);
            kwargs.set_item("frameskip", 1)?;
            let env = gym.getattr("make")?.call((name,), Some(&kwargs))?;
            let kwargs = PyDict::new(py);
            kwargs.set_item("frame_skip", frame_skip)?;
            kwargs.set_item("screen_size", screen_size)?;
            kwargs.set_item("noop_max", 30)?;
            kwargs.set_item("terminal_on_life_loss", terminal_on_life_loss)?;
            kwargs.set_item("grayscale_obs", true)?;
            let wrappers = py.import("gymnasium.wrappers")?;
            let env = wrappers
                .getattr("AtariPreprocessing")?
                .call((env,), Some(&kwargs))?;
            Self::from_py(py, env)
        })
        .map_err(py_err)??;
        if name.contains("MontezumaRevenge") {
            Ok(env.with_room_ram_index(MONTEZUMA_ROOM_RAM_INDEX))
        } else {
            Ok(env)
        }
    }

    /// Reads the room from RAM byte `index` of the underlying Atari emulator after every step.
    pub fn with_room_ram_index(mut self, index: usize) -> Self {
        self.room_ram_index = Some(index);
        self
    }

    fn from_py(py: Python<'_>, env: Bound<'_, PyAny>) -> PyResult<Result<GymEnv>> {
        let gym_spaces = py.import("gymnasium.spaces")?;
        let action_space = env.getattr("action_space")?;
        let action_space = if action_space.is_instance(&gym_spaces.getattr("Discrete")?)? {
            Space::Discrete(action_space.getattr("n")?.extract()?)
        } else if action_space.is_instance(&gym_spaces.getattr("Box")?)? {
            let low = extract_array(&action_space.getattr("low")?)?;
            let high = extract_array(&action_space.getattr("high")?)?;
            match Space::bounded(low, high) {
                Ok(space) => space,
                Err(err) => return Ok(Err(err)),
            }
        } else {
            return Ok(Err(Error::Msg(format!(
                "unsupported action space {action_space}"
            ))));
        };
        let mut observation_shape: Vec<usize> =
            env.getattr("observation_space")?.getattr("shape")?.extract()?;
        // single channel images get an explicit channel axis
        if observation_shape.len() == 2 {
            observation_shape.insert(0, 1);
        }
        let observation_space = Space::continous_from_dims(&observation_shape);
        let env_description = EnvironmentDescription::new(observation_space, action_space)
            .with_observation_shape(observation_shape);
        Ok(Ok(GymEnv {
            env: env.unbind(),
            env_description,
            room_ram_index: None,
        }))
    }

    fn to_observation(&self, state: Vec<f32>) -> Result<Tensor> {
        Tensor::from_vec(
            state,
            self.env_description.observation_shape.as_slice(),
            &Device::Cpu,
        )
    }
}

impl Env for GymEnv {
    fn reset(&mut self, seed: u64) -> Result<Tensor> {
        let state = Python::with_gil(|py| {
            let kwargs = PyDict::new(py);
            kwargs.set_item("seed", seed)?;
            let reset = self.env.call_method(py, "reset", (), Some(&kwargs))?;
            extract_array(&reset.bind(py).get_item(0)?)
        })
        .map_err(py_err)?;
        self.to_observation(state)
    }

    fn step(&mut self, action: &Tensor) -> Result<SnapShot> {
        let step = match &self.env_description.action_space {
            Space::Continous {
                min: Some(min),
                max: Some(max),
                ..
            } => {
                let action = action
                    .flatten_all()?
                    .to_device(&Device::Cpu)?
                    .maximum(min)?
                    .minimum(max)?;
                StepAction::Continous(action.to_vec1()?)
            }
            Space::Continous { .. } => StepAction::Continous(action.flatten_all()?.to_vec1()?),
            Space::Discrete(_) => StepAction::Discrete(action_index(action)?),
        };
        let (state, reward, terminated, truncated, room) = Python::with_gil(|py| {
            let step = match step {
                StepAction::Continous(action) => self.env.call_method1(py, "step", (action,))?,
                StepAction::Discrete(action) => self.env.call_method1(py, "step", (action,))?,
            };
            let step = step.bind(py);
            let state = extract_array(&step.get_item(0)?)?;
            let reward: f32 = step.get_item(1)?.extract()?;
            let terminated: bool = step.get_item(2)?.extract()?;
            let truncated: bool = step.get_item(3)?.extract()?;
            let room: Option<usize> = match self.room_ram_index {
                Some(index) => {
                    let ram = self
                        .env
                        .bind(py)
                        .getattr("unwrapped")?
                        .getattr("ale")?
                        .call_method0("getRAM")?;
                    Some(ram.get_item(index)?.extract()?)
                }
                None => None,
            };
            PyResult::Ok((state, reward, terminated, truncated, room))
        })
        .map_err(py_err)?;
        let snapshot = SnapShot::new(self.to_observation(state)?, reward, terminated, truncated);
        Ok(match room {
            Some(room) => snapshot.with_room(room),
            None => snapshot,
        })
    }

    fn env_description(&self) -> EnvironmentDescription {
        self.env_description.clone()
    }
}

enum StepAction {
    Discrete(usize),
    Continous(Vec<f32>),
}
