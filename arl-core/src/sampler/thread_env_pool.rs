use super::{EnvSlot, Sampler};
use crate::{
    distributions::Distribution,
    env::{Env, EnvironmentDescription, RolloutMode},
    rng::seed_rng,
    utils::rollout_buffer::RolloutBuffer,
};
use candle_core::{Error, Result};
use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use std::{
    any::Any,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
    thread::JoinHandle,
    time::Duration,
};

// how often a waiting learner checks for actors that died without answering
const WORKER_POLL_INTERVAL: Duration = Duration::from_millis(200);

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

pub enum WorkerTask {
    Rollout {
        distr: Arc<dyn Distribution>,
        rollout_mode: RolloutMode,
    },
    Shutdown,
}

pub struct WorkerResult {
    env_idx: usize,
    rollout: Result<RolloutBuffer>,
}

struct WorkerThread<E: Env> {
    env_idx: usize,
    slot: EnvSlot<E>,
    task_rx: Receiver<WorkerTask>,
    result_tx: Sender<WorkerResult>,
}

impl<E: Env> WorkerThread<E> {
    fn work(mut self) {
        while let Ok(task) = self.task_rx.recv() {
            match task {
                WorkerTask::Rollout {
                    distr,
                    rollout_mode,
                } => {
                    let slot = &mut self.slot;
                    let rollout = catch_unwind(AssertUnwindSafe(|| {
                        slot.rollout(distr.as_ref(), rollout_mode)
                    }))
                    .unwrap_or_else(|payload| {
                        Err(Error::Msg(format!(
                            "actor {} panicked: {}",
                            self.env_idx,
                            panic_message(payload)
                        )))
                    });
                    let result = WorkerResult {
                        env_idx: self.env_idx,
                        rollout,
                    };
                    if self.result_tx.send(result).is_err() {
                        break;
                    }
                }
                WorkerTask::Shutdown => break,
            }
        }
        log::debug!("actor {} shutting down", self.env_idx);
    }
}

/// One actor thread per environment. Every rollout hands the actors a snapshot of the current
/// policy and gathers their buffers on a shared result channel.
pub struct ThreadEnvPool {
    worker_txs: Vec<Sender<WorkerTask>>,
    result_rx: Receiver<WorkerResult>,
    handles: Vec<JoinHandle<()>>,
    env_description: EnvironmentDescription,
}

impl ThreadEnvPool {
    /// Moves every env onto its own thread. Actor `i` seeds its generator with `seed + i`.
    pub fn new<E: Env + Send + 'static>(envs: Vec<E>, seed: u64) -> Result<Self> {
        let Some(first) = envs.first() else {
            return Err(Error::Msg("an env pool needs at least one env".into()));
        };
        let env_description = first.env_description();
        let (result_tx, result_rx) = unbounded();
        let mut worker_txs = Vec::with_capacity(envs.len());
        let mut handles = Vec::with_capacity(envs.len());
        for (env_idx, env) in envs.into_iter().enumerate() {
            let (task_tx, task_rx) = unbounded();
            let worker = WorkerThread {
                env_idx,
                slot: EnvSlot::new(env),
                task_rx,
                result_tx: result_tx.clone(),
            };
            let handle = std::thread::Builder::new()
                .name(format!("actor-{env_idx}"))
                .spawn(move || {
                    seed_rng(seed.wrapping_add(env_idx as u64));
                    worker.work()
                })
                .map_err(Error::wrap)?;
            worker_txs.push(task_tx);
            handles.push(handle);
        }
        Ok(Self {
            worker_txs,
            result_rx,
            handles,
            env_description,
        })
    }
}

impl Sampler for ThreadEnvPool {
    fn env_description(&self) -> EnvironmentDescription {
        self.env_description.clone()
    }

    fn num_envs(&self) -> usize {
        self.worker_txs.len()
    }

    fn collect_rollouts<D: Distribution + Clone + 'static>(
        &mut self,
        distr: &D,
        rollout_mode: RolloutMode,
    ) -> Result<Vec<RolloutBuffer>> {
        let distr: Arc<dyn Distribution> = Arc::new(distr.clone());
        for tx in self.worker_txs.iter() {
            let task = WorkerTask::Rollout {
                distr: distr.clone(),
                rollout_mode,
            };
            tx.send(task).map_err(Error::wrap)?;
        }
        // drain every actor before reporting a failure so the next rollout starts clean
        let mut rollouts: Vec<Option<Result<RolloutBuffer>>> =
            (0..self.num_envs()).map(|_| None).collect();
        let mut received = 0;
        while received < self.num_envs() {
            match self.result_rx.recv_timeout(WORKER_POLL_INTERVAL) {
                Ok(WorkerResult { env_idx, rollout }) => {
                    rollouts[env_idx] = Some(rollout);
                    received += 1;
                }
                Err(RecvTimeoutError::Timeout) => {
                    // a result sent right before the actor exited may still be queued
                    while let Ok(WorkerResult { env_idx, rollout }) = self.result_rx.try_recv() {
                        rollouts[env_idx] = Some(rollout);
                        received += 1;
                    }
                    let dead = self
                        .handles
                        .iter()
                        .zip(rollouts.iter())
                        .position(|(handle, rollout)| handle.is_finished() && rollout.is_none());
                    if let Some(env_idx) = dead {
                        return Err(Error::Msg(format!(
                            "actor {env_idx} stopped without returning a rollout"
                        )));
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(Error::Msg("every actor has stopped".into()));
                }
            }
        }
        rollouts
            .into_iter()
            .map(|rollout| {
                rollout.unwrap_or_else(|| Err(Error::Msg("an actor returned no rollout".into())))
            })
            .collect()
    }
}

impl Drop for ThreadEnvPool {
    fn drop(&mut self) {
        for tx in self.worker_txs.iter() {
            let _ = tx.send(WorkerTask::Shutdown);
        }
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                log::error!("an actor thread panicked");
            }
        }
    }
}
