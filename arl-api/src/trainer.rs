use crate::{
    utils::{
        checkpoint::{CheckpointMetadata, save_checkpoint},
        csv_writer::CsvWriter,
        evaluator::Evaluator,
        trackers::{
            Statistics, Tracker, TrackerKind, generate_statistics, make_default_trackers,
            reset_trackers,
        },
    },
};
use arl_agents::AgentKind;
use arl_core::{
    Algorithm,
    agents::Agent,
    env::{Env, RolloutMode},
    on_policy_algorithm::{
        LearningSchedule, OnPolicyAlgorithm, OnPolicyAlgorithmHooks, rollout_stats,
    },
    sampler::Sampler,
    utils::rollout_buffer::RolloutBuffer,
};
use candle_core::Result;
use std::{fmt, path::PathBuf};

/// Feeds every collected transition to the trackers and stops training after a fixed number of
/// environment steps.
pub struct TrackingHooks {
    pub trackers: Vec<TrackerKind>,
    learning_schedule: LearningSchedule,
    schedule_exhausted: bool,
    rollout_idx: usize,
}

impl TrackingHooks {
    pub fn new(trackers: Vec<TrackerKind>) -> Self {
        Self {
            trackers,
            learning_schedule: LearningSchedule::total_step_bound(0),
            schedule_exhausted: false,
            rollout_idx: 0,
        }
    }

    pub fn start_iteration(&mut self, num_train_steps: usize) {
        reset_trackers(&mut self.trackers);
        self.learning_schedule = LearningSchedule::total_step_bound(num_train_steps);
        self.schedule_exhausted = false;
    }
}

impl OnPolicyAlgorithmHooks for TrackingHooks {
    fn post_rollout_hook(&mut self, rollouts: &mut [RolloutBuffer]) -> bool {
        for (env_idx, rb) in rollouts.iter().enumerate() {
            for ((reward, done), room) in rb.raw_rewards.iter().zip(&rb.dones).zip(&rb.rooms) {
                for tracker in self.trackers.iter_mut() {
                    if let Some(room) = room {
                        tracker.visit_room(env_idx, *room);
                    }
                    tracker.step(env_idx, *reward, *done);
                }
            }
        }
        let (total_reward, episodes) = rollout_stats(rollouts);
        log::debug!(
            "rollout: {:<4} episodes: {:<4} total reward: {:.2}",
            self.rollout_idx,
            episodes,
            total_reward
        );
        self.rollout_idx += 1;
        self.schedule_exhausted = self.learning_schedule.advance(rollouts);
        false
    }

    fn post_training_hook(&mut self) -> bool {
        self.schedule_exhausted
    }
}

#[derive(Debug, Clone)]
pub struct TrainerConfig {
    pub environment_name: String,
    pub num_iterations: usize,
    /// Environment steps collected per iteration, over every env of the pool.
    pub num_train_steps: usize,
    pub num_eval_steps: usize,
    /// Frames per environment step, e.g. the frame skip of Atari games.
    pub step_multiplier: usize,
    pub results_csv_path: Option<PathBuf>,
    pub checkpoint_dir: Option<PathBuf>,
    pub tensorboard_log_dir: Option<String>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            environment_name: "CartPole-v1".into(),
            num_iterations: 10,
            num_train_steps: 10_000,
            num_eval_steps: 2_000,
            step_multiplier: 1,
            results_csv_path: None,
            checkpoint_dir: None,
            tensorboard_log_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IterationLog {
    pub iteration: usize,
    pub step: usize,
    pub train_step_rate: f64,
    pub train_episode_return: f64,
    pub train_num_episodes: usize,
    pub eval_episode_return: f64,
    pub eval_num_episodes: usize,
    pub train_episode_visited_rooms: f64,
    pub eval_episode_visited_rooms: f64,
}

impl IterationLog {
    fn new(
        iteration: usize,
        step: usize,
        train_stats: &Statistics,
        eval_stats: &Statistics,
    ) -> Self {
        let stat = |stats: &Statistics, key: &str| stats.get(key).copied().unwrap_or(f64::NAN);
        Self {
            iteration,
            step,
            train_step_rate: stat(train_stats, "step_rate"),
            train_episode_return: stat(train_stats, "mean_episode_return"),
            train_num_episodes: stat(train_stats, "num_episodes") as usize,
            eval_episode_return: stat(eval_stats, "mean_episode_return"),
            eval_num_episodes: stat(eval_stats, "num_episodes") as usize,
            train_episode_visited_rooms: stat(train_stats, "mean_episode_visited_rooms"),
            eval_episode_visited_rooms: stat(eval_stats, "mean_episode_visited_rooms"),
        }
    }

    pub fn row(&self) -> Vec<(&'static str, String)> {
        vec![
            ("iteration", self.iteration.to_string()),
            ("step", self.step.to_string()),
            ("train_step_rate", format!("{:.2}", self.train_step_rate)),
            ("train_episode_return", format!("{:.2}", self.train_episode_return)),
            ("train_num_episodes", self.train_num_episodes.to_string()),
            ("eval_episode_return", format!("{:.2}", self.eval_episode_return)),
            ("eval_num_episodes", self.eval_num_episodes.to_string()),
            (
                "train_episode_visited_rooms",
                format!("{:.2}", self.train_episode_visited_rooms),
            ),
            (
                "eval_episode_visited_rooms",
                format!("{:.2}", self.eval_episode_visited_rooms),
            ),
        ]
    }
}

impl fmt::Display for IterationLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "iteration: {:3}, step: {:5}, train_step_rate: {:.2}, train_episode_return: {:.2}, \
             train_num_episodes: {:3}, eval_episode_return: {:.2}, eval_num_episodes: {:3}",
            self.iteration,
            self.step,
            self.train_step_rate,
            self.train_episode_return,
            self.train_num_episodes,
            self.eval_episode_return,
            self.eval_num_episodes
        )
    }
}

/// The loop every chapter program runs: train for a number of steps, evaluate the greedy policy
/// in a separate environment, log, append a CSV row and write a checkpoint.
pub struct Trainer<S: Sampler, E: Env> {
    pub algorithm: OnPolicyAlgorithm<S, AgentKind, TrackingHooks>,
    pub evaluator: Evaluator<E>,
    pub config: TrainerConfig,
    csv_writer: Option<CsvWriter>,
}

impl<S: Sampler, E: Env> Trainer<S, E> {
    pub fn new(
        sampler: S,
        agent: AgentKind,
        eval_env: E,
        rollout_mode: RolloutMode,
        config: TrainerConfig,
    ) -> Result<Self> {
        assert!(config.num_iterations > 0, "num_iterations must be positive");
        assert!(config.step_multiplier > 0, "step_multiplier must be positive");
        let trackers = make_default_trackers(config.tensorboard_log_dir.as_deref())?;
        let csv_writer = config
            .results_csv_path
            .as_ref()
            .map(CsvWriter::new)
            .transpose()?;
        Ok(Self {
            algorithm: OnPolicyAlgorithm {
                sampler,
                agent,
                hooks: TrackingHooks::new(trackers),
                rollout_mode,
            },
            evaluator: Evaluator::new(eval_env),
            config,
            csv_writer,
        })
    }

    fn checkpoint_path(&self, iteration: usize) -> Option<PathBuf> {
        let dir = self.config.checkpoint_dir.as_ref()?;
        if !dir.is_dir() {
            return None;
        }
        let env_name = self.config.environment_name.replace('/', "_");
        Some(dir.join(format!("{env_name}_iteration_{iteration}.safetensors")))
    }

    pub fn run_iteration(&mut self, iteration: usize) -> Result<IterationLog> {
        self.algorithm
            .hooks
            .start_iteration(self.config.num_train_steps);
        self.algorithm.train()?;
        let train_stats = generate_statistics(&self.algorithm.hooks.trackers);

        let mut eval_trackers = make_default_trackers(None)?;
        self.evaluator.run(
            self.algorithm.agent.distribution(),
            self.config.num_eval_steps,
            &mut eval_trackers,
        )?;
        let eval_stats = generate_statistics(&eval_trackers);

        let step = iteration * self.config.num_train_steps * self.config.step_multiplier;
        let iteration_log = IterationLog::new(iteration, step, &train_stats, &eval_stats);
        log::info!("{iteration_log}");
        if let Some(csv_writer) = self.csv_writer.as_mut() {
            csv_writer.write(&iteration_log.row())?;
        }
        if let Some(path) = self.checkpoint_path(iteration) {
            let varmaps = self.algorithm.agent.learning_module().varmaps();
            let metadata = CheckpointMetadata {
                iteration,
                environment: self.config.environment_name.clone(),
            };
            save_checkpoint(&varmaps, &path, metadata)?;
            log::debug!("checkpoint written to {}", path.display());
        }
        Ok(iteration_log)
    }

    pub fn run(&mut self) -> Result<Vec<IterationLog>> {
        (1..=self.config.num_iterations)
            .map(|iteration| self.run_iteration(iteration))
            .collect()
    }
}
