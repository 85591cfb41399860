//! Trackers collect statistics from the stream of transitions an agent produces.

use candle_core::{Error, Result};
use enum_dispatch::enum_dispatch;
use std::{
    collections::{BTreeMap, BTreeSet},
    path::Path,
    sync::{Arc, Mutex},
    time::Instant,
};
use tensorboard_rs::summary_writer::SummaryWriter;

pub type Statistics = BTreeMap<&'static str, f64>;

#[enum_dispatch]
pub trait Tracker {
    /// Accounts for one transition taken in environment `env_idx`.
    fn step(&mut self, env_idx: usize, reward: f32, done: bool);

    /// Reports the room the next transition of `env_idx` ends in. Called before its `step`.
    fn visit_room(&mut self, _env_idx: usize, _room: usize) {}

    /// Clears the gathered statistics. Episodes still in progress carry over, so an episode
    /// spanning a reset is reported with its full return once it finishes.
    fn reset(&mut self);

    fn get(&self) -> Statistics;
}

#[enum_dispatch(Tracker)]
pub enum TrackerKind {
    Episode(EpisodeTracker),
    StepRate(StepRateTracker),
    TensorboardEpisode(TensorboardEpisodeTracker),
    TensorboardStepRate(TensorboardStepRateTracker),
}

#[derive(Debug, Default, Clone)]
pub struct EpisodeTracker {
    num_steps_since_reset: usize,
    episode_returns: Vec<f32>,
    episode_steps: Vec<usize>,
    episode_visited_rooms: Vec<usize>,
    current_returns: Vec<f32>,
    current_steps: Vec<usize>,
    current_rooms: Vec<BTreeSet<usize>>,
}

impl EpisodeTracker {
    fn ensure_env(&mut self, env_idx: usize) {
        if self.current_returns.len() <= env_idx {
            self.current_returns.resize(env_idx + 1, 0.);
            self.current_steps.resize(env_idx + 1, 0);
            self.current_rooms.resize(env_idx + 1, BTreeSet::new());
        }
    }

    /// Distinct rooms of the last finished episode that reported any.
    pub fn last_visited_rooms(&self) -> Option<usize> {
        self.episode_visited_rooms.last().copied()
    }

    pub fn last_episode(&self) -> Option<(f32, usize)> {
        Some((*self.episode_returns.last()?, *self.episode_steps.last()?))
    }
}

impl Tracker for EpisodeTracker {
    fn step(&mut self, env_idx: usize, reward: f32, done: bool) {
        self.ensure_env(env_idx);
        self.current_returns[env_idx] += reward;
        self.current_steps[env_idx] += 1;
        self.num_steps_since_reset += 1;
        if done {
            self.episode_returns.push(self.current_returns[env_idx]);
            self.episode_steps.push(self.current_steps[env_idx]);
            self.current_returns[env_idx] = 0.;
            self.current_steps[env_idx] = 0;
            let rooms = std::mem::take(&mut self.current_rooms[env_idx]);
            if !rooms.is_empty() {
                self.episode_visited_rooms.push(rooms.len());
            }
        }
    }

    fn visit_room(&mut self, env_idx: usize, room: usize) {
        self.ensure_env(env_idx);
        self.current_rooms[env_idx].insert(room);
    }

    fn reset(&mut self) {
        self.num_steps_since_reset = 0;
        self.episode_returns.clear();
        self.episode_steps.clear();
        self.episode_visited_rooms.clear();
    }

    /// `mean_episode_return` is the mean over finished episodes. Without a finished episode it
    /// falls back to the return of the episodes in progress, and to NaN when nothing was stepped.
    /// `current_episode_step` is the length of the longest episode in progress over all envs.
    /// `mean_episode_visited_rooms` is 0 until an episode reporting rooms finishes.
    fn get(&self) -> Statistics {
        let mean_episode_return = if !self.episode_returns.is_empty() {
            self.episode_returns.iter().map(|r| *r as f64).sum::<f64>()
                / self.episode_returns.len() as f64
        } else if self.num_steps_since_reset > 0 {
            let running: Vec<f64> = self
                .current_returns
                .iter()
                .zip(self.current_steps.iter())
                .filter(|(_, steps)| **steps > 0)
                .map(|(r, _)| *r as f64)
                .collect();
            running.iter().sum::<f64>() / running.len().max(1) as f64
        } else {
            f64::NAN
        };
        let mean_episode_visited_rooms = if self.episode_visited_rooms.is_empty() {
            0.
        } else {
            self.episode_visited_rooms.iter().sum::<usize>() as f64
                / self.episode_visited_rooms.len() as f64
        };
        Statistics::from([
            ("mean_episode_return", mean_episode_return),
            ("mean_episode_visited_rooms", mean_episode_visited_rooms),
            ("num_episodes", self.episode_returns.len() as f64),
            (
                "current_episode_step",
                self.current_steps.iter().copied().max().unwrap_or(0) as f64,
            ),
            ("num_steps_since_reset", self.num_steps_since_reset as f64),
        ])
    }
}

#[derive(Debug, Clone)]
pub struct StepRateTracker {
    num_steps_since_reset: usize,
    start: Instant,
}

impl Default for StepRateTracker {
    fn default() -> Self {
        Self {
            num_steps_since_reset: 0,
            start: Instant::now(),
        }
    }
}

impl Tracker for StepRateTracker {
    fn step(&mut self, _env_idx: usize, _reward: f32, _done: bool) {
        self.num_steps_since_reset += 1;
    }

    fn reset(&mut self) {
        *self = Self::default();
    }

    fn get(&self) -> Statistics {
        let duration = self.start.elapsed().as_secs_f64();
        let step_rate = if self.num_steps_since_reset > 0 {
            self.num_steps_since_reset as f64 / duration
        } else {
            f64::NAN
        };
        Statistics::from([
            ("step_rate", step_rate),
            ("num_steps", self.num_steps_since_reset as f64),
            ("duration", duration),
        ])
    }
}

pub type SharedSummaryWriter = Arc<Mutex<SummaryWriter>>;

fn write_scalars(writer: &SharedSummaryWriter, scalars: &[(&str, f32)], step: usize) {
    match writer.lock() {
        Ok(mut writer) => {
            for (tag, value) in scalars {
                writer.add_scalar(tag, *value, step);
            }
        }
        Err(_) => log::warn!("summary writer lock poisoned, dropping scalars"),
    }
}

/// Writes every finished episode to tensorboard. Totals survive `reset`.
pub struct TensorboardEpisodeTracker {
    inner: EpisodeTracker,
    writer: SharedSummaryWriter,
    total_steps: usize,
    total_episodes: usize,
}

impl TensorboardEpisodeTracker {
    pub fn new(writer: SharedSummaryWriter) -> Self {
        Self {
            inner: EpisodeTracker::default(),
            writer,
            total_steps: 0,
            total_episodes: 0,
        }
    }
}

impl Tracker for TensorboardEpisodeTracker {
    fn step(&mut self, env_idx: usize, reward: f32, done: bool) {
        self.inner.step(env_idx, reward, done);
        self.total_steps += 1;
        if !done {
            return;
        }
        self.total_episodes += 1;
        if let Some((episode_return, episode_steps)) = self.inner.last_episode() {
            let mut scalars = vec![
                (
                    "performance(env_steps)/num_episodes",
                    self.total_episodes as f32,
                ),
                ("performance(env_steps)/episode_return", episode_return),
                ("performance(env_steps)/episode_steps", episode_steps as f32),
            ];
            if let Some(rooms) = self.inner.last_visited_rooms() {
                scalars.push(("performance(env_steps)/episode_visited_rooms", rooms as f32));
            }
            write_scalars(&self.writer, &scalars, self.total_steps);
        }
    }

    fn visit_room(&mut self, env_idx: usize, room: usize) {
        self.inner.visit_room(env_idx, room);
    }

    fn reset(&mut self) {
        self.inner.reset();
    }

    fn get(&self) -> Statistics {
        self.inner.get()
    }
}

pub struct TensorboardStepRateTracker {
    inner: StepRateTracker,
    writer: SharedSummaryWriter,
    total_steps: usize,
}

impl TensorboardStepRateTracker {
    pub fn new(writer: SharedSummaryWriter) -> Self {
        Self {
            inner: StepRateTracker::default(),
            writer,
            total_steps: 0,
        }
    }
}

impl Tracker for TensorboardStepRateTracker {
    fn step(&mut self, env_idx: usize, reward: f32, done: bool) {
        self.inner.step(env_idx, reward, done);
        self.total_steps += 1;
        if done {
            let step_rate = self.inner.get()["step_rate"] as f32;
            write_scalars(
                &self.writer,
                &[("performance(env_steps)/step_rate", step_rate)],
                self.total_steps,
            );
        }
    }

    fn reset(&mut self) {
        self.inner.reset();
    }

    fn get(&self) -> Statistics {
        self.inner.get()
    }
}

/// Episode and step rate trackers. With a `log_dir` the tensorboard variants are added too,
/// writing to `runs/{log_dir}`.
pub fn make_default_trackers(log_dir: Option<&str>) -> Result<Vec<TrackerKind>> {
    let mut trackers: Vec<TrackerKind> = vec![
        EpisodeTracker::default().into(),
        StepRateTracker::default().into(),
    ];
    if let Some(log_dir) = log_dir {
        let log_dir = Path::new("runs").join(log_dir);
        std::fs::create_dir_all(&log_dir).map_err(Error::wrap)?;
        let writer = Arc::new(Mutex::new(SummaryWriter::new(&log_dir)));
        trackers.push(TensorboardEpisodeTracker::new(writer.clone()).into());
        trackers.push(TensorboardStepRateTracker::new(writer).into());
    }
    reset_trackers(&mut trackers);
    Ok(trackers)
}

pub fn reset_trackers(trackers: &mut [TrackerKind]) {
    for tracker in trackers.iter_mut() {
        tracker.reset();
    }
}

/// Merges the statistics of every tracker. On a key clash the earlier tracker wins.
pub fn generate_statistics(trackers: &[TrackerKind]) -> Statistics {
    let mut statistics = Statistics::new();
    for tracker in trackers {
        for (key, value) in tracker.get() {
            statistics.entry(key).or_insert(value);
        }
    }
    statistics
}

#[cfg(test)]
mod test {
    use super::{
        EpisodeTracker, StepRateTracker, Tracker, TrackerKind, generate_statistics,
        make_default_trackers,
    };

    #[test]
    fn mean_return_of_finished_episodes() {
        let mut tracker = EpisodeTracker::default();
        for (reward, done) in [(1., false), (1., true), (3., true), (5., false)] {
            tracker.step(0, reward, done);
        }
        let stats = tracker.get();
        assert_eq!(stats["mean_episode_return"], 2.5);
        assert_eq!(stats["num_episodes"], 2.);
        assert_eq!(stats["current_episode_step"], 1.);
        assert_eq!(stats["num_steps_since_reset"], 4.);
    }

    #[test]
    fn partial_return_without_finished_episode() {
        let mut tracker = EpisodeTracker::default();
        assert!(tracker.get()["mean_episode_return"].is_nan());
        tracker.step(0, 2., false);
        tracker.step(0, -0.5, false);
        assert_eq!(tracker.get()["mean_episode_return"], 1.5);
        tracker.reset();
        assert!(tracker.get()["mean_episode_return"].is_nan());
    }

    #[test]
    fn episode_spanning_a_reset_keeps_its_head() {
        let mut tracker = EpisodeTracker::default();
        for _ in 0..7 {
            tracker.step(0, 1., false);
        }
        tracker.reset();
        for step in 0..3 {
            tracker.step(0, 1., step == 2);
        }
        let stats = tracker.get();
        assert_eq!(stats["mean_episode_return"], 10.);
        assert_eq!(stats["num_episodes"], 1.);
        assert_eq!(stats["num_steps_since_reset"], 3.);
        assert_eq!(tracker.last_episode(), Some((10., 10)));
    }

    #[test]
    fn visited_rooms_are_counted_per_episode() {
        let mut tracker = EpisodeTracker::default();
        assert_eq!(tracker.get()["mean_episode_visited_rooms"], 0.);
        for (room, done) in [(1, false), (1, false), (2, false), (3, true), (1, true)] {
            tracker.visit_room(0, room);
            tracker.step(0, 0., done);
        }
        // an episode without room reports stays out of the mean
        tracker.step(1, 0., true);
        assert_eq!(tracker.get()["mean_episode_visited_rooms"], 2.);
        assert_eq!(tracker.last_visited_rooms(), Some(1));
        tracker.reset();
        assert_eq!(tracker.get()["mean_episode_visited_rooms"], 0.);
    }

    #[test]
    fn current_episode_step_is_the_longest_running_episode() {
        let mut tracker = EpisodeTracker::default();
        tracker.step(0, 0., true);
        for _ in 0..4 {
            tracker.step(1, 0., false);
        }
        tracker.step(2, 0., false);
        assert_eq!(tracker.get()["current_episode_step"], 4.);
    }

    #[test]
    fn episodes_of_interleaved_envs_stay_apart() {
        let mut tracker = EpisodeTracker::default();
        tracker.step(0, 1., false);
        tracker.step(1, 10., false);
        tracker.step(0, 1., true);
        tracker.step(1, 10., true);
        let stats = tracker.get();
        assert_eq!(stats["mean_episode_return"], 11.);
        assert_eq!(stats["num_episodes"], 2.);
    }

    #[test]
    fn step_rate_is_nan_before_the_first_step() {
        let mut tracker = StepRateTracker::default();
        assert!(tracker.get()["step_rate"].is_nan());
        tracker.step(0, 0., false);
        assert_eq!(tracker.get()["num_steps"], 1.);
    }

    #[test]
    fn statistics_merge_every_tracker() -> candle_core::Result<()> {
        let mut trackers = make_default_trackers(None)?;
        assert_eq!(trackers.len(), 2);
        for tracker in trackers.iter_mut() {
            tracker.step(0, 1., true);
        }
        let stats = generate_statistics(&trackers);
        assert_eq!(stats["num_episodes"], 1.);
        assert_eq!(stats["num_steps"], 1.);
        assert!(matches!(trackers[0], TrackerKind::Episode(_)));
        Ok(())
    }
}
