#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Per-team control loop.
//!
//! Each [`ControlLoop`] owns one background thread that waits for the
//! match-start signal and then ticks at a fixed cadence: the selected
//! [`Mode`] writes waypoints and actuator flags, after which every robot of
//! the team either has its speeds re-derived or, when its tracking data is
//! stale, is forced to a stop.

mod mode;

use std::{
    sync::{
        mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError},
        Arc, Mutex, PoisonError,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};
use ssl_strategy_core::{Pose, Speeds, Team, WorldModel};
use ssl_strategy_system_roles::TeamStrategy;
use thiserror::Error;

pub use mode::{Assignment, Lineup, Mode};

/// Cadence and diagnostics settings of a control loop.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlTuning {
    /// Sleep between ticks in milliseconds.
    pub tick_interval_ms: u64,
    /// Multiple of the tick interval above which a tick period is reported.
    pub overrun_factor: f32,
    /// Slice length used while waiting for the match to start.
    pub start_poll_ms: u64,
    /// Pose the pass receiver waits at in the pass demonstration.
    pub pass_reception: Pose,
}

impl Default for ControlTuning {
    fn default() -> Self {
        Self {
            tick_interval_ms: 20,
            overrun_factor: 3.0,
            start_poll_ms: 50,
            pass_reception: Pose::facing(3_200.0, 200.0, 0.0),
        }
    }
}

impl ControlTuning {
    /// Tick interval as a [`Duration`].
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    fn start_poll(&self) -> Duration {
        Duration::from_millis(self.start_poll_ms.max(1))
    }
}

/// Failures of starting or stopping a control loop.
#[derive(Debug, Error)]
pub enum ControlError {
    /// `start` was called while the loop was already running.
    #[error("control loop is already running")]
    AlreadyRunning,
    /// The operating system refused to create the loop thread.
    #[error("failed to spawn control thread")]
    Spawn(#[from] std::io::Error),
    /// The loop thread panicked before it could be joined.
    #[error("control thread panicked")]
    Panicked,
}

/// Runs one tick for the strategy's team.
///
/// The mode's decisions are applied first. Every registered robot then
/// either has its speeds derived from its live pose, or has them zeroed
/// when the world model reports it lost.
pub fn tick<W: WorldModel>(
    world: &W,
    strategy: &mut TeamStrategy,
    mode: &Mode,
    tuning: &ControlTuning,
) {
    mode::run(mode, world, strategy, tuning.pass_reception);

    let team = strategy.team();
    for robot in world.team_robots(team) {
        if world.is_robot_lost(team, robot) {
            let _ = world.update_robot_commands(team, robot, |command| {
                command.set_speeds(Speeds::ZERO);
            });
        } else {
            world.derive_speeds(team, robot);
        }
    }
}

struct Running {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

/// Background scheduler driving one team.
pub struct ControlLoop<W> {
    world: Arc<W>,
    team: Team,
    strategy: Arc<Mutex<TeamStrategy>>,
    tuning: ControlTuning,
    running: Option<Running>,
}

impl<W> std::fmt::Debug for ControlLoop<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlLoop")
            .field("team", &self.team)
            .field("tuning", &self.tuning)
            .field("running", &self.running.is_some())
            .finish()
    }
}

impl<W: WorldModel + 'static> ControlLoop<W> {
    /// Creates a stopped loop for the strategy's team.
    #[must_use]
    pub fn new(world: Arc<W>, strategy: TeamStrategy, tuning: ControlTuning) -> Self {
        Self {
            world,
            team: strategy.team(),
            strategy: Arc::new(Mutex::new(strategy)),
            tuning,
            running: None,
        }
    }

    /// Spawns the loop thread running `mode` every `tick_interval`.
    pub fn start(&mut self, mode: Mode, tick_interval: Duration) -> Result<(), ControlError> {
        if self.running.is_some() {
            return Err(ControlError::AlreadyRunning);
        }

        let (stop, stop_requests) = mpsc::channel();
        let worker = Worker {
            team: self.team,
            world: Arc::clone(&self.world),
            strategy: Arc::clone(&self.strategy),
            tuning: self.tuning,
            mode,
            interval: tick_interval,
            stop_requests,
        };
        let handle = thread::Builder::new()
            .name(format!("control-{}", self.team))
            .spawn(move || worker.run())?;
        self.running = Some(Running { stop, handle });
        tracing::info!(
            team = %self.team,
            interval_ms = tick_interval.as_millis() as u64,
            "control loop started"
        );
        Ok(())
    }
}

impl<W> ControlLoop<W> {
    /// Team the loop drives.
    #[must_use]
    pub const fn team(&self) -> Team {
        self.team
    }

    /// Reports whether the loop thread is active.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Runs `inspect` against the strategy while holding its lock.
    pub fn with_strategy<R>(&self, inspect: impl FnOnce(&TeamStrategy) -> R) -> R {
        inspect(&self.strategy.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Requests shutdown and blocks until the current tick has finished.
    ///
    /// Stopping a loop that is not running succeeds immediately.
    pub fn stop(&mut self) -> Result<(), ControlError> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };
        let _ = running.stop.send(());
        running.handle.join().map_err(|_| ControlError::Panicked)?;
        tracing::info!(team = %self.team, "control loop stopped");
        Ok(())
    }
}

impl<W> Drop for ControlLoop<W> {
    fn drop(&mut self) {
        if let Err(error) = self.stop() {
            tracing::warn!(team = %self.team, %error, "control loop did not stop cleanly");
        }
    }
}

struct Worker<W> {
    team: Team,
    world: Arc<W>,
    strategy: Arc<Mutex<TeamStrategy>>,
    tuning: ControlTuning,
    mode: Mode,
    interval: Duration,
    stop_requests: Receiver<()>,
}

impl<W: WorldModel> Worker<W> {
    fn run(self) {
        while !self.world.wait_until_game_begins(self.tuning.start_poll()) {
            if self.stop_requested() {
                return;
            }
        }
        tracing::debug!(team = %self.team, "game started, ticking");

        let mut last_tick: Option<Instant> = None;
        while !self.stop_requested() {
            {
                let mut strategy = self
                    .strategy
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                tick(self.world.as_ref(), &mut strategy, &self.mode, &self.tuning);
            }

            let now = Instant::now();
            if let Some(previous) = last_tick {
                let period = now.duration_since(previous);
                if is_overrun(period, self.interval, self.tuning.overrun_factor) {
                    tracing::warn!(
                        team = %self.team,
                        period_ms = period.as_millis() as u64,
                        interval_ms = self.interval.as_millis() as u64,
                        "control loop large delay"
                    );
                }
            }
            last_tick = Some(now);

            match self.stop_requests.recv_timeout(self.interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn stop_requested(&self) -> bool {
        !matches!(self.stop_requests.try_recv(), Err(TryRecvError::Empty))
    }
}

fn is_overrun(period: Duration, interval: Duration, factor: f32) -> bool {
    period > interval.mul_f32(factor.max(0.0))
}
