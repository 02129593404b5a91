#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative world model for the SSL strategy engine.
//!
//! [`GameState`] is the single store shared by the vision feed, both team
//! control loops and any observer. Tracking data and commands live behind
//! separate locks, and each team's command table has its own lock, so one
//! team's loop never blocks on or writes into the other team's records.

mod kinematics;

use std::{
    collections::BTreeMap,
    sync::{Condvar, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};
use ssl_strategy_core::{
    FieldGeometry, FieldSide, GoalPosts, OperatorInput, Point, Pose, RobotCommand, RobotId,
    Speeds, Team, Vec2, WorldModel, BALL_RADIUS, ROBOT_RADIUS,
};

use kinematics::SpeedLimits;

/// Tunable parameters of the world model.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Field dimensions.
    pub field: FieldGeometry,
    /// Half of the field defended by the blue team.
    pub blue_side: FieldSide,
    /// Maximum translational speed of every robot in millimetres per second.
    pub robot_max_speed: f32,
    /// Maximum rotational speed of every robot in radians per second.
    pub robot_max_angular_speed: f32,
    /// Age after which a robot's tracking data is considered stale.
    pub lost_timeout_ms: u64,
    /// Rolling friction slowing the ball, in millimetres per second squared.
    pub ball_deceleration: f32,
    /// Ball speed below which the ball is not considered a shot.
    pub min_shot_speed: f32,
    /// Distance at which an intermediate waypoint counts as reached.
    pub waypoint_tolerance: f32,
    /// Heading error at which a waypoint orientation counts as reached.
    pub heading_tolerance: f32,
    /// Proportional gain converting position error into speed.
    pub position_gain: f32,
    /// Proportional gain converting heading error into angular speed.
    pub angular_gain: f32,
    /// Distance from the dribbler contact point at which the ball counts as held.
    pub dribbler_capture_distance: f32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            field: FieldGeometry::default(),
            blue_side: FieldSide::Negative,
            robot_max_speed: 1_500.0,
            robot_max_angular_speed: 4.0,
            lost_timeout_ms: 1_000,
            ball_deceleration: 400.0,
            min_shot_speed: 100.0,
            waypoint_tolerance: 20.0,
            heading_tolerance: 0.05,
            position_gain: 3.0,
            angular_gain: 4.0,
            dribbler_capture_distance: 35.0,
        }
    }
}

impl WorldConfig {
    /// Staleness threshold as a [`Duration`].
    #[must_use]
    pub fn lost_timeout(&self) -> Duration {
        Duration::from_millis(self.lost_timeout_ms)
    }

    /// Half of the field defended by `team`.
    #[must_use]
    pub fn defended_side(&self, team: Team) -> FieldSide {
        match team {
            Team::Blue => self.blue_side,
            Team::Yellow => self.blue_side.opposite(),
        }
    }

    fn speed_limits(&self) -> SpeedLimits {
        SpeedLimits {
            max_speed: self.robot_max_speed,
            max_angular_speed: self.robot_max_angular_speed,
            position_gain: self.position_gain,
            angular_gain: self.angular_gain,
            waypoint_tolerance: self.waypoint_tolerance,
            heading_tolerance: self.heading_tolerance,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct TrackedRobot {
    pose: Pose,
    observed_at: Instant,
}

#[derive(Clone, Copy, Debug)]
struct TrackedBall {
    position: Point,
    velocity: Vec2,
}

/// Shared, internally synchronised world model.
#[derive(Debug)]
pub struct GameState {
    config: WorldConfig,
    robots: RwLock<BTreeMap<(Team, RobotId), TrackedRobot>>,
    ball: RwLock<Option<TrackedBall>>,
    blue_commands: Mutex<BTreeMap<RobotId, RobotCommand>>,
    yellow_commands: Mutex<BTreeMap<RobotId, RobotCommand>>,
    goalies: RwLock<BTreeMap<Team, RobotId>>,
    operator: RwLock<OperatorInput>,
    game_started: Mutex<bool>,
    game_start_signal: Condvar,
}

impl Default for GameState {
    fn default() -> Self {
        Self::new(WorldConfig::default())
    }
}

impl GameState {
    /// Creates an empty world model using the provided configuration.
    #[must_use]
    pub fn new(config: WorldConfig) -> Self {
        Self {
            config,
            robots: RwLock::new(BTreeMap::new()),
            ball: RwLock::new(None),
            blue_commands: Mutex::new(BTreeMap::new()),
            yellow_commands: Mutex::new(BTreeMap::new()),
            goalies: RwLock::new(BTreeMap::new()),
            operator: RwLock::new(OperatorInput::default()),
            game_started: Mutex::new(false),
            game_start_signal: Condvar::new(),
        }
    }

    /// Configuration the world model was created with.
    #[must_use]
    pub const fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Places a robot under the control of `team`, creating its command record.
    pub fn register_robot(&self, team: Team, robot: RobotId) {
        let mut commands = lock(self.commands_for(team));
        let _ = commands.entry(robot).or_insert_with(RobotCommand::new);
        tracing::debug!(%team, %robot, "registered robot");
    }

    /// Records a fresh observation of a robot's pose.
    pub fn update_robot_position(&self, team: Team, robot: RobotId, pose: Pose) {
        let tracked = TrackedRobot {
            pose,
            observed_at: Instant::now(),
        };
        let _ = write(&self.robots).insert((team, robot), tracked);
    }

    /// Removes all tracking data for a robot, as when it leaves the field.
    pub fn forget_robot(&self, team: Team, robot: RobotId) {
        let _ = write(&self.robots).remove(&(team, robot));
    }

    /// Records a fresh observation of the ball.
    pub fn update_ball(&self, position: Point, velocity: Vec2) {
        *write(&self.ball) = Some(TrackedBall { position, velocity });
    }

    /// Declares which robot guards the team's goal.
    ///
    /// The goalie is the only robot allowed inside its own defense area.
    pub fn set_goalie(&self, team: Team, robot: RobotId) {
        let _ = write(&self.goalies).insert(team, robot);
    }

    /// Replaces the operator input read by interactive control.
    pub fn set_operator_input(&self, input: OperatorInput) {
        *write(&self.operator) = input;
    }

    /// Fires the match-start signal, releasing every waiting loop.
    pub fn begin_game(&self) {
        *lock(&self.game_started) = true;
        self.game_start_signal.notify_all();
        tracing::info!("game started");
    }

    /// Reports whether the match-start signal has fired.
    #[must_use]
    pub fn has_game_begun(&self) -> bool {
        *lock(&self.game_started)
    }

    fn commands_for(&self, team: Team) -> &Mutex<BTreeMap<RobotId, RobotCommand>> {
        match team {
            Team::Blue => &self.blue_commands,
            Team::Yellow => &self.yellow_commands,
        }
    }

    fn tracked_robot(&self, team: Team, robot: RobotId) -> Option<TrackedRobot> {
        read(&self.robots).get(&(team, robot)).copied()
    }

    fn tracked_ball(&self) -> Option<TrackedBall> {
        *read(&self.ball)
    }

    fn is_goalie(&self, team: Team, robot: RobotId) -> bool {
        read(&self.goalies).get(&team) == Some(&robot)
    }

    fn in_restricted_zone(&self, position: Point, team: Team, robot: RobotId, margin: f32) -> bool {
        let field = self.config.field;
        let own_side = self.config.defended_side(team);
        let goalie = self.is_goalie(team, robot);
        [own_side, own_side.opposite()].into_iter().any(|side| {
            if goalie && side == own_side {
                return false;
            }
            field.in_defense_area(side, position, margin)
        })
    }
}

impl WorldModel for GameState {
    fn field(&self) -> FieldGeometry {
        self.config.field
    }

    fn robot_position(&self, team: Team, robot: RobotId) -> Option<Pose> {
        self.tracked_robot(team, robot).map(|tracked| tracked.pose)
    }

    fn ball_position(&self) -> Option<Point> {
        self.tracked_ball().map(|ball| ball.position)
    }

    fn predict_ball_position(&self, dt: f32) -> Option<Point> {
        let ball = self.tracked_ball()?;
        Some(kinematics::predict_rolling(
            ball.position,
            ball.velocity,
            self.config.ball_deceleration,
            dt,
        ))
    }

    fn robot_max_speed(&self, _team: Team, _robot: RobotId) -> f32 {
        self.config.robot_max_speed
    }

    fn is_position_open(
        &self,
        position: Point,
        team: Team,
        robot: RobotId,
        buffer: f32,
    ) -> bool {
        if !self.config.field.contains(position) {
            return false;
        }

        if self.in_restricted_zone(position, team, robot, ROBOT_RADIUS) {
            return false;
        }

        let clearance = 2.0 * ROBOT_RADIUS + buffer;
        let robots = read(&self.robots);
        !robots.iter().any(|(&(other_team, other), tracked)| {
            (other_team, other) != (team, robot)
                && tracked.pose.position().distance(position) < clearance
        })
    }

    fn is_in_play(&self, position: Point) -> bool {
        self.config.field.contains(position)
    }

    fn is_pos_legal(&self, position: Point, team: Team, robot: RobotId) -> bool {
        self.is_in_play(position) && !self.in_restricted_zone(position, team, robot, 0.0)
    }

    fn defense_goal(&self, team: Team) -> GoalPosts {
        self.config.field.goal(self.config.defended_side(team))
    }

    fn attack_goal(&self, team: Team) -> GoalPosts {
        self.config
            .field
            .goal(self.config.defended_side(team).opposite())
    }

    fn team_robots(&self, team: Team) -> Vec<RobotId> {
        lock(self.commands_for(team)).keys().copied().collect()
    }

    fn robot_commands(&self, team: Team, robot: RobotId) -> Option<RobotCommand> {
        lock(self.commands_for(team)).get(&robot).cloned()
    }

    fn update_robot_commands<R, F>(&self, team: Team, robot: RobotId, update: F) -> Option<R>
    where
        F: FnOnce(&mut RobotCommand) -> R,
    {
        lock(self.commands_for(team)).get_mut(&robot).map(update)
    }

    fn derive_speeds(&self, team: Team, robot: RobotId) {
        let pose = self.robot_position(team, robot);
        let limits = self.config.speed_limits();
        let mut commands = lock(self.commands_for(team));
        let Some(command) = commands.get_mut(&robot) else {
            tracing::warn!(%team, %robot, "speed derivation for unregistered robot");
            return;
        };

        match pose {
            Some(pose) => kinematics::derive_speeds(command, pose, &limits),
            None => command.set_speeds(Speeds::ZERO),
        }
    }

    fn is_robot_lost(&self, team: Team, robot: RobotId) -> bool {
        self.tracked_robot(team, robot)
            .map_or(true, |tracked| tracked.observed_at.elapsed() > self.config.lost_timeout())
    }

    fn wait_until_game_begins(&self, timeout: Duration) -> bool {
        let started = lock(&self.game_started);
        let (started, _) = self
            .game_start_signal
            .wait_timeout_while(started, timeout, |started| !*started)
            .unwrap_or_else(PoisonError::into_inner);
        *started
    }

    fn is_shot_coming(&self, team: Team) -> Option<Point> {
        let ball = self.tracked_ball()?;
        let goal = self.defense_goal(team);
        kinematics::goal_line_crossing(
            ball.position,
            ball.velocity,
            self.config.ball_deceleration,
            self.config.min_shot_speed,
            &goal,
            BALL_RADIUS,
        )
    }

    fn is_ball_behind_goalie(&self, team: Team, goalie: RobotId) -> bool {
        let (Some(ball), Some(goalie)) = (self.ball_position(), self.robot_position(team, goalie))
        else {
            return false;
        };
        let sign = self.config.defended_side(team).sign();
        sign * ball.x > sign * goalie.x
    }

    fn ball_in_dribbler(&self, team: Team, robot: RobotId) -> bool {
        let (Some(ball), Some(pose)) = (self.ball_position(), self.robot_position(team, robot))
        else {
            return false;
        };
        let heading = pose.orientation.unwrap_or(0.0);
        let contact = pose.position() + Vec2::from_angle(heading) * dribbler_offset();
        contact.distance(ball) <= self.config.dribbler_capture_distance
    }

    fn dribbler_to_robot_pos(&self, ball: Point, heading: f32) -> Pose {
        let center = ball - Vec2::from_angle(heading) * dribbler_offset();
        Pose::from_point(center, Some(heading))
    }

    fn operator_input(&self) -> OperatorInput {
        *read(&self.operator)
    }
}

/// Distance from a robot's centre to the centre of a ball held in its dribbler.
#[must_use]
pub const fn dribbler_offset() -> f32 {
    ROBOT_RADIUS + BALL_RADIUS
}

/// Query functions that provide read-only snapshots of the world state.
pub mod query {
    use super::{read, GameState};
    use ssl_strategy_core::{Point, Pose, RobotId, Team, Vec2};

    /// Immutable representation of a tracked robot.
    #[derive(Clone, Copy, Debug, PartialEq)]
    pub struct RobotSnapshot {
        /// Team the robot belongs to.
        pub team: Team,
        /// Identifier of the robot within its team.
        pub id: RobotId,
        /// Latest observed pose.
        pub pose: Pose,
    }

    /// Immutable representation of the tracked ball.
    #[derive(Clone, Copy, Debug, PartialEq)]
    pub struct BallSnapshot {
        /// Latest observed position.
        pub position: Point,
        /// Latest observed velocity in millimetres per second.
        pub velocity: Vec2,
    }

    /// Captures every tracked robot in deterministic (team, id) order.
    #[must_use]
    pub fn robots(world: &GameState) -> Vec<RobotSnapshot> {
        read(&world.robots)
            .iter()
            .map(|(&(team, id), tracked)| RobotSnapshot {
                team,
                id,
                pose: tracked.pose,
            })
            .collect()
    }

    /// Captures the tracked ball, if any.
    #[must_use]
    pub fn ball(world: &GameState) -> Option<BallSnapshot> {
        world.tracked_ball().map(|ball| BallSnapshot {
            position: ball.position,
            velocity: ball.velocity,
        })
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
