#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the SSL strategy engine.
//!
//! This crate defines the vocabulary that connects the authoritative world
//! model, the pure decision systems, and the adapters. The world model is
//! reached exclusively through the [`WorldModel`] trait: systems read
//! point-in-time snapshots of robot and ball state through it and write their
//! decisions into per-robot [`RobotCommand`] records, which the world model
//! later turns into wheel speeds. Nothing in the systems touches locks or
//! threads directly.

use std::{collections::VecDeque, fmt, time::Duration};

pub use glam::Vec2;
use serde::{Deserialize, Serialize};

/// A position on the field plane, in millimetres.
pub type Point = Vec2;

/// Length of the field along the x axis in millimetres.
pub const FIELD_X_LENGTH: f32 = 9_000.0;
/// Length of the field along the y axis in millimetres.
pub const FIELD_Y_LENGTH: f32 = 6_000.0;
/// Radius of the centre circle in millimetres.
pub const CENTER_CIRCLE_RADIUS: f32 = 495.0;
/// Distance between the two posts of a goal in millimetres.
pub const GOAL_WIDTH: f32 = 1_000.0;
/// Depth of a defense area measured from the goal line.
pub const DEFENSE_AREA_X_LENGTH: f32 = 1_000.0;
/// Width of a defense area measured along the goal line.
pub const DEFENSE_AREA_Y_LENGTH: f32 = 2_000.0;
/// Radius of the ball in millimetres.
pub const BALL_RADIUS: f32 = 21.0;
/// Physical radius of a robot in millimetres.
pub const ROBOT_RADIUS: f32 = 90.0;

/// Identifies one of the two competing teams.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    /// The blue team.
    Blue,
    /// The yellow team.
    Yellow,
}

impl Team {
    /// Both teams in a stable order.
    pub const ALL: [Team; 2] = [Team::Blue, Team::Yellow];

    /// Returns the opposing team.
    #[must_use]
    pub const fn opponent(self) -> Self {
        match self {
            Self::Blue => Self::Yellow,
            Self::Yellow => Self::Blue,
        }
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blue => f.write_str("blue"),
            Self::Yellow => f.write_str("yellow"),
        }
    }
}

/// Half of the field a team defends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSide {
    /// The half with negative x coordinates.
    Negative,
    /// The half with positive x coordinates.
    Positive,
}

impl FieldSide {
    /// Sign of the x coordinates on this side.
    #[must_use]
    pub const fn sign(self) -> f32 {
        match self {
            Self::Negative => -1.0,
            Self::Positive => 1.0,
        }
    }

    /// Returns the other half of the field.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Negative => Self::Positive,
            Self::Positive => Self::Negative,
        }
    }
}

/// Unique identifier assigned to a robot within its team.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RobotId(u32);

impl RobotId {
    /// Creates a new robot identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for RobotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Field position plus an optional facing angle.
///
/// An absent orientation means "keep the current heading", which is not the
/// same thing as facing along the positive x axis.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Position along the x axis in millimetres.
    pub x: f32,
    /// Position along the y axis in millimetres.
    pub y: f32,
    /// Facing angle in radians relative to the x axis.
    pub orientation: Option<f32>,
}

impl Pose {
    /// Creates a pose from explicit components.
    #[must_use]
    pub const fn new(x: f32, y: f32, orientation: Option<f32>) -> Self {
        Self { x, y, orientation }
    }

    /// Creates a pose that preserves the robot's heading.
    #[must_use]
    pub const fn at(x: f32, y: f32) -> Self {
        Self::new(x, y, None)
    }

    /// Creates a pose with an explicit facing angle.
    #[must_use]
    pub const fn facing(x: f32, y: f32, orientation: f32) -> Self {
        Self::new(x, y, Some(orientation))
    }

    /// Creates a pose at `position` with an optional facing angle.
    #[must_use]
    pub fn from_point(position: Point, orientation: Option<f32>) -> Self {
        Self::new(position.x, position.y, orientation)
    }

    /// The 2-D projection of the pose.
    #[must_use]
    pub fn position(&self) -> Point {
        Vec2::new(self.x, self.y)
    }

    /// Euclidean distance between the 2-D projections of two poses.
    #[must_use]
    pub fn distance(&self, other: &Pose) -> f32 {
        self.position().distance(other.position())
    }

    /// Returns `true` when both poses occupy the same 2-D position.
    #[must_use]
    pub fn same_position(&self, other: &Pose) -> bool {
        self.x == other.x && self.y == other.y
    }
}

impl From<Point> for Pose {
    fn from(position: Point) -> Self {
        Self::from_point(position, None)
    }
}

impl From<(f32, f32)> for Pose {
    fn from((x, y): (f32, f32)) -> Self {
        Self::at(x, y)
    }
}

impl From<(f32, f32, Option<f32>)> for Pose {
    fn from((x, y, orientation): (f32, f32, Option<f32>)) -> Self {
        Self::new(x, y, orientation)
    }
}

/// The two posts of a goal.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GoalPosts {
    /// Post with the larger y coordinate.
    pub top: Point,
    /// Post with the smaller y coordinate.
    pub bottom: Point,
}

impl GoalPosts {
    /// Midpoint between the posts.
    #[must_use]
    pub fn center(&self) -> Point {
        (self.top + self.bottom) / 2.0
    }

    /// x coordinate of the goal line.
    #[must_use]
    pub fn line_x(&self) -> f32 {
        self.top.x
    }
}

/// Static description of the playing field.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldGeometry {
    /// Field length along the x axis.
    pub x_length: f32,
    /// Field length along the y axis.
    pub y_length: f32,
    /// Distance between goal posts.
    pub goal_width: f32,
    /// Defense area depth measured from the goal line.
    pub defense_area_x_length: f32,
    /// Defense area width measured along the goal line.
    pub defense_area_y_length: f32,
}

impl Default for FieldGeometry {
    fn default() -> Self {
        Self {
            x_length: FIELD_X_LENGTH,
            y_length: FIELD_Y_LENGTH,
            goal_width: GOAL_WIDTH,
            defense_area_x_length: DEFENSE_AREA_X_LENGTH,
            defense_area_y_length: DEFENSE_AREA_Y_LENGTH,
        }
    }
}

impl FieldGeometry {
    /// Smallest x coordinate inside the field.
    #[must_use]
    pub fn min_x(&self) -> f32 {
        -self.x_length / 2.0
    }

    /// Largest x coordinate inside the field.
    #[must_use]
    pub fn max_x(&self) -> f32 {
        self.x_length / 2.0
    }

    /// Smallest y coordinate inside the field.
    #[must_use]
    pub fn min_y(&self) -> f32 {
        -self.y_length / 2.0
    }

    /// Largest y coordinate inside the field.
    #[must_use]
    pub fn max_y(&self) -> f32 {
        self.y_length / 2.0
    }

    /// Reports whether the point lies inside the field boundary lines.
    #[must_use]
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.min_x()
            && point.x <= self.max_x()
            && point.y >= self.min_y()
            && point.y <= self.max_y()
    }

    /// Goal posts of the goal on the given side.
    #[must_use]
    pub fn goal(&self, side: FieldSide) -> GoalPosts {
        let x = side.sign() * self.max_x();
        GoalPosts {
            top: Vec2::new(x, self.goal_width / 2.0),
            bottom: Vec2::new(x, -self.goal_width / 2.0),
        }
    }

    /// Reports whether the point lies in the defense area on the given side,
    /// grown by `margin` in every direction.
    #[must_use]
    pub fn in_defense_area(&self, side: FieldSide, point: Point, margin: f32) -> bool {
        let depth = side.sign() * point.x - (self.max_x() - self.defense_area_x_length);
        depth >= -margin && point.y.abs() <= self.defense_area_y_length / 2.0 + margin
    }
}

/// Instantaneous speeds commanded to a robot, expressed in its own frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Speeds {
    /// Speed along the robot's heading in millimetres per second.
    pub forward: f32,
    /// Speed perpendicular to the heading, positive to the robot's left.
    pub lateral: f32,
    /// Rotational speed in radians per second, counter-clockwise positive.
    pub angular: f32,
}

impl Speeds {
    /// Speeds that hold the robot still.
    pub const ZERO: Speeds = Speeds {
        forward: 0.0,
        lateral: 0.0,
        angular: 0.0,
    };

    /// Creates a new speed triple.
    #[must_use]
    pub const fn new(forward: f32, lateral: f32, angular: f32) -> Self {
        Self {
            forward,
            lateral,
            angular,
        }
    }

    /// Reports whether every channel is zero.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.forward == 0.0 && self.lateral == 0.0 && self.angular == 0.0
    }
}

/// Per-robot command record read by the actuation boundary.
///
/// The waypoint queue is consumed front to back; its last element is the
/// current goal and an empty queue means no goal is set.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RobotCommand {
    waypoints: VecDeque<Pose>,
    speeds: Speeds,
    /// Fire the kicker on the next actuation.
    pub is_kicking: bool,
    /// Charge the kicker capacitors.
    pub is_charging: bool,
    /// Spin the dribbler.
    pub is_dribbling: bool,
    /// Kick speed the charge targets, in millimetres per second.
    pub charge_level: f32,
}

impl RobotCommand {
    /// Creates an idle command record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the waypoint queue wholesale.
    pub fn set_waypoints<I, P>(&mut self, waypoints: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<Pose>,
    {
        self.waypoints = waypoints.into_iter().map(Into::into).collect();
    }

    /// Adds a waypoint to the tail of the queue.
    pub fn append_waypoint(&mut self, waypoint: impl Into<Pose>) {
        self.waypoints.push_back(waypoint.into());
    }

    /// Removes every queued waypoint.
    pub fn clear_waypoints(&mut self) {
        self.waypoints.clear();
    }

    /// Drops the head of the queue, returning it.
    pub fn pop_waypoint(&mut self) -> Option<Pose> {
        self.waypoints.pop_front()
    }

    /// Waypoint the robot is currently driving toward.
    #[must_use]
    pub fn next_waypoint(&self) -> Option<&Pose> {
        self.waypoints.front()
    }

    /// Final waypoint of the queue, if any.
    #[must_use]
    pub fn goal(&self) -> Option<&Pose> {
        self.waypoints.back()
    }

    /// Iterator over the queued waypoints in driving order.
    pub fn waypoints(&self) -> impl Iterator<Item = &Pose> {
        self.waypoints.iter()
    }

    /// Number of queued waypoints.
    #[must_use]
    pub fn waypoint_count(&self) -> usize {
        self.waypoints.len()
    }

    /// Speeds most recently derived for the robot.
    #[must_use]
    pub const fn speeds(&self) -> Speeds {
        self.speeds
    }

    /// Overwrites the derived speeds.
    pub fn set_speeds(&mut self, speeds: Speeds) {
        self.speeds = speeds;
    }
}

/// Role a robot plays in match mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Guards the defended goal.
    Goalie,
    /// Collects the ball and shoots at the opposing goal.
    Attacker,
    /// Blocks the line between the ball and the defended goal.
    Defender,
}

/// Operator intent captured by an interactive front end.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct OperatorInput {
    /// Robot currently under operator control.
    pub selected: Option<(Team, RobotId)>,
    /// Position the operator asked the robot to drive to.
    pub target: Option<Point>,
    /// Direction the robot should face when it arrives.
    pub facing: Option<Vec2>,
    /// Charge the kicker.
    pub charge: bool,
    /// Fire the kicker.
    pub kick: bool,
    /// Spin the dribbler.
    pub dribble: bool,
}

/// Query and command surface of the shared world model.
///
/// Reads return point-in-time snapshots. Writes to one team's commands never
/// touch the other team's records. Implementations synchronise internally so
/// a single instance can be shared between independently scheduled loops.
pub trait WorldModel: Send + Sync {
    /// Static field description.
    fn field(&self) -> FieldGeometry;

    /// Latest known pose of the robot, if it has ever been observed.
    fn robot_position(&self, team: Team, robot: RobotId) -> Option<Pose>;

    /// Latest known ball position.
    fn ball_position(&self) -> Option<Point>;

    /// Ball position predicted `dt` seconds into the future.
    fn predict_ball_position(&self, dt: f32) -> Option<Point>;

    /// Speed bound used in reachability checks, in millimetres per second.
    fn robot_max_speed(&self, team: Team, robot: RobotId) -> f32;

    /// Reports whether `position` is free of robots, restricted zones and
    /// out-of-bounds area for the given robot, keeping `buffer` of clearance.
    fn is_position_open(&self, position: Point, team: Team, robot: RobotId, buffer: f32)
        -> bool;

    /// Reports whether the position lies within the playable field.
    fn is_in_play(&self, position: Point) -> bool;

    /// Reports whether the robot may legally occupy `position`.
    fn is_pos_legal(&self, position: Point, team: Team, robot: RobotId) -> bool;

    /// Goal defended by the team.
    fn defense_goal(&self, team: Team) -> GoalPosts;

    /// Goal attacked by the team.
    fn attack_goal(&self, team: Team) -> GoalPosts;

    /// Identifiers of every robot registered with the team, in ascending order.
    fn team_robots(&self, team: Team) -> Vec<RobotId>;

    /// Snapshot of the robot's command record.
    fn robot_commands(&self, team: Team, robot: RobotId) -> Option<RobotCommand>;

    /// Mutates the robot's command record under the store's lock.
    fn update_robot_commands<R, F>(&self, team: Team, robot: RobotId, update: F) -> Option<R>
    where
        F: FnOnce(&mut RobotCommand) -> R;

    /// Re-derives the robot's speeds from its live pose and waypoint queue.
    fn derive_speeds(&self, team: Team, robot: RobotId);

    /// Reports whether the robot's tracking data is too old to trust.
    fn is_robot_lost(&self, team: Team, robot: RobotId) -> bool;

    /// Blocks until the match-start signal fires or `timeout` elapses.
    ///
    /// Returns `true` once the game has begun.
    fn wait_until_game_begins(&self, timeout: Duration) -> bool;

    /// Point on the defended goal line the ball is predicted to cross, if a
    /// shot is currently travelling toward the team's goal.
    fn is_shot_coming(&self, team: Team) -> Option<Point>;

    /// Reports whether the ball is closer to the defended goal line than the
    /// given goalie.
    fn is_ball_behind_goalie(&self, team: Team, goalie: RobotId) -> bool;

    /// Reports whether the ball sits against the robot's dribbler.
    fn ball_in_dribbler(&self, team: Team, robot: RobotId) -> bool;

    /// Robot pose that places the dribbler on `ball` while facing `heading`.
    fn dribbler_to_robot_pos(&self, ball: Point, heading: f32) -> Pose;

    /// Latest operator input.
    fn operator_input(&self) -> OperatorInput;
}

/// Wraps an angle into the half-open interval `(-PI, PI]`.
#[must_use]
pub fn normalize_angle(angle: f32) -> f32 {
    use std::f32::consts::{PI, TAU};

    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI {
        wrapped + TAU
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_element_waypoints_gain_absent_orientation() {
        let mut command = RobotCommand::new();
        command.set_waypoints([(10.0, 20.0)]);
        command.append_waypoint(Vec2::new(30.0, 40.0));

        let waypoints: Vec<_> = command.waypoints().copied().collect();
        assert_eq!(waypoints, vec![Pose::at(10.0, 20.0), Pose::at(30.0, 40.0)]);
        assert!(waypoints.iter().all(|pose| pose.orientation.is_none()));
        assert_eq!(command.goal(), Some(&Pose::at(30.0, 40.0)));
    }

    #[test]
    fn set_waypoints_replaces_existing_queue() {
        let mut command = RobotCommand::new();
        command.set_waypoints([Pose::at(1.0, 1.0), Pose::at(2.0, 2.0)]);
        command.set_waypoints([Pose::facing(5.0, 5.0, 0.5)]);

        assert_eq!(command.waypoint_count(), 1);
        assert_eq!(command.next_waypoint(), Some(&Pose::facing(5.0, 5.0, 0.5)));
    }

    #[test]
    fn goals_sit_on_field_ends() {
        let field = FieldGeometry::default();
        let negative = field.goal(FieldSide::Negative);
        let positive = field.goal(FieldSide::Positive);

        assert_eq!(negative.center(), Vec2::new(-4_500.0, 0.0));
        assert_eq!(positive.center(), Vec2::new(4_500.0, 0.0));
        assert_eq!(negative.top.y - negative.bottom.y, GOAL_WIDTH);
    }

    #[test]
    fn defense_area_covers_goal_mouth_only() {
        let field = FieldGeometry::default();
        assert!(field.in_defense_area(FieldSide::Negative, Vec2::new(-4_000.0, 0.0), 0.0));
        assert!(!field.in_defense_area(FieldSide::Negative, Vec2::new(-3_000.0, 0.0), 0.0));
        assert!(field.in_defense_area(FieldSide::Negative, Vec2::new(-3_450.0, 0.0), 100.0));
        assert!(!field.in_defense_area(FieldSide::Positive, Vec2::new(-4_000.0, 0.0), 0.0));
    }

    #[test]
    fn normalize_angle_wraps_into_half_open_interval() {
        use std::f32::consts::PI;

        assert!((normalize_angle(3.0 * PI) - PI).abs() < 1e-5);
        assert!((normalize_angle(-PI / 2.0) + PI / 2.0).abs() < 1e-6);
        assert!(normalize_angle(-PI) > 0.0);
    }
}
