#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Ball-interception geometry computed from the world model's ball predictor.
//!
//! Reachability is a tangency test rather than a pursuit simulation: a robot
//! is assumed to leave immediately in a straight line at its top speed, and a
//! predicted ball position is reachable at time `t` when the robot's distance
//! to it is at most `t * max_speed`.

use serde::{Deserialize, Serialize};
use ssl_strategy_core::{Point, Pose, RobotId, Team, WorldModel};

/// Time steps and search horizon used by the interception queries.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterceptionTuning {
    /// Simulated time increment when searching for the first reachable point.
    pub first_point_step: f32,
    /// Simulated time increment when scanning an interception window.
    pub window_step: f32,
    /// Longest prediction horizon examined before giving up, in seconds.
    pub horizon: f32,
}

impl Default for InterceptionTuning {
    fn default() -> Self {
        Self {
            first_point_step: 0.05,
            window_step: 0.1,
            horizon: 10.0,
        }
    }
}

/// Predicted ball position paired with the simulated time it is reached.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InterceptPoint {
    /// Predicted ball position.
    pub position: Point,
    /// Seconds from now at which the ball is predicted there.
    pub time: f32,
}

/// Span of the ball's predicted path a robot can reach in time.
///
/// `first.time <= last.time` always holds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InterceptionWindow {
    /// Earliest point the robot can reach as the ball arrives.
    pub first: InterceptPoint,
    /// Latest point still reachable before the ball escapes or stops.
    pub last: InterceptPoint,
}

impl InterceptionWindow {
    /// Point halfway between the window's ends.
    #[must_use]
    pub fn midpoint(&self) -> Point {
        (self.first.position + self.last.position) / 2.0
    }
}

/// Stateless interception calculator.
#[derive(Clone, Copy, Debug, Default)]
pub struct Interception {
    tuning: InterceptionTuning,
}

impl Interception {
    /// Creates a calculator using the supplied tuning.
    #[must_use]
    pub const fn new(tuning: InterceptionTuning) -> Self {
        Self { tuning }
    }

    /// Tuning the calculator was created with.
    #[must_use]
    pub const fn tuning(&self) -> &InterceptionTuning {
        &self.tuning
    }

    /// First predicted ball position the robot could arrive at in time.
    ///
    /// Returns `None` when the robot or ball is untracked, or when no point is
    /// reachable within the configured horizon.
    pub fn first_interception_point<W: WorldModel>(
        &self,
        world: &W,
        team: Team,
        robot: RobotId,
    ) -> Option<InterceptPoint> {
        let probe = Probe::new(world, team, robot)?;
        let step = self.tuning.first_point_step;
        (0..=steps_within(self.tuning.horizon, step))
            .map(|index| index as f32 * step)
            .find_map(|time| probe.reachable_at(time))
    }

    /// Window of predicted ball positions the robot can reach in time.
    ///
    /// The window opens at the earliest reachable point, which must itself be
    /// in play. It closes at the last point that is still reachable before the
    /// robot falls behind the ball, the ball comes to rest, or the ball leaves
    /// the field.
    pub fn interception_window<W: WorldModel>(
        &self,
        world: &W,
        team: Team,
        robot: RobotId,
    ) -> Option<InterceptionWindow> {
        let probe = Probe::new(world, team, robot)?;
        let step = self.tuning.window_step;
        let max_steps = steps_within(self.tuning.horizon, step);

        let (first_index, first) = (0..=max_steps)
            .find_map(|index| probe.reachable_at(index as f32 * step).map(|point| (index, point)))?;
        if !world.is_in_play(first.position) {
            return None;
        }

        let mut last = first;
        for index in first_index + 1..=max_steps {
            let time = index as f32 * step;
            let Some(position) = world.predict_ball_position(time) else {
                break;
            };
            let stopped = position == last.position;
            let reachable = probe.can_reach(position, time);
            if stopped || !reachable || !world.is_in_play(position) {
                break;
            }
            last = InterceptPoint { position, time };
        }

        Some(InterceptionWindow { first, last })
    }

    /// Earliest point of the interception window, the least risky place to
    /// meet the ball.
    pub fn safest_intercept_point<W: WorldModel>(
        &self,
        world: &W,
        team: Team,
        robot: RobotId,
    ) -> Option<InterceptPoint> {
        self.interception_window(world, team, robot)
            .map(|window| window.first)
    }
}

struct Probe<'a, W> {
    world: &'a W,
    origin: Point,
    max_speed: f32,
}

impl<'a, W: WorldModel> Probe<'a, W> {
    fn new(world: &'a W, team: Team, robot: RobotId) -> Option<Self> {
        let origin = world.robot_position(team, robot)?.position();
        Some(Self {
            world,
            origin,
            max_speed: world.robot_max_speed(team, robot),
        })
    }

    fn can_reach(&self, position: Point, time: f32) -> bool {
        self.origin.distance(position) <= time * self.max_speed
    }

    fn reachable_at(&self, time: f32) -> Option<InterceptPoint> {
        let position = self.world.predict_ball_position(time)?;
        self.can_reach(position, time)
            .then_some(InterceptPoint { position, time })
    }
}

fn steps_within(horizon: f32, step: f32) -> u32 {
    if step <= 0.0 || horizon <= 0.0 {
        return 0;
    }
    (horizon / step).ceil() as u32
}

/// Heading, relative to the x axis, that points from `from` toward `to`.
#[must_use]
pub fn face_pos(from: Point, to: Point) -> f32 {
    let delta = to - from;
    delta.y.atan2(delta.x)
}

/// Heading that turns the robot toward `target`.
pub fn robot_face_pos<W: WorldModel>(
    world: &W,
    team: Team,
    robot: RobotId,
    target: Point,
) -> Option<f32> {
    let pose = world.robot_position(team, robot)?;
    Some(face_pos(pose.position(), target))
}

/// Heading that turns the robot toward the ball.
pub fn robot_face_ball<W: WorldModel>(world: &W, team: Team, robot: RobotId) -> Option<f32> {
    let ball = world.ball_position()?;
    robot_face_pos(world, team, robot, ball)
}

/// Robot pose that holds the ball at `ball` in the dribbler, aimed at `target`.
pub fn best_kick_pos<W: WorldModel>(world: &W, ball: Point, target: Point) -> Pose {
    world.dribbler_to_robot_pos(ball, face_pos(ball, target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssl_strategy_core::Vec2;
    use std::f32::consts::{FRAC_PI_2, PI};

    #[test]
    fn face_pos_points_toward_target() {
        let origin = Vec2::ZERO;
        assert!((face_pos(origin, Vec2::new(0.0, 10.0)) - FRAC_PI_2).abs() < 1e-6);
        assert!((face_pos(origin, Vec2::new(-10.0, 0.0)) - PI).abs() < 1e-6);
        assert!((face_pos(origin, Vec2::new(10.0, -10.0)) + PI / 4.0).abs() < 1e-6);
    }

    #[test]
    fn horizon_is_split_into_whole_steps() {
        assert_eq!(steps_within(10.0, 0.5), 20);
        assert_eq!(steps_within(1.0, 0.0), 0);
    }
}
