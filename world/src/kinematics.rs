//! Ball rolling model and waypoint-following speed derivation.

use ssl_strategy_core::{normalize_angle, GoalPosts, Point, Pose, RobotCommand, Speeds, Vec2};

/// Limits and gains used when turning a waypoint queue into speeds.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SpeedLimits {
    pub(crate) max_speed: f32,
    pub(crate) max_angular_speed: f32,
    pub(crate) position_gain: f32,
    pub(crate) angular_gain: f32,
    pub(crate) waypoint_tolerance: f32,
    pub(crate) heading_tolerance: f32,
}

/// Position of a ball rolling under constant friction `dt` seconds from now.
///
/// The ball never reverses: once friction has consumed its speed it stays at
/// rest, so every prediction past the stopping time is identical.
pub(crate) fn predict_rolling(position: Point, velocity: Vec2, deceleration: f32, dt: f32) -> Point {
    let speed = velocity.length();
    if speed <= f32::EPSILON || dt <= 0.0 {
        return position;
    }

    let stop_time = if deceleration > 0.0 {
        speed / deceleration
    } else {
        f32::INFINITY
    };
    let t = dt.min(stop_time);
    let travelled = speed * t - 0.5 * deceleration * t * t;
    position + velocity / speed * travelled
}

/// Point where a rolling ball crosses the goal line between the posts.
pub(crate) fn goal_line_crossing(
    position: Point,
    velocity: Vec2,
    deceleration: f32,
    min_speed: f32,
    goal: &GoalPosts,
    ball_radius: f32,
) -> Option<Point> {
    let speed = velocity.length();
    if speed < min_speed || speed <= f32::EPSILON {
        return None;
    }

    let gap = goal.line_x() - position.x;
    if velocity.x * gap <= 0.0 {
        return None;
    }

    let direction = velocity / speed;
    let along = gap / direction.x;
    let reach = if deceleration > 0.0 {
        speed * speed / (2.0 * deceleration)
    } else {
        f32::INFINITY
    };
    if along > reach {
        return None;
    }

    let y = position.y + direction.y * along;
    let half_mouth = (goal.top.y - goal.bottom.y).abs() / 2.0 + ball_radius;
    ((y - goal.center().y).abs() <= half_mouth).then(|| Vec2::new(goal.line_x(), y))
}

/// Consumes reached waypoints and writes robot-frame speeds toward the next one.
pub(crate) fn derive_speeds(command: &mut RobotCommand, pose: Pose, limits: &SpeedLimits) {
    while command.waypoint_count() > 1 {
        let reached = command
            .next_waypoint()
            .is_some_and(|head| head.distance(&pose) <= limits.waypoint_tolerance);
        if !reached {
            break;
        }
        let _ = command.pop_waypoint();
    }

    let Some(target) = command.next_waypoint().copied() else {
        command.set_speeds(Speeds::ZERO);
        return;
    };

    let is_goal = command.waypoint_count() == 1;
    let offset = target.position() - pose.position();
    let velocity = if is_goal {
        if offset.length() <= limits.waypoint_tolerance {
            Vec2::ZERO
        } else {
            (offset * limits.position_gain).clamp_length_max(limits.max_speed)
        }
    } else {
        offset.normalize_or_zero() * limits.max_speed
    };

    let heading = pose.orientation.unwrap_or(0.0);
    let facing = Vec2::from_angle(heading);
    let angular = target.orientation.map_or(0.0, |orientation| {
        let error = normalize_angle(orientation - heading);
        if error.abs() <= limits.heading_tolerance {
            0.0
        } else {
            (error * limits.angular_gain).clamp(-limits.max_angular_speed, limits.max_angular_speed)
        }
    });

    command.set_speeds(Speeds::new(
        velocity.dot(facing),
        velocity.dot(facing.perp()),
        angular,
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> SpeedLimits {
        SpeedLimits {
            max_speed: 1_000.0,
            max_angular_speed: 2.0,
            position_gain: 2.0,
            angular_gain: 4.0,
            waypoint_tolerance: 20.0,
            heading_tolerance: 0.05,
        }
    }

    #[test]
    fn reached_intermediate_waypoints_are_consumed() {
        let mut command = RobotCommand::new();
        command.set_waypoints([Pose::at(5.0, 0.0), Pose::at(1_000.0, 0.0)]);

        derive_speeds(&mut command, Pose::facing(0.0, 0.0, 0.0), &limits());

        assert_eq!(command.waypoint_count(), 1);
        assert!((command.speeds().forward - 1_000.0).abs() < 1e-3);
        assert!(command.speeds().lateral.abs() < 1e-3);
    }

    #[test]
    fn speeds_are_expressed_in_robot_frame() {
        let mut command = RobotCommand::new();
        command.set_waypoints([Pose::at(0.0, 1_000.0)]);

        derive_speeds(
            &mut command,
            Pose::facing(0.0, 0.0, std::f32::consts::FRAC_PI_2),
            &limits(),
        );

        assert!((command.speeds().forward - 1_000.0).abs() < 1e-2);
        assert!(command.speeds().lateral.abs() < 1e-2);
    }

    #[test]
    fn arrived_robot_only_turns() {
        let mut command = RobotCommand::new();
        command.set_waypoints([Pose::facing(0.0, 0.0, 1.0)]);

        derive_speeds(&mut command, Pose::facing(0.0, 0.0, 0.0), &limits());

        let speeds = command.speeds();
        assert_eq!(speeds.forward, 0.0);
        assert_eq!(speeds.lateral, 0.0);
        assert!((speeds.angular - 2.0).abs() < 1e-6);
        assert_eq!(command.waypoint_count(), 1);
    }

    #[test]
    fn empty_queue_holds_still() {
        let mut command = RobotCommand::new();
        command.set_speeds(Speeds::new(1.0, 2.0, 3.0));

        derive_speeds(&mut command, Pose::at(0.0, 0.0), &limits());

        assert!(command.speeds().is_stopped());
    }
}
