#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Role decisions for goalie, attacker and defender robots.
//!
//! Every role is a pure function from world-model state to a [`Decision`].
//! Decisions are applied separately by [`TeamStrategy`], which owns the
//! team's [`PathFinder`] and is the only place where waypoints and actuator
//! flags are written.

use serde::{Deserialize, Serialize};
use ssl_strategy_core::{
    normalize_angle, Point, Pose, Role, RobotId, Team, WorldModel, ROBOT_RADIUS,
};
use ssl_strategy_system_interception::{
    best_kick_pos, face_pos, robot_face_ball, Interception, InterceptionTuning,
};
use ssl_strategy_system_pathfinding::{
    goal_pos, move_straight, PathFinder, PathOutcome, PlanError, PlannerTuning,
};

/// Distances, speeds and tolerances shared by the role decisions.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleTuning {
    /// Distance the goalie keeps from its goal centre while no shot is coming.
    pub goalie_offset: f32,
    /// Kick speed used for shots on goal, in millimetres per second.
    pub shot_speed: f32,
    /// Largest distance to the attacked goal centre from which the attacker shoots.
    pub shooting_range: f32,
    /// Heading error below which the attacker considers itself aimed.
    pub aim_tolerance: f32,
    /// Non-urgent targets closer than this to the current goal are ignored.
    pub retarget_tolerance: f32,
}

impl Default for RoleTuning {
    fn default() -> Self {
        Self {
            goalie_offset: 600.0,
            shot_speed: 1_200.0,
            shooting_range: 3_000.0,
            aim_tolerance: 0.05,
            retarget_tolerance: 20.0,
        }
    }
}

/// Motion requested by a role.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Movement {
    /// Leave the waypoint queue as it is.
    Hold,
    /// Drive straight to the pose.
    Direct {
        /// Target pose.
        pose: Pose,
        /// Rewrite the queue even when the target barely moved.
        urgent: bool,
    },
    /// Drive to the pose through the path planner.
    Plan(Pose),
}

/// Ball-handling actuators requested by a role.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Actuators {
    /// Spin the dribbler.
    pub dribble: bool,
    /// Kick speed to charge for, or `None` to leave the kicker idle.
    pub charge: Option<f32>,
    /// Fire the kicker.
    pub kick: bool,
}

/// Outcome of one role decision for one robot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Decision {
    /// Requested motion.
    pub movement: Movement,
    /// Requested actuator state, `None` to leave the flags untouched.
    pub actuators: Option<Actuators>,
}

impl Decision {
    /// Keeps the robot's current plan and actuators.
    #[must_use]
    pub const fn hold() -> Self {
        Self {
            movement: Movement::Hold,
            actuators: None,
        }
    }

    /// Drives straight to `pose` unless the current goal is already close.
    #[must_use]
    pub const fn direct(pose: Pose) -> Self {
        Self {
            movement: Movement::Direct {
                pose,
                urgent: false,
            },
            actuators: None,
        }
    }

    /// Drives straight to `pose`, always rewriting the queue.
    #[must_use]
    pub const fn urgent(pose: Pose) -> Self {
        Self {
            movement: Movement::Direct { pose, urgent: true },
            actuators: None,
        }
    }

    /// Routes to `pose` through the path planner.
    #[must_use]
    pub const fn plan(pose: Pose) -> Self {
        Self {
            movement: Movement::Plan(pose),
            actuators: None,
        }
    }

    /// Attaches an actuator request.
    #[must_use]
    pub const fn with_actuators(mut self, actuators: Actuators) -> Self {
        self.actuators = Some(actuators);
        self
    }
}

/// Runs the decision function for `role`.
pub fn decide<W: WorldModel>(
    role: Role,
    world: &W,
    interception: &Interception,
    team: Team,
    robot: RobotId,
    tuning: &RoleTuning,
) -> Decision {
    match role {
        Role::Goalie => goalie(world, interception, team, robot, tuning),
        Role::Attacker => attacker(world, team, robot, tuning),
        Role::Defender => defender(world, team, robot, None),
    }
}

/// Guards the defended goal.
///
/// An incoming shot sends the goalie urgently to its safest interception
/// point. A ball that slipped past the goalie pulls it onto the goal line
/// level with the ball. Otherwise it holds the blocking position
/// `goalie_offset` in front of the goal centre.
pub fn goalie<W: WorldModel>(
    world: &W,
    interception: &Interception,
    team: Team,
    robot: RobotId,
    tuning: &RoleTuning,
) -> Decision {
    let heading = robot_face_ball(world, team, robot);

    if let Some(shot) = world.is_shot_coming(team) {
        let point = interception
            .safest_intercept_point(world, team, robot)
            .map_or(shot, |point| point.position);
        return Decision::urgent(Pose::from_point(point, heading));
    }

    if world.is_ball_behind_goalie(team, robot) {
        let (Some(ball), Some(current)) =
            (world.ball_position(), world.robot_position(team, robot))
        else {
            return Decision::hold();
        };
        let goal = world.defense_goal(team);
        let line_x = goal.line_x() - goal.line_x().signum() * ROBOT_RADIUS;
        let y = ball.y.clamp(goal.bottom.y, goal.top.y);
        return Decision::direct(Pose::new(line_x, y, current.orientation));
    }

    block_goal_center_pos(world, team, tuning.goalie_offset, None)
        .map_or_else(Decision::hold, Decision::direct)
}

/// Collects the ball and shoots at the attacked goal.
pub fn attacker<W: WorldModel>(
    world: &W,
    team: Team,
    robot: RobotId,
    tuning: &RoleTuning,
) -> Decision {
    if world.ball_in_dribbler(team, robot) {
        if within_shooting_range(world, team, robot, tuning.shooting_range) {
            let target = world.attack_goal(team).center();
            return prepare_and_kick(
                world,
                team,
                robot,
                target,
                tuning.shot_speed,
                tuning.aim_tolerance,
            );
        }
        return Decision::hold().with_actuators(Actuators {
            dribble: true,
            charge: Some(tuning.shot_speed),
            kick: false,
        });
    }

    match world.ball_position() {
        Some(ball) if world.is_pos_legal(ball, team, robot) => {
            get_ball(world, team, robot, Some(tuning.shot_speed))
        }
        _ => Decision::hold(),
    }
}

/// Blocks the line between the defended goal and `target`, or the ball when
/// no target is given, keeping the robot's current distance from the goal.
pub fn defender<W: WorldModel>(
    world: &W,
    team: Team,
    robot: RobotId,
    target: Option<Point>,
) -> Decision {
    let Some(current) = world.robot_position(team, robot) else {
        return Decision::hold();
    };
    let distance = current
        .position()
        .distance(world.defense_goal(team).center());
    block_goal_center_pos(world, team, distance, target)
        .map_or_else(Decision::hold, Decision::direct)
}

/// Pose `distance` from the defended goal centre toward `target` (or the
/// ball), facing away from the goal.
///
/// Returns `None` when the direction is undefined because the target sits on
/// the goal centre, or when no target is known.
pub fn block_goal_center_pos<W: WorldModel>(
    world: &W,
    team: Team,
    distance: f32,
    target: Option<Point>,
) -> Option<Pose> {
    let target = target.or_else(|| world.ball_position())?;
    let center = world.defense_goal(team).center();
    let direction = (target - center).normalize_or_zero();
    if direction == Point::ZERO {
        tracing::warn!(%team, x = center.x, y = center.y, "blocking target lies on goal centre");
        return None;
    }
    Some(Pose::from_point(
        center + direction * distance,
        Some(face_pos(center, target)),
    ))
}

/// Reports whether the robot is close enough to the attacked goal to shoot.
pub fn within_shooting_range<W: WorldModel>(
    world: &W,
    team: Team,
    robot: RobotId,
    range: f32,
) -> bool {
    world.robot_position(team, robot).is_some_and(|pose| {
        pose.position().distance(world.attack_goal(team).center()) <= range
    })
}

/// Approaches the ball with the dribbler on, optionally charging the kicker.
pub fn get_ball<W: WorldModel>(
    world: &W,
    team: Team,
    robot: RobotId,
    charge: Option<f32>,
) -> Decision {
    let (Some(ball), Some(current)) = (world.ball_position(), world.robot_position(team, robot))
    else {
        return Decision::hold();
    };
    let heading = face_pos(current.position(), ball);
    Decision::plan(world.dribbler_to_robot_pos(ball, heading)).with_actuators(Actuators {
        dribble: true,
        charge,
        kick: false,
    })
}

/// Turns the ball toward `target` and kicks at `speed` once aimed.
pub fn prepare_and_kick<W: WorldModel>(
    world: &W,
    team: Team,
    robot: RobotId,
    target: Point,
    speed: f32,
    tolerance: f32,
) -> Decision {
    let (Some(ball), Some(current)) = (world.ball_position(), world.robot_position(team, robot))
    else {
        return Decision::hold();
    };
    let aim = best_kick_pos(world, ball, target);
    let desired = aim.orientation.unwrap_or_else(|| face_pos(ball, target));
    let aimed = current
        .orientation
        .is_some_and(|heading| normalize_angle(desired - heading).abs() <= tolerance);
    Decision::direct(aim).with_actuators(Actuators {
        dribble: !aimed,
        charge: Some(speed),
        kick: aimed,
    })
}

/// Applies role decisions for one team.
#[derive(Debug)]
pub struct TeamStrategy {
    team: Team,
    tuning: RoleTuning,
    interception: Interception,
    pathfinder: PathFinder,
}

impl TeamStrategy {
    /// Creates the strategy for `team` from its component tunings.
    #[must_use]
    pub fn new(
        team: Team,
        roles: RoleTuning,
        interception: InterceptionTuning,
        planner: PlannerTuning,
    ) -> Self {
        Self {
            team,
            tuning: roles,
            interception: Interception::new(interception),
            pathfinder: PathFinder::new(planner),
        }
    }

    /// Team the strategy plays for.
    #[must_use]
    pub const fn team(&self) -> Team {
        self.team
    }

    /// Role tuning in use.
    #[must_use]
    pub const fn tuning(&self) -> &RoleTuning {
        &self.tuning
    }

    /// Interception calculator in use.
    #[must_use]
    pub const fn interception(&self) -> &Interception {
        &self.interception
    }

    /// Planner owned by the team.
    #[must_use]
    pub const fn pathfinder(&self) -> &PathFinder {
        &self.pathfinder
    }

    /// Decides and applies `role` for one robot.
    pub fn play<W: WorldModel>(
        &mut self,
        world: &W,
        robot: RobotId,
        role: Role,
    ) -> Result<(), PlanError> {
        let decision = decide(
            role,
            world,
            &self.interception,
            self.team,
            robot,
            &self.tuning,
        );
        self.apply(world, robot, decision)
    }

    /// Routes the robot to `goal` through the planner.
    pub fn path_find<W: WorldModel>(
        &mut self,
        world: &W,
        robot: RobotId,
        goal: Pose,
    ) -> Result<PathOutcome, PlanError> {
        self.pathfinder.path_find(world, self.team, robot, goal)
    }

    /// Writes a decision into the robot's command record.
    ///
    /// Actuators are written before motion so a blocked goal does not drop
    /// a kick request.
    pub fn apply<W: WorldModel>(
        &mut self,
        world: &W,
        robot: RobotId,
        decision: Decision,
    ) -> Result<(), PlanError> {
        if let Some(actuators) = decision.actuators {
            world
                .update_robot_commands(self.team, robot, |command| {
                    command.is_dribbling = actuators.dribble;
                    command.is_charging = actuators.charge.is_some();
                    if let Some(level) = actuators.charge {
                        command.charge_level = level;
                    }
                    command.is_kicking = actuators.kick;
                })
                .ok_or(PlanError::UnknownRobot)?;
        }

        match decision.movement {
            Movement::Hold => Ok(()),
            Movement::Direct { pose, urgent } => {
                if !urgent && self.is_current_goal(world, robot, &pose) {
                    return Ok(());
                }
                move_straight(world, self.team, robot, pose)
            }
            Movement::Plan(pose) => self.path_find(world, robot, pose).map(|_| ()),
        }
    }

    fn is_current_goal<W: WorldModel>(&self, world: &W, robot: RobotId, pose: &Pose) -> bool {
        let Some(current) = goal_pos(world, self.team, robot) else {
            return false;
        };
        let same_heading = match (current.orientation, pose.orientation) {
            (None, None) => true,
            (Some(a), Some(b)) => normalize_angle(a - b).abs() <= self.tuning.aim_tolerance,
            _ => false,
        };
        same_heading && current.distance(pose) <= self.tuning.retarget_tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_builders_set_expected_movement() {
        let pose = Pose::at(1.0, 2.0);
        assert_eq!(Decision::hold().movement, Movement::Hold);
        assert_eq!(
            Decision::urgent(pose).movement,
            Movement::Direct { pose, urgent: true }
        );
        assert_eq!(Decision::plan(pose).movement, Movement::Plan(pose));
        assert!(Decision::direct(pose).actuators.is_none());
    }
}
