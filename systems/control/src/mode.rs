//! Behaviours a control loop can run each tick.

use serde::{Deserialize, Serialize};
use ssl_strategy_core::{OperatorInput, Pose, Role, RobotId, Team, WorldModel};
use ssl_strategy_system_interception::robot_face_ball;
use ssl_strategy_system_pathfinding::PlanError;
use ssl_strategy_system_roles::{Decision, TeamStrategy};

/// Robot assigned to a role in match play.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    /// Robot playing the role.
    pub robot: RobotId,
    /// Role the robot plays.
    pub role: Role,
}

/// Role assignments used by [`Mode::Match`], played in order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Lineup {
    assignments: Vec<Assignment>,
}

impl Lineup {
    /// Creates an empty lineup.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns `role` to `robot`, replacing any earlier assignment.
    #[must_use]
    pub fn with(mut self, robot: RobotId, role: Role) -> Self {
        self.assignments.retain(|assignment| assignment.robot != robot);
        self.assignments.push(Assignment { robot, role });
        self
    }

    /// Role assigned to `robot`, if any.
    #[must_use]
    pub fn role_of(&self, robot: RobotId) -> Option<Role> {
        self.assignments
            .iter()
            .find(|assignment| assignment.robot == robot)
            .map(|assignment| assignment.role)
    }

    /// Robot assigned to `role`, the first one when several share it.
    #[must_use]
    pub fn robot_for(&self, role: Role) -> Option<RobotId> {
        self.assignments
            .iter()
            .find(|assignment| assignment.role == role)
            .map(|assignment| assignment.robot)
    }

    /// Assignments in play order.
    pub fn iter(&self) -> impl Iterator<Item = &Assignment> {
        self.assignments.iter()
    }
}

/// Decision logic selected for a control loop.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Issue no decisions; only speed derivation and the safety stop run.
    Idle,
    /// Follow the operator input stored in the world model.
    Interactive,
    /// First phase of the passing demonstration.
    PassDemo,
    /// Play the roles in the lineup.
    Match(Lineup),
}

pub(crate) fn run<W: WorldModel>(
    mode: &Mode,
    world: &W,
    strategy: &mut TeamStrategy,
    reception: Pose,
) {
    let team = strategy.team();
    match mode {
        Mode::Idle => {}
        Mode::Interactive => interactive(world, strategy, world.operator_input()),
        Mode::PassDemo => pass_demo(world, strategy, reception),
        Mode::Match(lineup) => {
            for assignment in lineup.iter() {
                let result = strategy.play(world, assignment.robot, assignment.role);
                report(team, assignment.robot, result);
            }
        }
    }
}

fn interactive<W: WorldModel>(world: &W, strategy: &mut TeamStrategy, input: OperatorInput) {
    let team = strategy.team();
    let Some((selected_team, robot)) = input.selected else {
        return;
    };
    if selected_team != team {
        return;
    }

    let _ = world.update_robot_commands(team, robot, |command| {
        command.is_charging = input.charge;
        command.is_kicking = input.kick;
        command.is_dribbling = input.dribble;
    });

    if let Some(target) = input.target {
        let orientation = input
            .facing
            .filter(|facing| facing.length_squared() > 0.0)
            .map(|facing| facing.y.atan2(facing.x));
        let goal = Pose::from_point(target, orientation);
        report(team, robot, strategy.path_find(world, robot, goal).map(|_| ()));
    }
}

const COLLECTOR: RobotId = RobotId::new(0);
const RECEIVER: RobotId = RobotId::new(1);

fn pass_demo<W: WorldModel>(world: &W, strategy: &mut TeamStrategy, reception: Pose) {
    let team = strategy.team();
    let window = strategy
        .interception()
        .interception_window(world, team, COLLECTOR);
    if let Some(window) = window {
        let heading = robot_face_ball(world, team, COLLECTOR);
        let pose = Pose::from_point(window.midpoint(), heading);
        let result = strategy.apply(world, COLLECTOR, Decision::direct(pose));
        report(team, COLLECTOR, result);
    }
    let result = strategy.apply(world, RECEIVER, Decision::direct(reception));
    report(team, RECEIVER, result);
}

fn report(team: Team, robot: RobotId, result: Result<(), PlanError>) {
    if let Err(error) = result {
        tracing::debug!(%team, %robot, %error, "decision not applied");
    }
}
