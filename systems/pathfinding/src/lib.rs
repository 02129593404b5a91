#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Collision-aware path planning for individual robots.
//!
//! [`PathFinder::path_find`] first tries the straight segment to the goal and
//! only falls back to a rapidly-exploring random tree when that segment is
//! blocked. A per-robot throttle keeps an already planned path in place while
//! the goal is unchanged and the path is still clear, which avoids replanning
//! on every tick and the oscillation that comes with it.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use ssl_strategy_core::{Point, Pose, RobotCommand, RobotId, Team, Vec2, WorldModel, ROBOT_RADIUS};
use thiserror::Error;

/// Parameters of the straight-line check and the sampling search.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerTuning {
    /// Spacing of occupancy probes along a segment, in millimetres.
    pub step: f32,
    /// Probability that a draw samples the goal instead of a random point.
    pub goal_bias: f64,
    /// Maximum number of steps a single extension may advance.
    pub max_extension_steps: u32,
    /// Clearance required around a random sample for it to be kept.
    pub sample_buffer: f32,
    /// Clearance required along segments and at the goal.
    pub clearance_buffer: f32,
    /// Minimum time between two searches for the same robot and goal.
    pub throttle_interval_ms: u64,
    /// Number of draws after which the search gives up.
    pub max_iterations: u32,
    /// Seed of the sampling generator.
    pub seed: u64,
}

impl Default for PlannerTuning {
    fn default() -> Self {
        Self {
            step: ROBOT_RADIUS,
            goal_bias: 0.05,
            max_extension_steps: 4,
            sample_buffer: 100.0,
            clearance_buffer: 50.0,
            throttle_interval_ms: 3_000,
            max_iterations: 20_000,
            seed: 0x5353_4c00,
        }
    }
}

impl PlannerTuning {
    /// Replan throttle as a [`Duration`].
    #[must_use]
    pub fn throttle_interval(&self) -> Duration {
        Duration::from_millis(self.throttle_interval_ms)
    }
}

/// Reasons a path request leaves the robot's waypoints untouched.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PlanError {
    /// The goal overlaps another robot, a restricted zone or the field boundary.
    #[error("goal is blocked")]
    GoalBlocked,
    /// The sampling search ran out of draws before reaching the goal.
    #[error("sampling search exhausted after {iterations} draws")]
    SearchExhausted {
        /// Number of draws performed.
        iterations: u32,
    },
    /// The robot is not tracked or has no command record.
    #[error("robot is not tracked or not registered")]
    UnknownRobot,
}

/// How a successful path request was satisfied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathOutcome {
    /// The straight segment was clear and the queue now holds only the goal.
    Direct,
    /// The held path still leads to the goal and was kept.
    Reused,
    /// A sampling search produced a new path.
    Planned {
        /// Number of waypoints written, including the goal.
        waypoints: usize,
    },
}

/// Most recent sampling search for one robot.
#[derive(Clone, Copy, Debug)]
struct LastSearch {
    at: Instant,
    goal: Point,
    failure: Option<PlanError>,
}

/// Stateful planner owned by one team's control loop.
#[derive(Debug)]
pub struct PathFinder {
    tuning: PlannerTuning,
    rng: ChaCha8Rng,
    last_search: HashMap<(Team, RobotId), LastSearch>,
    searches: u64,
}

impl Default for PathFinder {
    fn default() -> Self {
        Self::new(PlannerTuning::default())
    }
}

impl PathFinder {
    /// Creates a planner whose sampling sequence is seeded from the tuning.
    #[must_use]
    pub fn new(tuning: PlannerTuning) -> Self {
        Self {
            tuning,
            rng: ChaCha8Rng::seed_from_u64(tuning.seed),
            last_search: HashMap::new(),
            searches: 0,
        }
    }

    /// Tuning the planner was created with.
    #[must_use]
    pub const fn tuning(&self) -> &PlannerTuning {
        &self.tuning
    }

    /// Number of sampling searches started since creation.
    #[must_use]
    pub const fn search_count(&self) -> u64 {
        self.searches
    }

    /// Steers the robot toward `goal`, rewriting its waypoint queue.
    ///
    /// On error the queue is left exactly as it was.
    pub fn path_find<W: WorldModel>(
        &mut self,
        world: &W,
        team: Team,
        robot: RobotId,
        goal: Pose,
    ) -> Result<PathOutcome, PlanError> {
        let clearance = self.clearance(world, team, robot);
        let target = goal.position();
        if !clearance.is_open(target) {
            tracing::warn!(%team, %robot, x = goal.x, y = goal.y, "cannot path find to blocked goal");
            return Err(PlanError::GoalBlocked);
        }

        let start = world
            .robot_position(team, robot)
            .ok_or(PlanError::UnknownRobot)?
            .position();
        if !clearance.is_path_blocked(start, target) {
            move_straight(world, team, robot, goal)?;
            return Ok(PathOutcome::Direct);
        }

        let held = world
            .robot_commands(team, robot)
            .ok_or(PlanError::UnknownRobot)?;
        let throttled = self
            .last_search
            .get(&(team, robot))
            .filter(|last| last.at.elapsed() < self.tuning.throttle_interval());
        if let Some(failure) = throttled
            .filter(|last| last.goal == target)
            .and_then(|last| last.failure)
        {
            tracing::debug!(%team, %robot, %failure, "goal failed recently, not searching");
            return Err(failure);
        }
        let same_goal = held
            .goal()
            .is_some_and(|current| current.same_position(&goal));
        if same_goal && throttled.is_some() && !clearance.path_collides(start, &held) {
            tracing::debug!(%team, %robot, "keeping held path");
            return Ok(PathOutcome::Reused);
        }

        self.searches += 1;
        let result = self.search(&clearance, start, goal);
        let _ = self.last_search.insert(
            (team, robot),
            LastSearch {
                at: Instant::now(),
                goal: target,
                failure: result.as_ref().err().copied(),
            },
        );
        let path = result?;
        let waypoints = path.len();
        set_waypoints(world, team, robot, path)?;
        tracing::debug!(%team, %robot, waypoints, "planned new path");
        Ok(PathOutcome::Planned { waypoints })
    }

    /// Reports whether the segment `from -> to` passes through a closed
    /// position for the robot.
    ///
    /// The endpoint is probed first, then points spaced one step apart from
    /// `from`. A zero-length segment is never blocked.
    pub fn is_path_blocked<W: WorldModel>(
        &self,
        world: &W,
        team: Team,
        robot: RobotId,
        from: Point,
        to: Point,
    ) -> bool {
        self.clearance(world, team, robot).is_path_blocked(from, to)
    }

    fn clearance<'a, W: WorldModel>(
        &self,
        world: &'a W,
        team: Team,
        robot: RobotId,
    ) -> Clearance<'a, W> {
        Clearance {
            world,
            team,
            robot,
            step: self.tuning.step,
            buffer: self.tuning.clearance_buffer,
        }
    }

    fn search<W: WorldModel>(
        &mut self,
        clearance: &Clearance<'_, W>,
        start: Point,
        goal: Pose,
    ) -> Result<Vec<Pose>, PlanError> {
        let target = goal.position();
        let field = clearance.world.field();
        let (min_x, max_x) = (field.min_x(), field.max_x());
        let (min_y, max_y) = (field.min_y(), field.max_y());
        if !(min_x < max_x && min_y < max_y) {
            tracing::warn!(
                x_length = field.x_length,
                y_length = field.y_length,
                "field has no area to sample"
            );
            return Err(PlanError::SearchExhausted { iterations: 0 });
        }
        let mut tree = Tree::rooted_at(start);

        for _ in 0..self.tuning.max_iterations {
            let sample = if self.rng.gen::<f64>() < self.tuning.goal_bias {
                target
            } else {
                Vec2::new(
                    self.rng.gen_range(min_x..max_x),
                    self.rng.gen_range(min_y..max_y),
                )
            };

            if !clearance.is_open_with(sample, self.tuning.sample_buffer) || tree.contains(sample) {
                continue;
            }

            let nearest = tree.nearest(sample);
            let Some(reached) =
                clearance.extend(tree.position(nearest), sample, self.tuning.max_extension_steps)
            else {
                continue;
            };

            let _ = tree.insert(reached, nearest);
            if reached.distance(target) < ROBOT_RADIUS {
                let mut path: Vec<Pose> = tree
                    .path_to(tree.nearest(target))
                    .into_iter()
                    .map(Pose::from)
                    .collect();
                path.push(goal);
                return Ok(path);
            }
        }

        tracing::warn!(
            team = %clearance.team,
            robot = %clearance.robot,
            iterations = self.tuning.max_iterations,
            vertices = tree.len(),
            "sampling search exhausted"
        );
        Err(PlanError::SearchExhausted {
            iterations: self.tuning.max_iterations,
        })
    }
}

/// Occupancy probe bound to one robot.
struct Clearance<'a, W> {
    world: &'a W,
    team: Team,
    robot: RobotId,
    step: f32,
    buffer: f32,
}

impl<W: WorldModel> Clearance<'_, W> {
    fn is_open(&self, point: Point) -> bool {
        self.is_open_with(point, self.buffer)
    }

    fn is_open_with(&self, point: Point, buffer: f32) -> bool {
        self.world
            .is_position_open(point, self.team, self.robot, buffer)
    }

    fn is_path_blocked(&self, from: Point, to: Point) -> bool {
        if from == to {
            return false;
        }
        if !self.is_open(to) {
            return true;
        }

        let offset = to - from;
        let direction = offset.normalize_or_zero();
        (1..=self.whole_steps(offset.length()))
            .any(|index| !self.is_open(from + direction * (self.step * index as f32)))
    }

    fn path_collides(&self, start: Point, command: &RobotCommand) -> bool {
        let mut from = start;
        command.waypoints().any(|waypoint| {
            let to = waypoint.position();
            let blocked = self.is_path_blocked(from, to);
            from = to;
            blocked
        })
    }

    /// Farthest open point reached by stepping from `from` toward `toward`.
    fn extend(&self, from: Point, toward: Point, max_steps: u32) -> Option<Point> {
        let offset = toward - from;
        let direction = offset.normalize_or_zero();
        if direction == Vec2::ZERO {
            return None;
        }

        let steps = self.whole_steps(offset.length()).min(max_steps);
        let mut reached = None;
        for index in 1..=steps {
            let point = from + direction * (self.step * index as f32);
            if !self.is_open(point) {
                break;
            }
            reached = Some(point);
        }
        reached
    }

    fn whole_steps(&self, length: f32) -> u32 {
        if self.step <= 0.0 {
            return 0;
        }
        (length / self.step).floor() as u32
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct VertexId(u32);

#[derive(Clone, Copy, Debug)]
struct Vertex {
    position: Point,
    parent: Option<VertexId>,
}

/// Search tree that lives for a single planning call.
#[derive(Debug)]
struct Tree {
    vertices: Vec<Vertex>,
}

impl Tree {
    fn rooted_at(root: Point) -> Self {
        Self {
            vertices: vec![Vertex {
                position: root,
                parent: None,
            }],
        }
    }

    fn len(&self) -> usize {
        self.vertices.len()
    }

    fn insert(&mut self, position: Point, parent: VertexId) -> VertexId {
        let id = VertexId(u32::try_from(self.vertices.len()).unwrap_or(u32::MAX));
        self.vertices.push(Vertex {
            position,
            parent: Some(parent),
        });
        id
    }

    fn position(&self, id: VertexId) -> Point {
        self.vertices[id.0 as usize].position
    }

    fn contains(&self, position: Point) -> bool {
        self.vertices
            .iter()
            .any(|vertex| vertex.position == position)
    }

    /// Closest vertex to `point`; the earliest inserted wins ties.
    fn nearest(&self, point: Point) -> VertexId {
        let mut best = VertexId(0);
        let mut best_distance = f32::INFINITY;
        for (index, vertex) in self.vertices.iter().enumerate() {
            let distance = vertex.position.distance(point);
            if distance < best_distance {
                best_distance = distance;
                best = VertexId(u32::try_from(index).unwrap_or(u32::MAX));
            }
        }
        best
    }

    /// Positions from the root's first child down to `id`. The root itself
    /// is excluded.
    fn path_to(&self, id: VertexId) -> Vec<Point> {
        let mut path = Vec::new();
        let mut cursor = id;
        while let Some(parent) = self.vertices[cursor.0 as usize].parent {
            path.push(self.position(cursor));
            cursor = parent;
        }
        path.reverse();
        path
    }
}

/// Replaces the robot's waypoint queue.
pub fn set_waypoints<W, I, P>(
    world: &W,
    team: Team,
    robot: RobotId,
    waypoints: I,
) -> Result<(), PlanError>
where
    W: WorldModel,
    I: IntoIterator<Item = P>,
    P: Into<Pose>,
{
    world
        .update_robot_commands(team, robot, |command| command.set_waypoints(waypoints))
        .ok_or(PlanError::UnknownRobot)
}

/// Adds a waypoint after the robot's current goal.
pub fn append_waypoint<W: WorldModel>(
    world: &W,
    team: Team,
    robot: RobotId,
    waypoint: impl Into<Pose>,
) -> Result<(), PlanError> {
    let waypoint = waypoint.into();
    world
        .update_robot_commands(team, robot, |command| command.append_waypoint(waypoint))
        .ok_or(PlanError::UnknownRobot)
}

/// Sends the robot straight to `goal` without checking for obstacles.
pub fn move_straight<W: WorldModel>(
    world: &W,
    team: Team,
    robot: RobotId,
    goal: impl Into<Pose>,
) -> Result<(), PlanError> {
    set_waypoints(world, team, robot, [goal.into()])
}

/// Final waypoint of the robot's queue, if a goal is set.
pub fn goal_pos<W: WorldModel>(world: &W, team: Team, robot: RobotId) -> Option<Pose> {
    world
        .robot_commands(team, robot)
        .and_then(|command| command.goal().copied())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssl_strategy_core::FieldGeometry;
    use ssl_strategy_world::{GameState, WorldConfig};

    #[test]
    fn nearest_prefers_first_inserted_on_ties() {
        let mut tree = Tree::rooted_at(Vec2::new(-100.0, 0.0));
        let right = tree.insert(Vec2::new(100.0, 0.0), VertexId(0));

        assert_eq!(tree.nearest(Vec2::ZERO), VertexId(0));
        assert_eq!(tree.nearest(Vec2::new(90.0, 0.0)), right);
    }

    #[test]
    fn extracted_path_excludes_root() {
        let mut tree = Tree::rooted_at(Vec2::ZERO);
        let first = tree.insert(Vec2::new(90.0, 0.0), VertexId(0));
        let second = tree.insert(Vec2::new(180.0, 0.0), first);
        let _ = tree.insert(Vec2::new(0.0, 90.0), VertexId(0));

        assert_eq!(
            tree.path_to(second),
            vec![Vec2::new(90.0, 0.0), Vec2::new(180.0, 0.0)]
        );
        assert!(tree.path_to(VertexId(0)).is_empty());
    }

    #[test]
    fn extension_is_capped_and_stops_before_obstacles() {
        let world = GameState::default();
        let me = RobotId::new(0);
        let finder = PathFinder::default();
        let clearance = finder.clearance(&world, Team::Blue, me);

        let reached = clearance
            .extend(Vec2::ZERO, Vec2::new(2_000.0, 0.0), 4)
            .expect("open field");
        assert!((reached.x - 360.0).abs() < 1e-3);

        world.update_robot_position(Team::Yellow, RobotId::new(9), Pose::at(400.0, 0.0));
        let reached = clearance
            .extend(Vec2::ZERO, Vec2::new(2_000.0, 0.0), 4)
            .expect("first step is open");
        assert!((reached.x - 90.0).abs() < 1e-3);

        assert!(clearance.extend(Vec2::ZERO, Vec2::new(50.0, 0.0), 4).is_none());
    }

    #[test]
    fn field_without_area_fails_search_without_sampling() {
        let world = GameState::new(WorldConfig {
            field: FieldGeometry {
                x_length: 0.0,
                ..FieldGeometry::default()
            },
            ..WorldConfig::default()
        });
        let me = RobotId::new(0);
        let mut finder = PathFinder::default();
        let clearance = finder.clearance(&world, Team::Blue, me);

        let result = finder.search(&clearance, Vec2::ZERO, Pose::at(0.4, 0.0));

        assert_eq!(result, Err(PlanError::SearchExhausted { iterations: 0 }));
    }

    #[test]
    fn zero_length_segment_is_never_blocked() {
        let world = GameState::default();
        world.update_robot_position(Team::Yellow, RobotId::new(1), Pose::at(0.0, 0.0));
        let finder = PathFinder::default();

        assert!(!finder.is_path_blocked(&world, Team::Blue, RobotId::new(0), Vec2::ZERO, Vec2::ZERO));
        assert!(finder.is_path_blocked(
            &world,
            Team::Blue,
            RobotId::new(0),
            Vec2::new(-1_000.0, 0.0),
            Vec2::new(1_000.0, 0.0)
        ));
    }
}
