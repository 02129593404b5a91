use ssl_strategy_core::{Pose, RobotId, Team, WorldModel};
use ssl_strategy_system_pathfinding::{
    append_waypoint, goal_pos, PathFinder, PathOutcome, PlanError, PlannerTuning,
};
use ssl_strategy_world::GameState;

const ME: RobotId = RobotId::new(0);

fn world_with_robot_at(x: f32, y: f32) -> GameState {
    let world = GameState::default();
    world.register_robot(Team::Blue, ME);
    world.update_robot_position(Team::Blue, ME, Pose::facing(x, y, 0.0));
    world
}

fn build_wall(world: &GameState) {
    for (index, y) in [-200.0, 0.0, 200.0].into_iter().enumerate() {
        world.update_robot_position(
            Team::Yellow,
            RobotId::new(index as u32),
            Pose::facing(0.0, y, 0.0),
        );
    }
}

fn waypoints(world: &GameState) -> Vec<Pose> {
    world
        .robot_commands(Team::Blue, ME)
        .expect("registered")
        .waypoints()
        .copied()
        .collect()
}

#[test]
fn clear_line_yields_single_goal_waypoint() {
    let world = world_with_robot_at(-1_000.0, 0.0);
    let goal = Pose::facing(1_000.0, 500.0, 0.3);
    let mut finder = PathFinder::default();

    let outcome = finder.path_find(&world, Team::Blue, ME, goal);

    assert_eq!(outcome, Ok(PathOutcome::Direct));
    assert_eq!(waypoints(&world), vec![goal]);
    assert_eq!(finder.search_count(), 0);
}

#[test]
fn goal_outside_field_leaves_queue_untouched() {
    let world = world_with_robot_at(0.0, 0.0);
    append_waypoint(&world, Team::Blue, ME, Pose::at(100.0, 100.0)).expect("registered");
    let before = waypoints(&world);
    let mut finder = PathFinder::default();

    let outcome = finder.path_find(&world, Team::Blue, ME, Pose::at(5_000.0, 0.0));

    assert_eq!(outcome, Err(PlanError::GoalBlocked));
    assert_eq!(waypoints(&world), before);
}

#[test]
fn occupied_goal_leaves_queue_untouched() {
    let world = world_with_robot_at(0.0, 0.0);
    world.update_robot_position(Team::Yellow, RobotId::new(3), Pose::at(1_000.0, 0.0));
    append_waypoint(&world, Team::Blue, ME, Pose::at(-300.0, 0.0)).expect("registered");
    let mut finder = PathFinder::default();

    let outcome = finder.path_find(&world, Team::Blue, ME, Pose::at(1_000.0, 50.0));

    assert_eq!(outcome, Err(PlanError::GoalBlocked));
    assert_eq!(waypoints(&world), vec![Pose::at(-300.0, 0.0)]);
    assert_eq!(finder.search_count(), 0);
}

#[test]
fn planned_path_ends_at_goal_with_clear_segments() {
    let world = world_with_robot_at(-1_000.0, 0.0);
    build_wall(&world);
    let goal = Pose::facing(1_000.0, 0.0, 0.0);
    let mut finder = PathFinder::default();

    let outcome = finder
        .path_find(&world, Team::Blue, ME, goal)
        .expect("path around the wall exists");

    let path = waypoints(&world);
    assert_eq!(outcome, PathOutcome::Planned { waypoints: path.len() });
    assert!(path.len() > 1);
    assert_eq!(path.last(), Some(&goal));
    assert_eq!(goal_pos(&world, Team::Blue, ME), Some(goal));

    let mut from = world.robot_position(Team::Blue, ME).expect("tracked").position();
    for waypoint in &path {
        let to = waypoint.position();
        assert!(
            !finder.is_path_blocked(&world, Team::Blue, ME, from, to),
            "segment {from:?} -> {to:?} is blocked"
        );
        from = to;
    }
}

#[test]
fn unchanged_goal_within_throttle_reuses_path() {
    let world = world_with_robot_at(-1_000.0, 0.0);
    build_wall(&world);
    let goal = Pose::at(1_000.0, 0.0);
    let mut finder = PathFinder::default();

    let _ = finder
        .path_find(&world, Team::Blue, ME, goal)
        .expect("first plan");
    let planned = waypoints(&world);
    assert_eq!(finder.search_count(), 1);

    let outcome = finder.path_find(&world, Team::Blue, ME, goal);

    assert_eq!(outcome, Ok(PathOutcome::Reused));
    assert_eq!(finder.search_count(), 1);
    assert_eq!(waypoints(&world), planned);
}

#[test]
fn changed_goal_triggers_new_search() {
    let world = world_with_robot_at(-1_000.0, 0.0);
    build_wall(&world);
    let mut finder = PathFinder::default();

    let _ = finder
        .path_find(&world, Team::Blue, ME, Pose::at(1_000.0, 0.0))
        .expect("first plan");
    let outcome = finder
        .path_find(&world, Team::Blue, ME, Pose::at(1_200.0, 0.0))
        .expect("second plan");

    assert!(matches!(outcome, PathOutcome::Planned { .. }));
    assert_eq!(finder.search_count(), 2);
}

#[test]
fn expired_throttle_triggers_new_search() {
    let world = world_with_robot_at(-1_000.0, 0.0);
    build_wall(&world);
    let goal = Pose::at(1_000.0, 0.0);
    let mut finder = PathFinder::new(PlannerTuning {
        throttle_interval_ms: 0,
        ..PlannerTuning::default()
    });

    let _ = finder.path_find(&world, Team::Blue, ME, goal).expect("first plan");
    let _ = finder.path_find(&world, Team::Blue, ME, goal).expect("second plan");

    assert_eq!(finder.search_count(), 2);
}

#[test]
fn iteration_cap_reports_exhausted_search() {
    let world = world_with_robot_at(-1_000.0, 0.0);
    build_wall(&world);
    append_waypoint(&world, Team::Blue, ME, Pose::at(-900.0, 0.0)).expect("registered");
    let mut finder = PathFinder::new(PlannerTuning {
        max_iterations: 5,
        ..PlannerTuning::default()
    });

    let outcome = finder.path_find(&world, Team::Blue, ME, Pose::at(1_000.0, 0.0));

    assert_eq!(outcome, Err(PlanError::SearchExhausted { iterations: 5 }));
    assert_eq!(waypoints(&world), vec![Pose::at(-900.0, 0.0)]);
}

#[test]
fn failed_goal_within_throttle_is_not_searched_again() {
    let world = world_with_robot_at(-1_000.0, 0.0);
    build_wall(&world);
    let goal = Pose::at(1_000.0, 0.0);
    let mut finder = PathFinder::new(PlannerTuning {
        max_iterations: 5,
        ..PlannerTuning::default()
    });

    let first = finder.path_find(&world, Team::Blue, ME, goal);
    let second = finder.path_find(&world, Team::Blue, ME, goal);

    assert_eq!(first, Err(PlanError::SearchExhausted { iterations: 5 }));
    assert_eq!(second, first);
    assert_eq!(finder.search_count(), 1);

    let other = finder.path_find(&world, Team::Blue, ME, Pose::at(1_200.0, 0.0));

    assert_eq!(other, Err(PlanError::SearchExhausted { iterations: 5 }));
    assert_eq!(finder.search_count(), 2);
}

#[test]
fn failed_goal_is_searched_again_once_throttle_expires() {
    let world = world_with_robot_at(-1_000.0, 0.0);
    build_wall(&world);
    let goal = Pose::at(1_000.0, 0.0);
    let mut finder = PathFinder::new(PlannerTuning {
        max_iterations: 5,
        throttle_interval_ms: 0,
        ..PlannerTuning::default()
    });

    let _ = finder.path_find(&world, Team::Blue, ME, goal);
    let _ = finder.path_find(&world, Team::Blue, ME, goal);

    assert_eq!(finder.search_count(), 2);
}

#[test]
fn blocked_held_path_is_replanned_within_throttle() {
    let world = world_with_robot_at(-1_000.0, 0.0);
    build_wall(&world);
    let goal = Pose::at(1_000.0, 0.0);
    let mut finder = PathFinder::default();

    let _ = finder
        .path_find(&world, Team::Blue, ME, goal)
        .expect("first plan");
    let start = world.robot_position(Team::Blue, ME).expect("tracked").position();
    let clearance_from_ends = |waypoint: &Pose| {
        let at = waypoint.position();
        at.distance(start).min(at.distance(goal.position()))
    };
    let obstacle = waypoints(&world)
        .into_iter()
        .max_by(|a, b| clearance_from_ends(a).total_cmp(&clearance_from_ends(b)))
        .expect("planned path has waypoints");
    assert!(clearance_from_ends(&obstacle) > 500.0);

    world.update_robot_position(Team::Yellow, RobotId::new(5), obstacle);
    let outcome = finder.path_find(&world, Team::Blue, ME, goal);

    assert!(matches!(outcome, Ok(PathOutcome::Planned { .. })), "{outcome:?}");
    assert_eq!(finder.search_count(), 2);
    assert!(!waypoints(&world).contains(&obstacle));
}

#[test]
fn untracked_robot_is_reported() {
    let world = GameState::default();
    world.register_robot(Team::Blue, ME);
    let mut finder = PathFinder::default();

    let outcome = finder.path_find(&world, Team::Blue, ME, Pose::at(500.0, 0.0));

    assert_eq!(outcome, Err(PlanError::UnknownRobot));
}
