//! Headless kinematic field standing in for the vision feed and the radio.
//!
//! Every step the simulator reads the speeds both control loops derived,
//! passes them through the radio wire format, moves the robots and the ball,
//! and publishes noisy observations back into the world model.

use std::{
    collections::BTreeMap,
    f32::consts::PI,
    sync::{
        mpsc::{self, Receiver, RecvTimeoutError, Sender},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use ssl_strategy_core::{
    normalize_angle, FieldSide, Point, Pose, RobotId, Speeds, Team, Vec2, WorldModel,
    BALL_RADIUS, ROBOT_RADIUS,
};
use ssl_strategy_radio::{decode, Recipient, WireCommand, WireScale};
use ssl_strategy_world::{dribbler_offset, GameState};

/// Parameters of the simulated field.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct SimulationConfig {
    /// Robots placed on the field for each team.
    pub(crate) robots_per_team: u32,
    /// Physics step in milliseconds.
    pub(crate) step_ms: u64,
    /// Time a radio command stays in force once received.
    pub(crate) command_duration_ms: u64,
    /// Standard deviation of the observed robot positions, in millimetres.
    pub(crate) position_noise_mm: f32,
    /// Speed of the ball at kick-off, in a random direction.
    pub(crate) kickoff_speed: f32,
    /// Distance robots may leave the field lines before being held back.
    pub(crate) run_off: f32,
    /// Multiple of the step above which a step period is reported.
    pub(crate) overrun_factor: f32,
    /// Seed of the noise and kick-off generator.
    pub(crate) seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            robots_per_team: 3,
            step_ms: 10,
            command_duration_ms: 100,
            position_noise_mm: 2.0,
            kickoff_speed: 600.0,
            run_off: 300.0,
            overrun_factor: 3.0,
            seed: 7,
        }
    }
}

impl SimulationConfig {
    fn step(&self) -> Duration {
        Duration::from_millis(self.step_ms.max(1))
    }
}

/// Starting spots relative to the defended goal, mirrored for the far side.
const FORMATION: [(f32, f32); 6] = [
    (4_000.0, 0.0),
    (2_500.0, -800.0),
    (1_500.0, 800.0),
    (2_500.0, 1_600.0),
    (1_500.0, -1_600.0),
    (3_000.0, 0.0),
];

/// Kick-off pose of the `index`-th robot of the team defending `side`.
pub(crate) fn formation(side: FieldSide, index: usize) -> Pose {
    let (depth, y) = FORMATION[index % FORMATION.len()];
    let heading = match side {
        FieldSide::Negative => 0.0,
        FieldSide::Positive => PI,
    };
    Pose::facing(side.sign() * depth, side.sign() * y, heading)
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Body {
    position: Point,
    heading: f32,
    velocity: Vec2,
}

impl Body {
    fn at(pose: Pose) -> Self {
        Self {
            position: pose.position(),
            heading: pose.orientation.unwrap_or(0.0),
            velocity: Vec2::ZERO,
        }
    }

    fn drive(&mut self, speeds: Speeds, dt: f32) {
        let forward = Vec2::from_angle(self.heading);
        self.velocity = forward * speeds.forward + forward.perp() * speeds.lateral;
        self.position += self.velocity * dt;
        self.heading = normalize_angle(self.heading + speeds.angular * dt);
    }

    fn dribbler_contact(&self) -> Point {
        self.position + Vec2::from_angle(self.heading) * dribbler_offset()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Ball {
    position: Point,
    velocity: Vec2,
}

impl Ball {
    fn roll(&mut self, deceleration: f32, dt: f32) {
        let speed = self.velocity.length();
        if speed <= deceleration * dt {
            self.position += self.velocity * (dt / 2.0);
            self.velocity = Vec2::ZERO;
            return;
        }
        let slowed = self.velocity * ((speed - deceleration * dt) / speed);
        self.position += (self.velocity + slowed) * (dt / 2.0);
        self.velocity = slowed;
    }

    fn push_out_of(&mut self, body: &Body) {
        let contact = ROBOT_RADIUS + BALL_RADIUS;
        let offset = self.position - body.position;
        let distance = offset.length();
        if distance >= contact {
            return;
        }
        let normal = offset.try_normalize().unwrap_or(Vec2::from_angle(body.heading));
        self.position = body.position + normal * contact;
        let approach = (self.velocity - body.velocity).dot(normal);
        if approach < 0.0 {
            self.velocity -= normal * approach;
        }
    }
}

/// Totals reported once the simulator stops.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct SimulationReport {
    pub(crate) steps: u64,
    pub(crate) kicks: u32,
    pub(crate) goals: BTreeMap<Team, u32>,
}

/// Owns the true state of the field.
pub(crate) struct Simulator {
    world: Arc<GameState>,
    config: SimulationConfig,
    scale: WireScale,
    bodies: BTreeMap<(Team, RobotId), Body>,
    ball: Ball,
    rng: ChaCha8Rng,
    noise: Normal<f32>,
    report: SimulationReport,
}

impl Simulator {
    /// Places every registered robot in its team's formation and the ball on
    /// the centre spot.
    pub(crate) fn new(
        world: Arc<GameState>,
        config: SimulationConfig,
        scale: WireScale,
    ) -> Result<Self> {
        let noise = Normal::new(0.0, config.position_noise_mm).map_err(|error| {
            anyhow!("invalid position noise {}: {error}", config.position_noise_mm)
        })?;
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);

        let mut bodies = BTreeMap::new();
        for team in Team::ALL {
            let side = world.config().defended_side(team);
            for (index, robot) in world.team_robots(team).into_iter().enumerate() {
                let _ = bodies.insert((team, robot), Body::at(formation(side, index)));
            }
        }

        let direction = rng.gen_range(-PI..PI);
        let ball = Ball {
            position: Vec2::ZERO,
            velocity: Vec2::from_angle(direction) * config.kickoff_speed,
        };

        Ok(Self {
            world,
            config,
            scale,
            bodies,
            ball,
            rng,
            noise,
            report: SimulationReport::default(),
        })
    }

    /// Publishes the current state and starts stepping on a background thread.
    pub(crate) fn spawn(mut self) -> Result<SimulationHandle> {
        self.observe();
        let (stop, stop_requests) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("simulator".to_owned())
            .spawn(move || self.run(stop_requests))
            .context("failed to spawn simulator thread")?;
        Ok(SimulationHandle { stop, handle })
    }

    fn run(mut self, stop_requests: Receiver<()>) -> SimulationReport {
        let step = self.config.step();
        let mut last_step: Option<Instant> = None;
        loop {
            let now = Instant::now();
            if let Some(previous) = last_step {
                let period = now.duration_since(previous);
                if period > step.mul_f32(self.config.overrun_factor.max(0.0)) {
                    tracing::warn!(
                        period_ms = period.as_millis() as u64,
                        step_ms = step.as_millis() as u64,
                        "simulator large delay"
                    );
                }
            }
            let dt = last_step.map_or(step, |previous| now.duration_since(previous));
            last_step = Some(now);

            self.step(dt.as_secs_f32());
            self.observe();

            match stop_requests.recv_timeout(step) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        self.report
    }

    fn step(&mut self, dt: f32) {
        let command_duration = Duration::from_millis(self.config.command_duration_ms);
        let capture = self.world.config().dribbler_capture_distance;
        let mut held = false;
        self.report.steps += 1;

        for (&(team, robot), body) in &mut self.bodies {
            let Some(command) = self.world.robot_commands(team, robot) else {
                continue;
            };
            let wire = WireCommand::from_speeds(
                Recipient::Robot(robot),
                command.speeds(),
                &self.scale,
                command_duration,
            );
            let received = match decode(&wire.encode()) {
                Ok(received) => received,
                Err(error) => {
                    tracing::warn!(%team, %robot, %error, "radio command dropped");
                    continue;
                }
            };
            let active = dt.min(received.duration().as_secs_f32());
            body.drive(received.to_speeds(&self.scale), active);
            body.position = body.position.clamp(
                Vec2::new(
                    self.world.config().field.min_x() - self.config.run_off,
                    self.world.config().field.min_y() - self.config.run_off,
                ),
                Vec2::new(
                    self.world.config().field.max_x() + self.config.run_off,
                    self.world.config().field.max_y() + self.config.run_off,
                ),
            );

            if body.dribbler_contact().distance(self.ball.position) > capture {
                continue;
            }
            if command.is_kicking && command.charge_level > 0.0 {
                self.ball.velocity =
                    body.velocity + Vec2::from_angle(body.heading) * command.charge_level;
                self.report.kicks += 1;
                let _ = self
                    .world
                    .update_robot_commands(team, robot, |command| command.is_kicking = false);
                tracing::debug!(%team, %robot, speed = command.charge_level, "kick");
            } else if command.is_dribbling {
                self.ball.position = body.dribbler_contact();
                self.ball.velocity = body.velocity;
                held = true;
            }
        }

        if !held {
            self.ball.roll(self.world.config().ball_deceleration, dt);
            for body in self.bodies.values() {
                self.ball.push_out_of(body);
            }
        }
        self.settle_ball();
    }

    fn settle_ball(&mut self) {
        let field = self.world.config().field;
        if field.contains(self.ball.position) {
            return;
        }

        let side = if self.ball.position.x > 0.0 {
            FieldSide::Positive
        } else {
            FieldSide::Negative
        };
        let goal = field.goal(side);
        let crossed_line = side.sign() * self.ball.position.x > side.sign() * goal.line_x();
        let between_posts = self.ball.position.y.abs() <= field.goal_width / 2.0;
        if crossed_line && between_posts {
            let scorer = Team::ALL
                .into_iter()
                .find(|&team| self.world.config().defended_side(team) != side);
            if let Some(scorer) = scorer {
                *self.report.goals.entry(scorer).or_insert(0) += 1;
                tracing::info!(team = %scorer, "goal");
            }
            self.ball = Ball {
                position: Vec2::ZERO,
                velocity: Vec2::ZERO,
            };
            return;
        }

        tracing::debug!(x = self.ball.position.x, y = self.ball.position.y, "ball out");
        self.ball = Ball {
            position: self.ball.position.clamp(
                Vec2::new(field.min_x(), field.min_y()),
                Vec2::new(field.max_x(), field.max_y()),
            ),
            velocity: Vec2::ZERO,
        };
    }

    fn observe(&mut self) {
        for (&(team, robot), body) in &self.bodies {
            let jitter = Vec2::new(
                self.noise.sample(&mut self.rng),
                self.noise.sample(&mut self.rng),
            );
            let seen = body.position + jitter;
            self.world
                .update_robot_position(team, robot, Pose::facing(seen.x, seen.y, body.heading));
        }
        self.world.update_ball(self.ball.position, self.ball.velocity);
    }
}

/// Running simulator thread.
pub(crate) struct SimulationHandle {
    stop: Sender<()>,
    handle: JoinHandle<SimulationReport>,
}

impl SimulationHandle {
    /// Stops stepping and returns the totals.
    pub(crate) fn stop(self) -> Result<SimulationReport> {
        let _ = self.stop.send(());
        self.handle
            .join()
            .map_err(|_| anyhow!("simulator thread panicked"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet() -> SimulationConfig {
        SimulationConfig {
            position_noise_mm: 0.0,
            kickoff_speed: 0.0,
            ..SimulationConfig::default()
        }
    }

    fn simulator_with_robot(pose: Pose) -> (Arc<GameState>, Simulator, RobotId) {
        let world = Arc::new(GameState::default());
        let robot = RobotId::new(0);
        world.register_robot(Team::Blue, robot);
        let mut simulator =
            Simulator::new(Arc::clone(&world), quiet(), WireScale::default()).expect("valid");
        let _ = simulator.bodies.insert((Team::Blue, robot), Body::at(pose));
        (world, simulator, robot)
    }

    #[test]
    fn formation_is_mirrored_between_halves() {
        assert_eq!(formation(FieldSide::Negative, 0), Pose::facing(-4_000.0, 0.0, 0.0));
        assert_eq!(formation(FieldSide::Positive, 0), Pose::facing(4_000.0, 0.0, PI));
        assert_eq!(formation(FieldSide::Positive, 7), formation(FieldSide::Positive, 1));
    }

    #[test]
    fn lateral_speed_moves_robot_to_its_left() {
        let mut body = Body::at(Pose::facing(0.0, 0.0, 0.0));

        body.drive(Speeds::new(0.0, 1_000.0, 0.0), 0.1);

        assert!(body.position.distance(Vec2::new(0.0, 100.0)) < 1e-3);
    }

    #[test]
    fn commanded_speeds_pass_through_the_wire() {
        let (world, mut simulator, robot) = simulator_with_robot(Pose::facing(0.0, 0.0, 0.0));
        let _ = world.update_robot_commands(Team::Blue, robot, |command| {
            command.set_speeds(Speeds::new(750.0, 0.0, 0.0));
        });

        simulator.step(0.01);

        let moved = simulator.bodies[&(Team::Blue, robot)].position.x;
        // 750 mm/s is sent as channel 127, or about 747 mm/s.
        assert!(moved > 7.0 && moved < 7.5, "moved {moved}");
    }

    #[test]
    fn kick_launches_ball_once() {
        let (world, mut simulator, robot) = simulator_with_robot(Pose::facing(0.0, 0.0, 0.0));
        simulator.ball.position = Vec2::new(dribbler_offset(), 0.0);
        let _ = world.update_robot_commands(Team::Blue, robot, |command| {
            command.is_kicking = true;
            command.charge_level = 1_200.0;
        });

        simulator.step(0.01);

        assert_eq!(simulator.report.kicks, 1);
        assert!(simulator.ball.velocity.x > 1_100.0);
        assert!(!world.robot_commands(Team::Blue, robot).expect("registered").is_kicking);
    }

    #[test]
    fn ball_between_posts_scores_for_attacking_team() {
        let (_world, mut simulator, _) = simulator_with_robot(Pose::facing(0.0, 0.0, 0.0));
        simulator.ball = Ball {
            position: Vec2::new(4_490.0, 100.0),
            velocity: Vec2::new(2_000.0, 0.0),
        };

        simulator.step(0.01);

        assert_eq!(simulator.report.goals.get(&Team::Blue), Some(&1));
        assert_eq!(simulator.ball.position, Vec2::ZERO);
    }

    #[test]
    fn ball_leaving_touch_line_is_placed_back_at_rest() {
        let (_world, mut simulator, _) = simulator_with_robot(Pose::facing(0.0, 0.0, 0.0));
        simulator.ball = Ball {
            position: Vec2::new(1_000.0, 2_990.0),
            velocity: Vec2::new(0.0, 2_000.0),
        };

        simulator.step(0.01);

        assert_eq!(simulator.ball.velocity, Vec2::ZERO);
        assert_eq!(simulator.ball.position.y, 3_000.0);
        assert!(simulator.report.goals.is_empty());
    }

    #[test]
    fn observations_reach_the_world_model() {
        let (world, mut simulator, robot) =
            simulator_with_robot(Pose::facing(100.0, 200.0, 1.0));

        simulator.observe();

        assert_eq!(
            world.robot_position(Team::Blue, robot),
            Some(Pose::facing(100.0, 200.0, 1.0))
        );
        assert!(!world.is_robot_lost(Team::Blue, robot));
        assert_eq!(world.ball_position(), Some(Vec2::ZERO));
    }
}
