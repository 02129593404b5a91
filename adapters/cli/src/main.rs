#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that runs both team control loops against a headless
//! field simulation.

mod config;
mod simulation;

use std::{path::PathBuf, sync::Arc, thread, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use ssl_strategy_core::{OperatorInput, Role, RobotId, Team, Vec2};
use ssl_strategy_system_control::{ControlLoop, Mode};
use ssl_strategy_system_pathfinding::PlannerTuning;
use ssl_strategy_system_roles::TeamStrategy;
use ssl_strategy_world::{query, GameState};
use tracing_subscriber::EnvFilter;

use config::StrategyConfig;
use simulation::{SimulationReport, Simulator};

/// Decision logic selectable from the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum CliMode {
    /// Only derive speeds and stop lost robots.
    Idle,
    /// Drive the selected robot to the operator target.
    Interactive,
    /// Collect the ball and wait for a pass.
    PassDemo,
    /// Play the configured lineup.
    Match,
}

#[derive(Parser, Debug)]
#[command(
    name = "ssl-strategy",
    about = "Runs the SSL strategy engine against a headless field simulation"
)]
struct Cli {
    /// TOML file overriding the built-in configuration.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Decision logic run by both teams.
    #[arg(long, value_enum, default_value_t = CliMode::Match)]
    mode: CliMode,

    /// Control tick interval in milliseconds.
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Length of the run in seconds.
    #[arg(long, default_value_t = 10.0)]
    duration_secs: f32,

    /// Seed for the planners and the simulated noise.
    #[arg(long)]
    seed: Option<u64>,

    /// Robots placed on the field for each team.
    #[arg(long)]
    robots: Option<u32>,

    /// Blue robot driven in interactive mode.
    #[arg(long, default_value_t = 0)]
    select: u32,

    /// Target of the selected robot in interactive mode.
    #[arg(long, num_args = 2, value_names = ["X", "Y"], allow_negative_numbers = true)]
    target: Option<Vec<f32>>,

    /// Spin the selected robot's dribbler in interactive mode.
    #[arg(long)]
    dribble: bool,

    /// Print the effective configuration as TOML and exit.
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    fn configuration(&self) -> Result<StrategyConfig> {
        let mut config = match &self.config {
            Some(path) => StrategyConfig::load(path)?,
            None => StrategyConfig::default(),
        };
        if let Some(tick_ms) = self.tick_ms {
            config.control.tick_interval_ms = tick_ms;
        }
        if let Some(seed) = self.seed {
            config.planner.seed = seed;
            config.simulation.seed = seed;
        }
        if let Some(robots) = self.robots {
            config.simulation.robots_per_team = robots;
        }
        Ok(config)
    }

    fn mode(&self, config: &StrategyConfig) -> Mode {
        match self.mode {
            CliMode::Idle => Mode::Idle,
            CliMode::Interactive => Mode::Interactive,
            CliMode::PassDemo => Mode::PassDemo,
            CliMode::Match => Mode::Match(config.lineup.clone()),
        }
    }

    fn operator_input(&self) -> OperatorInput {
        let target = self
            .target
            .as_deref()
            .and_then(|target| match target {
                [x, y] => Some(Vec2::new(*x, *y)),
                _ => None,
            });
        OperatorInput {
            selected: Some((Team::Blue, RobotId::new(self.select))),
            target,
            dribble: self.dribble,
            ..OperatorInput::default()
        }
    }
}

/// Entry point for the SSL strategy command-line interface.
fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config = cli.configuration()?;
    if cli.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }
    run(&cli, &config)
}

fn run(cli: &Cli, config: &StrategyConfig) -> Result<()> {
    let world = Arc::new(GameState::new(config.world));
    for team in Team::ALL {
        for id in 0..config.simulation.robots_per_team {
            world.register_robot(team, RobotId::new(id));
        }
        if let Some(goalie) = config.lineup.robot_for(Role::Goalie) {
            world.set_goalie(team, goalie);
        }
    }
    if cli.mode == CliMode::Interactive {
        world.set_operator_input(cli.operator_input());
    }

    let simulator = Simulator::new(Arc::clone(&world), config.simulation, config.radio)?
        .spawn()?;

    let mode = cli.mode(config);
    let mut loops = Vec::with_capacity(Team::ALL.len());
    for (offset, team) in Team::ALL.into_iter().enumerate() {
        let planner = PlannerTuning {
            seed: config.planner.seed.wrapping_add(offset as u64),
            ..config.planner
        };
        let strategy = TeamStrategy::new(team, config.roles, config.interception, planner);
        let mut control = ControlLoop::new(Arc::clone(&world), strategy, config.control);
        control
            .start(mode.clone(), config.control.tick_interval())
            .with_context(|| format!("failed to start {team} control loop"))?;
        loops.push(control);
    }

    world.begin_game();
    thread::sleep(Duration::from_secs_f32(cli.duration_secs.max(0.0)));

    let mut searches = Vec::with_capacity(loops.len());
    for mut control in loops {
        control
            .stop()
            .with_context(|| format!("failed to stop {} control loop", control.team()))?;
        searches.push((
            control.team(),
            control.with_strategy(|strategy| strategy.pathfinder().search_count()),
        ));
    }
    let report = simulator.stop()?;

    summarize(&world, &report, &searches);
    Ok(())
}

fn summarize(world: &GameState, report: &SimulationReport, searches: &[(Team, u64)]) {
    println!("simulated {} steps, {} kicks", report.steps, report.kicks);
    for team in Team::ALL {
        let goals = report.goals.get(&team).copied().unwrap_or(0);
        let planned = searches
            .iter()
            .find(|(searched, _)| *searched == team)
            .map_or(0, |(_, count)| *count);
        println!("{team}: {goals} goals, {planned} path searches");
    }
    for robot in query::robots(world) {
        println!(
            "  {} {}: ({:.0}, {:.0}) heading {:.2}",
            robot.team,
            robot.id,
            robot.pose.x,
            robot.pose.y,
            robot.pose.orientation.unwrap_or(0.0)
        );
    }
    if let Some(ball) = query::ball(world) {
        println!(
            "  ball: ({:.0}, {:.0}) speed {:.0}",
            ball.position.x,
            ball.position.y,
            ball.velocity.length()
        );
    }
}
