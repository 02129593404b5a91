//! Engine configuration assembled from defaults, an optional TOML file and
//! command-line overrides.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use ssl_strategy_core::{Role, RobotId};
use ssl_strategy_radio::WireScale;
use ssl_strategy_system_control::{ControlTuning, Lineup};
use ssl_strategy_system_interception::InterceptionTuning;
use ssl_strategy_system_pathfinding::PlannerTuning;
use ssl_strategy_system_roles::RoleTuning;
use ssl_strategy_world::WorldConfig;

use crate::simulation::SimulationConfig;

/// Every tunable of the engine, one table per subsystem.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct StrategyConfig {
    pub(crate) world: WorldConfig,
    pub(crate) planner: PlannerTuning,
    pub(crate) interception: InterceptionTuning,
    pub(crate) roles: RoleTuning,
    pub(crate) control: ControlTuning,
    pub(crate) radio: WireScale,
    pub(crate) simulation: SimulationConfig,
    pub(crate) lineup: Lineup,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            world: WorldConfig::default(),
            planner: PlannerTuning::default(),
            interception: InterceptionTuning::default(),
            roles: RoleTuning::default(),
            control: ControlTuning::default(),
            radio: WireScale::default(),
            simulation: SimulationConfig::default(),
            lineup: Lineup::new()
                .with(RobotId::new(0), Role::Goalie)
                .with(RobotId::new(1), Role::Defender)
                .with(RobotId::new(2), Role::Attacker),
        }
    }
}

impl StrategyConfig {
    /// Reads a configuration file. Missing tables and keys keep their defaults.
    pub(crate) fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    pub(crate) fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("invalid strategy configuration")
    }

    pub(crate) fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to render configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = StrategyConfig::from_toml("").expect("empty config");

        assert_eq!(config, StrategyConfig::default());
        assert_eq!(config.lineup.role_of(RobotId::new(0)), Some(Role::Goalie));
    }

    #[test]
    fn partial_tables_override_only_named_keys() {
        let config = StrategyConfig::from_toml(
            r#"
            [world]
            lost_timeout_ms = 250

            [control]
            tick_interval_ms = 10

            [[lineup]]
            robot = 4
            role = "attacker"
            "#,
        )
        .expect("valid config");

        assert_eq!(config.world.lost_timeout_ms, 250);
        assert_eq!(config.world.robot_max_speed, WorldConfig::default().robot_max_speed);
        assert_eq!(config.control.tick_interval_ms, 10);
        assert_eq!(config.lineup.robot_for(Role::Attacker), Some(RobotId::new(4)));
        assert_eq!(config.lineup.iter().count(), 1);
    }

    #[test]
    fn unknown_role_is_rejected() {
        let error = StrategyConfig::from_toml("[[lineup]]\nrobot = 1\nrole = \"striker\"\n")
            .expect_err("unknown role");

        assert!(format!("{error:#}").contains("striker"));
    }

    #[test]
    fn rendered_configuration_parses_back() {
        let config = StrategyConfig::default();
        let rendered = config.to_toml().expect("serialisable");

        assert_eq!(StrategyConfig::from_toml(&rendered).expect("parses"), config);
    }

    #[test]
    fn missing_file_names_the_path() {
        let error = StrategyConfig::load(Path::new("/nonexistent/ssl-strategy.toml"))
            .expect_err("missing file");

        assert!(error.to_string().contains("/nonexistent/ssl-strategy.toml"));
    }
}
