mod env_overrides;
pub mod limits;
pub mod log;
pub mod query_planner;
pub mod traffic_shaping;

use std::convert::Infallible;
use std::path::PathBuf;

use config::{Config, File, FileFormat, FileSourceFile};
use envconfig::Envconfig;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
    env_overrides::{EnvVarOverrides, EnvVarOverridesError},
    limits::LimitsConfig,
    log::LoggingConfig,
    query_planner::QueryPlannerConfig,
    traffic_shaping::TrafficShapingConfig,
};

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// The engine logger configuration.
    ///
    /// By default the engine logs `info` and above in release builds and `debug` in debug builds.
    #[serde(default)]
    pub log: LoggingConfig,

    /// Query planning configuration.
    #[serde(default)]
    pub query_planner: QueryPlannerConfig,

    /// Controls how a request's fetches are issued against the backing store.
    #[serde(default)]
    pub traffic_shaping: TrafficShapingConfig,

    /// Pre-flight checks applied to the parsed document before it is lowered and planned.
    #[serde(default)]
    pub limits: LimitsConfig,
}

impl EngineConfig {
    /// Rejects values that would make every request fail or hang.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.query_planner.max_depth == 0 {
            return Err(ConfigError::InvalidValue(
                "query_planner.max_depth must be at least 1",
            ));
        }
        if self.traffic_shaping.max_in_flight_fetches == 0 {
            return Err(ConfigError::InvalidValue(
                "traffic_shaping.max_in_flight_fetches must be at least 1",
            ));
        }
        if self.limits.max_depth.as_ref().is_some_and(|rule| rule.n == 0) {
            return Err(ConfigError::InvalidValue("limits.max_depth.n must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    ConfigLoadError(#[from] config::ConfigError),
    #[error("Failed to apply configuration overrides: {0}")]
    EnvVarOverridesError(#[from] EnvVarOverridesError),
    #[error("Failed to load the environment variables: {0}")]
    EnvVarLoadError(#[from] envconfig::Error),
    #[error("Failed to parse the configuration file path: {0}")]
    ConfigPathParseError(Infallible),
    #[error("Invalid configuration: {0}")]
    InvalidValue(&'static str),
}

static DEFAULT_FILE_NAMES: &[&str] = &[
    "relgraph.config.yaml",
    "relgraph.config.yml",
    "relgraph.config.json",
    "relgraph.config.json5",
];

/// Loads the configuration from `override_config_path`, or from the first default file name found
/// in the working directory, then applies environment overrides.
pub fn load_config(override_config_path: Option<String>) -> Result<EngineConfig, ConfigError> {
    let env_overrides = EnvVarOverrides::init_from_env()?;
    let mut config = Config::builder();

    if let Some(path_str) = override_config_path {
        let path_buf = path_str
            .parse::<PathBuf>()
            .map_err(ConfigError::ConfigPathParseError)?;
        let as_file: File<FileSourceFile, _> = path_buf.into();

        config = config.add_source(as_file.required(true));
    } else {
        for name in DEFAULT_FILE_NAMES {
            config = config.add_source(File::with_name(name).required(false));
        }
    }

    config = env_overrides.apply_overrides(config)?;

    let engine_config = config.build()?.try_deserialize::<EngineConfig>()?;
    engine_config.validate()?;

    Ok(engine_config)
}

pub fn parse_yaml_config(config_raw: &str) -> Result<EngineConfig, ConfigError> {
    let engine_config = Config::builder()
        .add_source(File::from_str(config_raw, FileFormat::Yaml))
        .build()?
        .try_deserialize::<EngineConfig>()?;
    engine_config.validate()?;

    Ok(engine_config)
}
