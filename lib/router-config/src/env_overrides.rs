use config::{builder::BuilderState, ConfigBuilder, ConfigError};
use envconfig::Envconfig;
use tracing::debug;

use crate::log::{LogFormat, LogLevel};

#[derive(Envconfig)]
pub struct EnvVarOverrides {
    // Logger overrides
    #[envconfig(from = "LOG_LEVEL")]
    pub log_level: Option<LogLevel>,
    #[envconfig(from = "LOG_FORMAT")]
    pub log_format: Option<LogFormat>,
    #[envconfig(from = "LOG_FILTER")]
    pub log_filter: Option<String>,

    // Planner overrides
    #[envconfig(from = "MAX_DEPTH")]
    pub max_depth: Option<u64>,

    // Traffic shaping overrides
    #[envconfig(from = "MAX_IN_FLIGHT_FETCHES")]
    pub max_in_flight_fetches: Option<u64>,
    #[envconfig(from = "REQUEST_TIMEOUT")]
    pub request_timeout: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum EnvVarOverridesError {
    #[error("Failed to override configuration: {0}")]
    FailedToOverrideConfig(#[from] ConfigError),
    #[error("REQUEST_TIMEOUT is not a valid duration: {0}")]
    InvalidRequestTimeout(#[from] humantime::DurationError),
}

impl EnvVarOverrides {
    pub fn apply_overrides<T: BuilderState>(
        mut self,
        mut config: ConfigBuilder<T>,
    ) -> Result<ConfigBuilder<T>, EnvVarOverridesError> {
        if let Some(log_level) = self.log_level.take() {
            debug!("[config-override] 'log.level' = {:?}", log_level);
            config = config.set_override("log.level", log_level.as_str())?;
        }
        if let Some(log_format) = self.log_format.take() {
            debug!("[config-override] 'log.format' = {:?}", log_format);
            config = config.set_override("log.format", log_format.as_str())?;
        }
        if let Some(log_filter) = self.log_filter.take() {
            debug!("[config-override] 'log.filter' = {:?}", log_filter);
            config = config.set_override("log.filter", log_filter)?;
        }

        if let Some(max_depth) = self.max_depth.take() {
            debug!("[config-override] 'query_planner.max_depth' = {}", max_depth);
            config = config.set_override("query_planner.max_depth", max_depth)?;
        }

        if let Some(max_in_flight) = self.max_in_flight_fetches.take() {
            debug!(
                "[config-override] 'traffic_shaping.max_in_flight_fetches' = {}",
                max_in_flight
            );
            config = config.set_override("traffic_shaping.max_in_flight_fetches", max_in_flight)?;
        }

        if let Some(request_timeout) = self.request_timeout.take() {
            humantime::parse_duration(&request_timeout)?;
            debug!(
                "[config-override] 'traffic_shaping.request_timeout' = {}",
                request_timeout
            );
            config = config.set_override("traffic_shaping.request_timeout", request_timeout)?;
        }

        Ok(config)
    }
}
