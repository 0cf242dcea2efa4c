use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, JsonSchema, Clone)]
#[serde(deny_unknown_fields)]
pub struct TrafficShapingConfig {
    /// Limits how many fetches of a single request may be in flight against the backing store at once.
    /// Fetches of the same plan level beyond this limit wait for a free slot.
    ///
    /// Can also be set via the `MAX_IN_FLIGHT_FETCHES` environment variable.
    #[serde(default = "default_max_in_flight_fetches")]
    pub max_in_flight_fetches: usize,

    /// The maximum time a request may spend executing its plan, e.g. `5s` or `250ms`.
    /// When the deadline is reached, in-flight fetches are abandoned and the request fails.
    ///
    /// Can also be set via the `REQUEST_TIMEOUT` environment variable.
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub request_timeout: Option<Duration>,
}

impl Default for TrafficShapingConfig {
    fn default() -> Self {
        Self {
            max_in_flight_fetches: default_max_in_flight_fetches(),
            request_timeout: None,
        }
    }
}

fn default_max_in_flight_fetches() -> usize {
    16
}
