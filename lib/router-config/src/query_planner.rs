use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, JsonSchema, Clone)]
#[serde(deny_unknown_fields)]
pub struct QueryPlannerConfig {
    /// The maximum number of nested selections (root field included) an operation may have.
    /// Deeper operations are rejected before anything is fetched.
    ///
    /// Can also be set via the `MAX_DEPTH` environment variable.
    ///
    /// Default: 5.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// A flag to allow exposing the execution plan in the response.
    /// When set to `true` and a request asks for it, the plan is returned under `extensions.queryPlan`.
    #[serde(default = "default_allow_expose")]
    pub allow_expose: bool,
}

impl Default for QueryPlannerConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            allow_expose: default_allow_expose(),
        }
    }
}

fn default_max_depth() -> usize {
    5
}

fn default_allow_expose() -> bool {
    false
}
