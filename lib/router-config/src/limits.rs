use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, Default)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    /// Configuration of limiting the depth of the incoming GraphQL documents, checked right after parsing.
    /// If not specified, only the planner's own `query_planner.max_depth` applies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<MaxDepthRuleConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct MaxDepthRuleConfig {
    /// Depth threshold
    pub n: usize,

    #[serde(default = "default_expose_limits")]
    /// Whether to expose the limits in the error message.
    pub expose_limits: bool,
}

fn default_expose_limits() -> bool {
    true
}
