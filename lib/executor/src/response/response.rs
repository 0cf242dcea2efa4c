use serde::Serialize;

use crate::response::{graphql_error::GraphQLError, value::Value};

/// `{ "data": ..., "errors": [...] }`. `data` is null when the request failed as a whole.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ExecutionResponse {
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphQLError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<serde_json::Value>,
}

impl ExecutionResponse {
    pub fn from_errors(errors: Vec<GraphQLError>) -> Self {
        ExecutionResponse {
            data: None,
            errors,
            extensions: None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
