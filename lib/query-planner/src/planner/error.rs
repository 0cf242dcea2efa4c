use crate::schema::SchemaError;

#[derive(Debug, Clone, thiserror::Error)]
pub enum QueryPlanError {
    #[error("Selection \"{path}\" is inconsistent with the schema: {source}")]
    SchemaConsistency { path: String, source: SchemaError },
    #[error("Query depth of {depth} exceeds the maximum allowed depth of {max_depth}")]
    DepthLimitExceeded { depth: usize, max_depth: usize },
    #[error("Operation does not select any root field")]
    EmptyOperation,
}

impl QueryPlanError {
    pub(crate) fn consistency(path: &[String], source: SchemaError) -> Self {
        QueryPlanError::SchemaConsistency {
            path: path.join("."),
            source,
        }
    }
}
