use graphql_parser::query::ParseError;
use relgraph_query_planner::{ast::error::LoweringError, planner::error::QueryPlanError};

use crate::{execution::error::ExecutionError, response::graphql_error::GraphQLError};

/// Errors that fail the whole request. They are reported with `data: null`.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Failed to parse GraphQL operation: {0}")]
    FailedToParseOperation(ParseError),
    #[error("{0}")]
    MaxDepthExceeded(String),
    #[error(transparent)]
    LoweringError(#[from] LoweringError),
    #[error(transparent)]
    PlannerError(#[from] QueryPlanError),
    #[error(transparent)]
    ExecutionError(#[from] ExecutionError),
}

impl PipelineError {
    pub fn graphql_error_code(&self) -> &'static str {
        match self {
            Self::FailedToParseOperation(_) => "GRAPHQL_PARSE_FAILED",
            Self::MaxDepthExceeded(_) => "DEPTH_LIMIT_EXCEEDED",
            Self::LoweringError(
                LoweringError::OperationNotFound
                | LoweringError::SpecifiedOperationNotFound(_)
                | LoweringError::MultipleMatchingOperationsFound,
            ) => "OPERATION_RESOLUTION_FAILURE",
            Self::LoweringError(
                LoweringError::MissingVariable(_) | LoweringError::InvalidValue { .. },
            ) => "BAD_USER_INPUT",
            Self::LoweringError(_) => "GRAPHQL_VALIDATION_FAILED",
            Self::PlannerError(QueryPlanError::DepthLimitExceeded { .. }) => {
                "DEPTH_LIMIT_EXCEEDED"
            }
            Self::PlannerError(_) => "GRAPHQL_VALIDATION_FAILED",
            Self::ExecutionError(ExecutionError::Cancelled) => "REQUEST_CANCELLED",
            Self::ExecutionError(ExecutionError::TimedOut(_)) => "REQUEST_TIMEOUT",
            Self::ExecutionError(ExecutionError::MutationsUnsupported) => "INTERNAL_SERVER_ERROR",
        }
    }

    pub fn graphql_error_message(&self) -> String {
        match self {
            Self::ExecutionError(ExecutionError::MutationsUnsupported) => {
                "Unexpected error".to_string()
            }
            _ => self.to_string(),
        }
    }

    pub fn to_graphql_error(&self) -> GraphQLError {
        GraphQLError::from_message_and_code(self.graphql_error_message(), self.graphql_error_code())
    }
}
