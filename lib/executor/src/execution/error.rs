use std::{
    fmt::{Display, Formatter as FmtFormatter, Result as FmtResult},
    time::Duration,
};

use serde::Serialize;

use crate::store::{EntityKey, FetchError};

/// Failures that end the whole request. No partial response is produced.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("Request was cancelled")]
    Cancelled,
    #[error("Request did not complete within {0:?}")]
    TimedOut(Duration),
    #[error("Mutations are not supported by the configured backing store")]
    MutationsUnsupported,
}

/// A failed round trip. Only the nodes fed by it are affected.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("Failed to fetch \"{target}\": {source}")]
pub struct FetchBatchError {
    /// `Source.edge` for keyed fetches, `Query.field` or `Mutation.field` for root fields.
    pub target: String,
    pub source: FetchError,
}

/// Rows the store returned that don't fit the request. They are dropped and the request proceeds.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AssemblyAnomaly {
    UnrequestedKey {
        edge: String,
        key: EntityKey,
        rows: usize,
    },
    ExtraRowsForOne {
        edge: String,
        key: EntityKey,
        rows: usize,
    },
}

impl Display for AssemblyAnomaly {
    fn fmt(&self, f: &mut FmtFormatter<'_>) -> FmtResult {
        match self {
            AssemblyAnomaly::UnrequestedKey { edge, key, rows } => write!(
                f,
                "\"{}\" returned {} row(s) for unrequested key {}",
                edge, rows, key
            ),
            AssemblyAnomaly::ExtraRowsForOne { edge, key, rows } => write!(
                f,
                "\"{}\" returned {} rows for key {}, only the first one is kept",
                edge, rows, key
            ),
        }
    }
}
