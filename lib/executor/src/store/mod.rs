pub mod error;
pub mod memory;

use std::{
    fmt::{Display, Formatter as FmtFormatter, Result as FmtResult},
    sync::Arc,
};

use async_trait::async_trait;
use indexmap::IndexMap;
use relgraph_query_planner::{
    ast::{selection::Filter, value::ScalarValue},
    schema::RelationEdge,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

pub use error::FetchError;

/// Column name to value, in the order the columns were requested.
pub type Row = IndexMap<String, ScalarValue>;

/// Rows of one keyed fetch, grouped by the parent key they belong to.
pub type GroupedRows = IndexMap<EntityKey, Vec<Row>>;

/// A value that can join a parent row to its children.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum EntityKey {
    Int(i64),
    String(String),
}

impl EntityKey {
    /// Nulls, booleans and floats never act as keys.
    pub fn from_value(value: &ScalarValue) -> Option<EntityKey> {
        match value {
            ScalarValue::Int(i) => Some(EntityKey::Int(*i)),
            ScalarValue::String(s) => Some(EntityKey::String(s.clone())),
            _ => None,
        }
    }
}

impl Display for EntityKey {
    fn fmt(&self, f: &mut FmtFormatter<'_>) -> FmtResult {
        match self {
            EntityKey::Int(i) => write!(f, "{}", i),
            EntityKey::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for EntityKey {
    fn from(value: &str) -> Self {
        EntityKey::String(value.to_string())
    }
}

/// Copies the requested columns out of `row`, in the requested order. Missing columns become null.
pub fn project(row: &Row, fields: &[String]) -> Row {
    fields
        .iter()
        .map(|field| (field.clone(), row.get(field).cloned().unwrap_or_default()))
        .collect()
}

pub struct RootFetchRequest<'a> {
    pub entity: &'a str,
    pub filter: Option<&'a Filter>,
    pub fields: &'a [String],
    pub cancellation: &'a CancellationToken,
}

/// One FetchBatch: every distinct parent key of a plan entry, fetched through a single edge.
pub struct KeyedFetchRequest<'a> {
    pub edge: &'a RelationEdge,
    pub keys: &'a [EntityKey],
    pub filter: Option<&'a Filter>,
    pub fields: &'a [String],
    pub cancellation: &'a CancellationToken,
}

/// Read side of the backing store.
///
/// `fetch_by_keys` answers with the child rows of every requested parent key, grouped by that key.
/// Keys without children may be left out; the executor fills them in.
/// Implementations should stop working once the request's cancellation token fires.
#[async_trait]
pub trait BackingStore {
    async fn fetch_root<'a>(&self, request: RootFetchRequest<'a>) -> Result<Vec<Row>, FetchError>;

    async fn fetch_by_keys<'a>(
        &self,
        request: KeyedFetchRequest<'a>,
    ) -> Result<GroupedRows, FetchError>;

    fn to_boxed_arc<'a>(self) -> Arc<Box<dyn BackingStore + Send + Sync + 'a>>
    where
        Self: Sized + Send + Sync + 'a,
    {
        Arc::new(Box::new(self))
    }
}

pub type BackingStoreType = dyn BackingStore + Send + Sync;

pub type BackingStoreBoxedArc = Arc<Box<BackingStoreType>>;

/// Write side of the backing store.
#[async_trait]
pub trait MutationStore {
    /// Returns the stored row, primary key included.
    async fn insert(
        &self,
        entity: &str,
        values: &[(String, ScalarValue)],
    ) -> Result<Row, FetchError>;

    async fn update(
        &self,
        entity: &str,
        id: &ScalarValue,
        values: &[(String, ScalarValue)],
    ) -> Result<Row, FetchError>;

    async fn delete(&self, entity: &str, id: &ScalarValue) -> Result<(), FetchError>;

    /// Returns the parent row as stored once the link is committed.
    async fn link(
        &self,
        edge: &RelationEdge,
        parent: &ScalarValue,
        child: &ScalarValue,
    ) -> Result<Row, FetchError>;

    async fn unlink(
        &self,
        edge: &RelationEdge,
        parent: &ScalarValue,
        child: &ScalarValue,
    ) -> Result<(), FetchError>;

    fn to_boxed_arc<'a>(self) -> Arc<Box<dyn MutationStore + Send + Sync + 'a>>
    where
        Self: Sized + Send + Sync + 'a,
    {
        Arc::new(Box::new(self))
    }
}

pub type MutationStoreType = dyn MutationStore + Send + Sync;

pub type MutationStoreBoxedArc = Arc<Box<MutationStoreType>>;
