use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use ahash::{AHashMap, AHashSet, RandomState};
use async_trait::async_trait;
use dashmap::DashMap;
use relgraph_query_planner::{
    ast::{selection::Filter, value::ScalarValue},
    schema::{EdgeDirection, EntityType, RelationEdge, SchemaRegistry},
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::store::{
    error::{FetchError, FixtureError},
    project, BackingStore, EntityKey, GroupedRows, KeyedFetchRequest, MutationStore, RootFetchRequest,
    Row,
};

/// Records kept by a new store; older ones are dropped first.
pub const DEFAULT_FETCH_LOG_CAPACITY: usize = 1024;

/// One round trip the store has answered, in the order the calls arrived.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FetchRecord {
    Root {
        entity: String,
        filter: Option<Filter>,
    },
    Keyed {
        edge: String,
        keys: Vec<EntityKey>,
        filter: Option<Filter>,
    },
}

impl FetchRecord {
    /// Type name for root fetches, `Source.edge` for keyed ones.
    pub fn target(&self) -> &str {
        match self {
            FetchRecord::Root { entity, .. } => entity,
            FetchRecord::Keyed { edge, .. } => edge,
        }
    }
}

struct StoreState {
    registry: Arc<SchemaRegistry>,
    tables: DashMap<String, Vec<Row>, RandomState>,
    fetch_log: Mutex<VecDeque<FetchRecord>>,
    fetch_log_capacity: AtomicUsize,
    fetches: AtomicUsize,
    /// Keyed by type name (root fetches) or `Source.edge` (keyed fetches).
    failures: DashMap<String, FetchError, RandomState>,
    latencies: DashMap<String, Duration, RandomState>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Tables of rows kept in memory, used as the backing store of tests, benchmarks and the dev CLI.
///
/// Clones share the same tables, so one clone can serve reads while another serves mutations.
#[derive(Clone)]
pub struct InMemoryStore {
    state: Arc<StoreState>,
    latency: Option<Duration>,
}

impl InMemoryStore {
    /// An empty table for every registered type.
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        let tables = DashMap::with_hasher(RandomState::new());
        for entity in registry.types() {
            tables.insert(entity.name.clone(), Vec::new());
        }

        InMemoryStore {
            state: Arc::new(StoreState {
                registry,
                tables,
                fetch_log: Mutex::new(VecDeque::new()),
                fetch_log_capacity: AtomicUsize::new(DEFAULT_FETCH_LOG_CAPACITY),
                fetches: AtomicUsize::new(0),
                failures: DashMap::with_hasher(RandomState::new()),
                latencies: DashMap::with_hasher(RandomState::new()),
                in_flight: AtomicUsize::new(0),
                peak_in_flight: AtomicUsize::new(0),
            }),
            latency: None,
        }
    }

    /// Loads `{ "User": [{ "id": "U1", ... }], "Post": [...] }`.
    /// Values are coerced to the column kinds, missing columns are stored as null.
    pub fn from_fixture(
        registry: Arc<SchemaRegistry>,
        fixture: &serde_json::Value,
    ) -> Result<Self, FixtureError> {
        let store = InMemoryStore::new(registry);
        let tables = fixture.as_object().ok_or(FixtureError::NotAnObject)?;

        for (table, rows) in tables {
            let entity = store
                .state
                .registry
                .entity_type(table)
                .map_err(|_| FixtureError::UnknownType(table.clone()))?;
            let rows = rows
                .as_array()
                .ok_or_else(|| FixtureError::NotATable(table.clone()))?;

            let mut loaded = Vec::with_capacity(rows.len());
            for (index, row) in rows.iter().enumerate() {
                loaded.push(fixture_row(entity, index, row)?);
            }

            debug!(table = %table, rows = loaded.len(), "fixture table loaded");
            store.state.tables.insert(table.clone(), loaded);
        }

        Ok(store)
    }

    /// Delays every fetch by `latency`, unless a per-target latency is set.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Delays the fetches of one type (root fetches) or one `Source.edge` (keyed fetches).
    pub fn set_latency(&self, target: &str, latency: Duration) {
        self.state.latencies.insert(target.to_string(), latency);
    }

    /// Makes every following fetch of `target` fail with `error`.
    pub fn fail(&self, target: &str, error: FetchError) {
        self.state.failures.insert(target.to_string(), error);
    }

    pub fn clear_failures(&self) {
        self.state.failures.clear();
    }

    /// The most recent fetches, oldest first. Only the last `capacity` records are kept,
    /// see [`InMemoryStore::set_fetch_log_capacity`].
    pub fn fetch_log(&self) -> Vec<FetchRecord> {
        self.state
            .fetch_log
            .lock()
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Every fetch answered since the store was created or the log was cleared,
    /// including those dropped from the log.
    pub fn fetch_count(&self) -> usize {
        self.state.fetches.load(Ordering::SeqCst)
    }

    /// Bounds the fetch log of this store and of all its clones.
    pub fn set_fetch_log_capacity(&self, capacity: usize) {
        self.state
            .fetch_log_capacity
            .store(capacity, Ordering::SeqCst);
        if let Ok(mut log) = self.state.fetch_log.lock() {
            while log.len() > capacity {
                log.pop_front();
            }
        }
    }

    pub fn clear_fetch_log(&self) {
        if let Ok(mut log) = self.state.fetch_log.lock() {
            log.clear();
            self.state.fetches.store(0, Ordering::SeqCst);
        }
    }

    /// Highest number of fetches that were running at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.state.peak_in_flight.load(Ordering::SeqCst)
    }

    /// A copy of the stored rows of one type.
    pub fn rows(&self, entity: &str) -> Vec<Row> {
        self.state
            .tables
            .get(entity)
            .map(|rows| rows.value().clone())
            .unwrap_or_default()
    }

    fn record(&self, record: FetchRecord) {
        self.state.fetches.fetch_add(1, Ordering::SeqCst);
        let capacity = self.state.fetch_log_capacity.load(Ordering::SeqCst);
        if let Ok(mut log) = self.state.fetch_log.lock() {
            if capacity == 0 {
                return;
            }
            if log.len() >= capacity {
                log.pop_front();
            }
            log.push_back(record);
        }
    }

    fn injected_failure(&self, target: &str) -> Result<(), FetchError> {
        match self.state.failures.get(target) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn simulate_latency(
        &self,
        target: &str,
        cancellation: &CancellationToken,
    ) -> Result<(), FetchError> {
        if cancellation.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let latency = self
            .state
            .latencies
            .get(target)
            .map(|latency| *latency)
            .or(self.latency);

        let Some(latency) = latency else {
            return Ok(());
        };

        tokio::select! {
            _ = cancellation.cancelled() => Err(FetchError::Cancelled),
            _ = tokio::time::sleep(latency) => Ok(()),
        }
    }

    fn entity_type(&self, name: &str) -> Result<&Arc<EntityType>, FetchError> {
        self.state
            .registry
            .entity_type(name)
            .map_err(|e| FetchError::Internal(e.to_string()))
    }

    fn find_by_primary_key(&self, entity: &EntityType, id: &ScalarValue) -> Option<Row> {
        let table = self.state.tables.get(&entity.name)?;
        table
            .iter()
            .find(|row| row.get(&entity.primary_key) == Some(id))
            .cloned()
    }

    /// Every non-null foreign key stored on `row` must point at an existing row.
    fn check_references(&self, entity: &EntityType, row: &Row) -> Result<(), FetchError> {
        for edge in &entity.edges {
            if edge.direction != EdgeDirection::Owning || edge.join.through.is_some() {
                continue;
            }

            let Some(value) = row.get(&edge.join.parent_field) else {
                continue;
            };
            if value.is_null() {
                continue;
            }

            let exists = self
                .state
                .tables
                .get(&edge.target)
                .map(|rows| {
                    rows.iter()
                        .any(|target| target.get(&edge.join.child_field) == Some(value))
                })
                .unwrap_or(false);

            if !exists {
                return Err(FetchError::Constraint(format!(
                    "\"{}.{}\" references a missing {} {}",
                    entity.name, edge.join.parent_field, edge.target, value
                )));
            }
        }

        Ok(())
    }
}

fn fixture_row(
    entity: &EntityType,
    index: usize,
    row: &serde_json::Value,
) -> Result<Row, FixtureError> {
    let object = row.as_object().ok_or_else(|| FixtureError::NotARow {
        table: entity.name.clone(),
        index,
    })?;

    if let Some(column) = object.keys().find(|column| entity.field(column).is_none()) {
        return Err(FixtureError::UnknownColumn {
            table: entity.name.clone(),
            column: column.clone(),
        });
    }

    let mut loaded = Row::with_capacity(entity.fields.len());
    for field in &entity.fields {
        let value = match object.get(&field.name) {
            Some(value) => ScalarValue::from_json(value)
                .and_then(|value| value.coerce(field.kind))
                .ok_or_else(|| FixtureError::InvalidValue {
                    table: entity.name.clone(),
                    column: field.name.clone(),
                    index,
                })?,
            None => ScalarValue::Null,
        };
        loaded.insert(field.name.clone(), value);
    }

    Ok(loaded)
}

fn passes(filter: Option<&Filter>, row: &Row) -> bool {
    filter.is_none_or(|filter| filter.matches(row.get(&filter.field)))
}

struct InFlight<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> InFlight<'a> {
    fn enter(state: &'a StoreState) -> Self {
        let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        state.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlight {
            counter: &state.in_flight,
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl BackingStore for InMemoryStore {
    async fn fetch_root<'a>(&self, request: RootFetchRequest<'a>) -> Result<Vec<Row>, FetchError> {
        self.record(FetchRecord::Root {
            entity: request.entity.to_string(),
            filter: request.filter.cloned(),
        });
        let _in_flight = InFlight::enter(&self.state);

        self.simulate_latency(request.entity, request.cancellation)
            .await?;
        self.injected_failure(request.entity)?;

        let table = self.state.tables.get(request.entity).ok_or_else(|| {
            FetchError::Internal(format!("no table for type \"{}\"", request.entity))
        })?;

        let rows: Vec<Row> = table
            .iter()
            .filter(|row| passes(request.filter, row))
            .map(|row| project(row, request.fields))
            .collect();

        trace!(entity = request.entity, rows = rows.len(), "root fetch answered");

        Ok(rows)
    }

    async fn fetch_by_keys<'a>(
        &self,
        request: KeyedFetchRequest<'a>,
    ) -> Result<GroupedRows, FetchError> {
        let edge = request.edge;
        let edge_key = edge.key();
        self.record(FetchRecord::Keyed {
            edge: edge_key.clone(),
            keys: request.keys.to_vec(),
            filter: request.filter.cloned(),
        });
        let _in_flight = InFlight::enter(&self.state);

        self.simulate_latency(&edge_key, request.cancellation)
            .await?;
        self.injected_failure(&edge_key)?;

        let requested: AHashSet<&EntityKey> = request.keys.iter().collect();

        // (parent key, child key) pairs read from the join table, before the target table is locked.
        let links = match &edge.join.through {
            Some(join) => {
                let links = self.state.tables.get(&join.entity).ok_or_else(|| {
                    FetchError::Internal(format!("no table for type \"{}\"", join.entity))
                })?;
                let pairs: Vec<(EntityKey, EntityKey)> = links
                    .iter()
                    .filter_map(|link| {
                        let parent = link
                            .get(&join.parent_column)
                            .and_then(EntityKey::from_value)?;
                        let child = link.get(&join.child_column).and_then(EntityKey::from_value)?;
                        requested.contains(&parent).then_some((parent, child))
                    })
                    .collect();
                Some(pairs)
            }
            None => None,
        };

        let targets = self.state.tables.get(&edge.target).ok_or_else(|| {
            FetchError::Internal(format!("no table for type \"{}\"", edge.target))
        })?;

        let mut groups = GroupedRows::new();

        match links {
            None => {
                for row in targets.iter() {
                    let Some(key) = row
                        .get(&edge.join.child_field)
                        .and_then(EntityKey::from_value)
                    else {
                        continue;
                    };
                    if requested.contains(&key) && passes(request.filter, row) {
                        groups
                            .entry(key)
                            .or_default()
                            .push(project(row, request.fields));
                    }
                }
            }
            Some(pairs) => {
                let mut by_child_key: AHashMap<EntityKey, Vec<&Row>> = AHashMap::new();
                for row in targets.iter() {
                    if let Some(key) = row
                        .get(&edge.join.child_field)
                        .and_then(EntityKey::from_value)
                    {
                        by_child_key.entry(key).or_default().push(row);
                    }
                }

                for (parent, child) in pairs {
                    for row in by_child_key.get(&child).into_iter().flatten() {
                        if passes(request.filter, row) {
                            groups
                                .entry(parent.clone())
                                .or_default()
                                .push(project(row, request.fields));
                        }
                    }
                }
            }
        }

        trace!(edge = %edge_key, keys = request.keys.len(), groups = groups.len(), "keyed fetch answered");

        Ok(groups)
    }
}

#[async_trait]
impl MutationStore for InMemoryStore {
    async fn insert(
        &self,
        entity: &str,
        values: &[(String, ScalarValue)],
    ) -> Result<Row, FetchError> {
        let entity_type = self.entity_type(entity)?;

        let mut row: Row = entity_type
            .fields
            .iter()
            .map(|field| (field.name.clone(), ScalarValue::Null))
            .collect();
        row.insert(
            entity_type.primary_key.clone(),
            ScalarValue::String(uuid::Uuid::new_v4().to_string()),
        );
        apply_values(entity_type, &mut row, values)?;
        self.check_references(entity_type, &row)?;

        self.state
            .tables
            .entry(entity.to_string())
            .or_default()
            .push(row.clone());

        debug!(entity, "row inserted");

        Ok(row)
    }

    async fn update(
        &self,
        entity: &str,
        id: &ScalarValue,
        values: &[(String, ScalarValue)],
    ) -> Result<Row, FetchError> {
        let entity_type = self.entity_type(entity)?;

        // References are checked before the table is locked: the referenced table can share
        // its shard.
        let mut changes = Row::new();
        apply_values(entity_type, &mut changes, values)?;
        self.check_references(entity_type, &changes)?;

        let mut table = self
            .state
            .tables
            .get_mut(entity)
            .ok_or_else(|| missing_record(entity, id))?;
        let stored = table
            .iter_mut()
            .find(|stored| stored.get(&entity_type.primary_key) == Some(id))
            .ok_or_else(|| missing_record(entity, id))?;
        for (column, value) in changes {
            stored.insert(column, value);
        }
        let row = stored.clone();
        drop(table);

        debug!(entity, id = %id, "row updated");

        Ok(row)
    }

    async fn delete(&self, entity: &str, id: &ScalarValue) -> Result<(), FetchError> {
        let entity_type = self.entity_type(entity)?;
        let mut table = self
            .state
            .tables
            .get_mut(entity)
            .ok_or_else(|| missing_record(entity, id))?;

        let position = table
            .iter()
            .position(|row| row.get(&entity_type.primary_key) == Some(id))
            .ok_or_else(|| missing_record(entity, id))?;
        table.remove(position);

        debug!(entity, id = %id, "row deleted");

        Ok(())
    }

    async fn link(
        &self,
        edge: &RelationEdge,
        parent: &ScalarValue,
        child: &ScalarValue,
    ) -> Result<Row, FetchError> {
        let join = edge.join.through.as_ref().ok_or_else(|| {
            FetchError::Internal(format!("edge \"{}\" has no join table", edge.key()))
        })?;

        let source = self.entity_type(&edge.source)?;
        let parent_row = self
            .find_by_primary_key(source, parent)
            .ok_or_else(|| missing_record(&edge.source, parent))?;
        let target = self.entity_type(&edge.target)?;
        if self.find_by_primary_key(target, child).is_none() {
            return Err(missing_record(&edge.target, child));
        }

        let join_type = self.entity_type(&join.entity)?;
        let mut link: Row = join_type
            .fields
            .iter()
            .map(|field| (field.name.clone(), ScalarValue::Null))
            .collect();
        link.insert(
            join_type.primary_key.clone(),
            ScalarValue::String(uuid::Uuid::new_v4().to_string()),
        );
        link.insert(join.parent_column.clone(), parent.clone());
        link.insert(join.child_column.clone(), child.clone());

        let mut links = self.state.tables.entry(join.entity.clone()).or_default();
        let exists = links.iter().any(|row| {
            row.get(&join.parent_column) == Some(parent)
                && row.get(&join.child_column) == Some(child)
        });
        if exists {
            return Err(FetchError::Constraint(format!(
                "{} already links {} to {}",
                join.entity, parent, child
            )));
        }
        links.push(link);

        debug!(edge = %edge.key(), parent = %parent, child = %child, "rows linked");

        Ok(parent_row)
    }

    async fn unlink(
        &self,
        edge: &RelationEdge,
        parent: &ScalarValue,
        child: &ScalarValue,
    ) -> Result<(), FetchError> {
        let join = edge.join.through.as_ref().ok_or_else(|| {
            FetchError::Internal(format!("edge \"{}\" has no join table", edge.key()))
        })?;

        let mut links = self.state.tables.entry(join.entity.clone()).or_default();
        let before = links.len();
        links.retain(|row| {
            row.get(&join.parent_column) != Some(parent)
                || row.get(&join.child_column) != Some(child)
        });

        if links.len() == before {
            return Err(FetchError::Constraint(format!(
                "{} does not link {} to {}",
                join.entity, parent, child
            )));
        }

        debug!(edge = %edge.key(), parent = %parent, child = %child, "rows unlinked");

        Ok(())
    }
}

fn apply_values(
    entity: &EntityType,
    row: &mut Row,
    values: &[(String, ScalarValue)],
) -> Result<(), FetchError> {
    for (column, value) in values {
        if entity.field(column).is_none() {
            return Err(FetchError::Internal(format!(
                "type \"{}\" has no column \"{}\"",
                entity.name, column
            )));
        }
        row.insert(column.clone(), value.clone());
    }
    Ok(())
}

fn missing_record(entity: &str, id: &ScalarValue) -> FetchError {
    FetchError::Constraint(format!("No {} found for id {}", entity, id))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use relgraph_query_planner::{
        ast::{selection::Filter, value::ScalarValue},
        schema::social::social_schema,
    };
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    use super::{FetchRecord, InMemoryStore};
    use crate::store::{
        error::{FetchError, FixtureError},
        BackingStore, EntityKey, KeyedFetchRequest, MutationStore, RootFetchRequest,
    };

    fn store() -> InMemoryStore {
        let registry = Arc::new(social_schema().expect("social schema should be consistent"));
        InMemoryStore::from_fixture(
            registry,
            &json!({
                "User": [
                    { "id": "U1", "name": "Ann", "balance": 10 },
                    { "id": "U2", "name": "Bob", "balance": 2.5 },
                    { "id": "U3", "name": "Cid", "balance": 0 }
                ],
                "Post": [
                    { "id": "P1", "title": "First", "authorId": "U1" },
                    { "id": "P2", "title": "Second", "authorId": "U2" },
                    { "id": "P3", "title": "Third", "authorId": "U1" }
                ],
                "SubscribersOnAuthors": [
                    { "id": "S1", "subscriberId": "U1", "authorId": "U2" },
                    { "id": "S2", "subscriberId": "U1", "authorId": "U3" },
                    { "id": "S3", "subscriberId": "U3", "authorId": "U2" }
                ]
            }),
        )
        .expect("fixture should load")
    }

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[tokio::test]
    async fn groups_referencing_rows_by_parent_key() {
        let store = store();
        let registry = social_schema().unwrap();
        let edge = registry.edge("User", "posts").unwrap();
        let keys = vec![EntityKey::from("U2"), EntityKey::from("U1"), "U9".into()];
        let fields = fields(&["id", "title"]);
        let token = CancellationToken::new();

        let groups = store
            .fetch_by_keys(KeyedFetchRequest {
                edge,
                keys: &keys,
                filter: None,
                fields: &fields,
                cancellation: &token,
            })
            .await
            .unwrap();

        assert_eq!(groups.len(), 2);
        let titles: Vec<_> = groups[&EntityKey::from("U1")]
            .iter()
            .map(|row| row["title"].clone())
            .collect();
        let expected: Vec<ScalarValue> = vec!["First".into(), "Third".into()];
        assert_eq!(titles, expected);
        assert!(!groups.contains_key(&EntityKey::from("U9")));
        assert_eq!(
            store.fetch_log(),
            vec![FetchRecord::Keyed {
                edge: "User.posts".to_string(),
                keys,
                filter: None,
            }]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_updates_of_different_columns_all_land() {
        let store = store();

        let updates: Vec<_> = (0..64)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    let column = if i % 2 == 0 { "title" } else { "content" };
                    let value = ScalarValue::from(format!("{column} {i}").as_str());
                    store
                        .update("Post", &"P1".into(), &[(column.to_string(), value)])
                        .await
                })
            })
            .collect();
        for update in updates {
            update.await.unwrap().unwrap();
        }

        let rows = store.rows("Post");
        let post = rows
            .iter()
            .find(|row| row["id"] == ScalarValue::from("P1"))
            .unwrap();
        assert!(matches!(&post["title"], ScalarValue::String(title) if title.starts_with("title ")));
        assert!(
            matches!(&post["content"], ScalarValue::String(content) if content.starts_with("content "))
        );
        assert_eq!(post["authorId"], ScalarValue::from("U1"));
    }

    #[tokio::test]
    async fn fetch_log_keeps_only_the_latest_records() {
        let store = store();
        store.set_fetch_log_capacity(2);
        let fields = fields(&["id"]);
        let token = CancellationToken::new();

        for entity in ["User", "Post", "Profile"] {
            store
                .fetch_root(RootFetchRequest {
                    entity,
                    filter: None,
                    fields: &fields,
                    cancellation: &token,
                })
                .await
                .unwrap();
        }

        let targets: Vec<_> = store
            .fetch_log()
            .iter()
            .map(|record| record.target().to_string())
            .collect();
        assert_eq!(targets, ["Post", "Profile"]);
        assert_eq!(store.fetch_count(), 3);

        store.clear_fetch_log();
        assert_eq!(store.fetch_count(), 0);
        assert!(store.fetch_log().is_empty());
    }

    #[tokio::test]
    async fn resolves_edges_through_the_join_table() {
        let store = store();
        let registry = social_schema().unwrap();
        let token = CancellationToken::new();
        let fields = fields(&["id", "name"]);

        let subscribed_to = registry.edge("User", "userSubscribedTo").unwrap();
        let keys = vec![EntityKey::from("U1"), EntityKey::from("U3")];
        let groups = store
            .fetch_by_keys(KeyedFetchRequest {
                edge: subscribed_to,
                keys: &keys,
                filter: None,
                fields: &fields,
                cancellation: &token,
            })
            .await
            .unwrap();

        let names = |key: &str| -> Vec<ScalarValue> {
            groups[&EntityKey::from(key)]
                .iter()
                .map(|row| row["name"].clone())
                .collect()
        };
        assert_eq!(names("U1"), vec!["Bob".into(), "Cid".into()]);
        assert_eq!(names("U3"), vec!["Bob".into()]);

        let subscribers = registry.edge("User", "subscribedToUser").unwrap();
        let keys = vec![EntityKey::from("U2")];
        let groups = store
            .fetch_by_keys(KeyedFetchRequest {
                edge: subscribers,
                keys: &keys,
                filter: None,
                fields: &fields,
                cancellation: &token,
            })
            .await
            .unwrap();
        assert_eq!(groups[&EntityKey::from("U2")].len(), 2);
    }

    #[tokio::test]
    async fn root_fetch_filters_and_projects() {
        let store = store();
        let token = CancellationToken::new();
        let filter = Filter::eq("id", "U2".into());
        let fields = fields(&["id", "balance"]);

        let rows = store
            .fetch_root(RootFetchRequest {
                entity: "User",
                filter: Some(&filter),
                fields: &fields,
                cancellation: &token,
            })
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].keys().collect::<Vec<_>>(), vec!["id", "balance"]);
        assert_eq!(rows[0]["balance"], ScalarValue::Float(2.5));
    }

    #[tokio::test]
    async fn injected_failures_and_cancellation() {
        let store = store();
        let token = CancellationToken::new();
        let fields = fields(&["id"]);
        store.fail("User", FetchError::Connection("refused".to_string()));

        let request = || RootFetchRequest {
            entity: "User",
            filter: None,
            fields: &fields,
            cancellation: &token,
        };
        assert_eq!(
            store.fetch_root(request()).await,
            Err(FetchError::Connection("refused".to_string()))
        );

        store.clear_failures();
        token.cancel();
        assert_eq!(store.fetch_root(request()).await, Err(FetchError::Cancelled));
    }

    #[tokio::test]
    async fn mutations_enforce_references() {
        let store = store();
        let registry = social_schema().unwrap();

        let post = store
            .insert(
                "Post",
                &[
                    ("title".to_string(), "New".into()),
                    ("authorId".to_string(), "U3".into()),
                ],
            )
            .await
            .unwrap();
        assert!(post["id"].as_str().is_some_and(|id| !id.is_empty()));
        assert_eq!(store.rows("Post").len(), 4);

        let err = store
            .update("Post", &post["id"], &[("authorId".to_string(), "U9".into())])
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Constraint(_)));

        assert!(store.delete("Post", &"P9".into()).await.is_err());
        store.delete("Post", &post["id"]).await.unwrap();
        assert_eq!(store.rows("Post").len(), 3);

        let edge = registry.edge("User", "userSubscribedTo").unwrap();
        let subscriber = store.link(edge, &"U2".into(), &"U3".into()).await.unwrap();
        assert_eq!(subscriber["name"], ScalarValue::from("Bob"));
        assert!(store.link(edge, &"U2".into(), &"U3".into()).await.is_err());
        store.unlink(edge, &"U2".into(), &"U3".into()).await.unwrap();
        assert!(store.unlink(edge, &"U2".into(), &"U3".into()).await.is_err());
    }

    #[test]
    fn rejects_malformed_fixtures() {
        let registry = Arc::new(social_schema().unwrap());

        let err = InMemoryStore::from_fixture(registry.clone(), &json!({ "Comment": [] }))
            .err()
            .unwrap();
        assert_eq!(err, FixtureError::UnknownType("Comment".to_string()));

        let err = InMemoryStore::from_fixture(
            registry.clone(),
            &json!({ "User": [{ "id": "U1", "nickname": "x" }] }),
        )
        .err()
        .unwrap();
        assert!(matches!(err, FixtureError::UnknownColumn { .. }));

        let err =
            InMemoryStore::from_fixture(registry, &json!({ "Profile": [{ "isMale": "yes" }] }))
                .err()
                .unwrap();
        assert_eq!(err.to_string(), "Invalid value for \"Profile.isMale\" in row 0");
    }
}
