use std::{future::Future, num::NonZeroUsize, sync::Arc, time::Duration};

use futures::{future::BoxFuture, stream::FuturesUnordered, FutureExt, StreamExt};
use indexmap::IndexSet;
use relgraph_query_planner::{
    ast::selection::{MutationAction, OperationKind, RootAction},
    planner::plan_nodes::{ExecutionPlan, NodeId, PlanEntry, PlanLevel, PlanNode, RootFetch},
    schema::{Cardinality, SchemaRegistry},
};
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};

use crate::{
    execution::{
        error::{AssemblyAnomaly, ExecutionError, FetchBatchError},
        resolved::{NodeData, ResolvedPlan},
    },
    store::{
        project, BackingStoreType, EntityKey, FetchError, GroupedRows, KeyedFetchRequest,
        MutationStoreType, RootFetchRequest, Row,
    },
};

struct ConcurrencyScope<'exec, T> {
    jobs: FuturesUnordered<BoxFuture<'exec, T>>,
}

impl<'exec, T> ConcurrencyScope<'exec, T> {
    fn new() -> Self {
        Self {
            jobs: FuturesUnordered::new(),
        }
    }

    fn spawn(&mut self, future: BoxFuture<'exec, T>) {
        self.jobs.push(future);
    }

    async fn join_all(mut self) -> Vec<T> {
        let mut results = Vec::with_capacity(self.jobs.len());
        while let Some(result) = self.jobs.next().await {
            results.push(result);
        }
        results
    }
}

/// One plan entry of the current level, with the parent keys it must fetch.
struct PendingBatch<'p> {
    entry: &'p PlanEntry,
    /// Union of the members' keys, deduplicated in first-appearance order.
    keys: Vec<EntityKey>,
    /// Nodes of the entry whose parents resolved, with their own parent keys.
    members: Vec<(NodeId, Vec<EntityKey>)>,
}

/// Runs one [`ExecutionPlan`] against the backing store, level by level.
///
/// Batches of one level run concurrently, bounded by a per-request limit of in-flight fetches.
/// A level starts once every batch of the previous one has returned.
pub struct PlanExecutor<'a> {
    plan: &'a ExecutionPlan,
    registry: &'a SchemaRegistry,
    store: &'a BackingStoreType,
    mutations: Option<&'a MutationStoreType>,
    semaphore: Semaphore,
    cancellation: CancellationToken,
    timeout: Option<Duration>,
}

impl<'a> PlanExecutor<'a> {
    pub fn new(
        plan: &'a ExecutionPlan,
        registry: &'a SchemaRegistry,
        store: &'a BackingStoreType,
        max_in_flight_fetches: NonZeroUsize,
    ) -> Self {
        PlanExecutor {
            plan,
            registry,
            store,
            mutations: None,
            semaphore: Semaphore::new(max_in_flight_fetches.get()),
            cancellation: CancellationToken::new(),
            timeout: None,
        }
    }

    pub fn with_mutations(mut self, mutations: &'a MutationStoreType) -> Self {
        self.mutations = Some(mutations);
        self
    }

    /// Cancelling `parent` abandons the request. The store sees a child token,
    /// which is also cancelled when the request times out.
    pub fn with_cancellation(mut self, parent: &CancellationToken) -> Self {
        self.cancellation = parent.child_token();
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    #[instrument(level = "debug", skip_all, fields(kind = %self.plan.kind, batches = self.plan.batch_count()))]
    pub async fn execute(&self) -> Result<ResolvedPlan, ExecutionError> {
        if self.plan.kind == OperationKind::Mutation && self.mutations.is_none() {
            return Err(ExecutionError::MutationsUnsupported);
        }

        let mut resolved = ResolvedPlan {
            nodes: vec![NodeData::Skipped; self.plan.nodes.len()],
            ..Default::default()
        };

        let outcome = {
            let run = self.run(&mut resolved);
            tokio::select! {
                biased;
                _ = self.cancellation.cancelled() => Err(ExecutionError::Cancelled),
                outcome = with_deadline(self.timeout, run) => outcome,
            }
        };

        if let Err(err) = outcome {
            // In-flight batches were dropped with `run`, tell the store to stop as well.
            self.cancellation.cancel();
            warn!(error = %err, fetches = resolved.fetches, "execution abandoned");
            return Err(err);
        }

        debug!(
            fetches = resolved.fetches,
            anomalies = resolved.anomalies.len(),
            "execution plan resolved"
        );

        Ok(resolved)
    }

    async fn run(&self, resolved: &mut ResolvedPlan) {
        match self.plan.kind {
            OperationKind::Query => self.execute_roots(resolved).await,
            OperationKind::Mutation => self.execute_mutations(resolved).await,
        }

        for level in &self.plan.levels {
            self.execute_level(level, resolved).await;
        }
    }

    async fn execute_roots(&self, resolved: &mut ResolvedPlan) {
        let mut scope = ConcurrencyScope::new();
        for root in &self.plan.roots {
            let node = self.plan.node(root.node);
            scope.spawn(async move { (root, self.fetch_root(node).await) }.boxed());
        }
        resolved.fetches += self.plan.roots.len();

        for (root, result) in scope.join_all().await {
            resolved.nodes[root.node] = match result {
                Ok(rows) => NodeData::Rows(rows),
                Err(source) => self.root_failure(root, source),
            };
        }
    }

    /// Mutation fields run one after the other, in document order.
    async fn execute_mutations(&self, resolved: &mut ResolvedPlan) {
        for root in &self.plan.roots {
            let node = self.plan.node(root.node);
            let result = match &root.action {
                RootAction::Read => {
                    resolved.fetches += 1;
                    self.fetch_root(node).await.map(NodeData::Rows)
                }
                RootAction::Mutate(action) => {
                    self.execute_mutation(node, action, &mut resolved.fetches)
                        .await
                }
            };

            resolved.nodes[root.node] = match result {
                Ok(data) => data,
                Err(source) => self.root_failure(root, source),
            };
        }
    }

    async fn execute_mutation(
        &self,
        node: &PlanNode,
        action: &MutationAction,
        fetches: &mut usize,
    ) -> Result<NodeData, FetchError> {
        let store = self
            .mutations
            .ok_or_else(|| FetchError::Internal("no mutation store".to_string()))?;
        let entity = node.entity_type.as_str();
        *fetches += 1;

        match action {
            MutationAction::Create { values } => {
                let row = store.insert(entity, values).await?;
                Ok(NodeData::Rows(vec![project(&row, &node.fields)]))
            }
            MutationAction::Update { id, values } => {
                let row = store.update(entity, id, values).await?;
                Ok(NodeData::Rows(vec![project(&row, &node.fields)]))
            }
            MutationAction::Delete { id } => {
                store.delete(entity, id).await?;
                Ok(NodeData::Id(id.clone()))
            }
            MutationAction::Link {
                edge,
                parent,
                child,
            } => {
                let edge = self
                    .registry
                    .edge(entity, edge)
                    .map_err(|e| FetchError::Internal(e.to_string()))?;
                // The parent row comes back with the committed link.
                let row = store.link(edge, parent, child).await?;
                Ok(NodeData::Rows(vec![project(&row, &node.fields)]))
            }
            MutationAction::Unlink {
                edge,
                parent,
                child,
            } => {
                let edge = self
                    .registry
                    .edge(entity, edge)
                    .map_err(|e| FetchError::Internal(e.to_string()))?;
                store.unlink(edge, parent, child).await?;
                Ok(NodeData::Id(parent.clone()))
            }
        }
    }

    #[instrument(level = "debug", skip_all, fields(depth = level.depth, entries = level.entries.len()))]
    async fn execute_level(&self, level: &'a PlanLevel, resolved: &mut ResolvedPlan) {
        let mut batches: Vec<PendingBatch<'a>> = Vec::with_capacity(level.entries.len());

        for entry in &level.entries {
            let mut keys: IndexSet<EntityKey> = IndexSet::new();
            let mut members = Vec::with_capacity(entry.nodes.len());

            for &node_id in &entry.nodes {
                match self.parent_keys(node_id, resolved, &entry.edge.join.parent_field) {
                    Some(node_keys) => {
                        keys.extend(node_keys.iter().cloned());
                        members.push((node_id, node_keys));
                    }
                    None => resolved.nodes[node_id] = NodeData::Skipped,
                }
            }

            batches.push(PendingBatch {
                entry,
                keys: keys.into_iter().collect(),
                members,
            });
        }

        let mut results: Vec<Option<Result<GroupedRows, FetchError>>> =
            batches.iter().map(|_| None).collect();

        let mut scope = ConcurrencyScope::new();
        for (index, batch) in batches.iter().enumerate() {
            // Nothing to join against, e.g. every parent had a null foreign key.
            if batch.keys.is_empty() {
                continue;
            }
            resolved.fetches += 1;
            scope.spawn(
                async move { (index, self.fetch_batch(batch.entry, &batch.keys).await) }.boxed(),
            );
        }

        for (index, result) in scope.join_all().await {
            results[index] = Some(result);
        }

        // Distributed in plan order, whatever order the batches completed in.
        for (batch, result) in batches.into_iter().zip(results) {
            match result.unwrap_or_else(|| Ok(GroupedRows::new())) {
                Ok(fetched) => {
                    let groups = Arc::new(complete_groups(
                        batch.entry,
                        &batch.keys,
                        fetched,
                        &mut resolved.anomalies,
                    ));
                    for (node_id, keys) in batch.members {
                        resolved.nodes[node_id] = NodeData::Keyed {
                            groups: groups.clone(),
                            keys,
                        };
                    }
                }
                Err(source) => {
                    let target = batch.entry.edge.key();
                    error!(edge = %target, error = %source, "batch fetch failed");
                    let failure = Arc::new(FetchBatchError { target, source });
                    for (node_id, _) in batch.members {
                        resolved.nodes[node_id] = NodeData::Failed(failure.clone());
                    }
                }
            }
        }
    }

    /// Distinct join values of the parent's rows, in row order.
    /// `None` when the parent has nothing to offer because it failed or was skipped.
    fn parent_keys(
        &self,
        node_id: NodeId,
        resolved: &ResolvedPlan,
        parent_field: &str,
    ) -> Option<Vec<EntityKey>> {
        let parent = self.plan.node(node_id).parent?;
        let data = resolved.node(parent);
        if matches!(data, NodeData::Failed(_) | NodeData::Skipped) {
            return None;
        }

        let keys: IndexSet<EntityKey> = data
            .rows()
            .into_iter()
            .filter_map(|row| row.get(parent_field).and_then(EntityKey::from_value))
            .collect();

        Some(keys.into_iter().collect())
    }

    async fn acquire(&self) -> Result<SemaphorePermit<'_>, FetchError> {
        self.semaphore
            .acquire()
            .await
            .map_err(|_| FetchError::Cancelled)
    }

    async fn fetch_root(&self, node: &PlanNode) -> Result<Vec<Row>, FetchError> {
        let _permit = self.acquire().await?;
        debug!(field = %node.path_string(), entity = %node.entity_type, "fetching root");

        self.store
            .fetch_root(RootFetchRequest {
                entity: &node.entity_type,
                filter: node.filter.as_ref(),
                fields: &node.fields,
                cancellation: &self.cancellation,
            })
            .await
    }

    async fn fetch_batch(
        &self,
        entry: &PlanEntry,
        keys: &[EntityKey],
    ) -> Result<GroupedRows, FetchError> {
        let _permit = self.acquire().await?;
        debug!(
            edge = %entry.edge.key(),
            keys = keys.len(),
            fields = ?entry.fields,
            "fetching batch"
        );

        self.store
            .fetch_by_keys(KeyedFetchRequest {
                edge: &entry.edge,
                keys,
                filter: entry.filter.as_ref(),
                fields: &entry.fields,
                cancellation: &self.cancellation,
            })
            .await
    }

    fn root_failure(&self, root: &RootFetch, source: FetchError) -> NodeData {
        let target = match self.plan.kind {
            OperationKind::Query => format!("Query.{}", root.field),
            OperationKind::Mutation => format!("Mutation.{}", root.field),
        };
        error!(field = %target, error = %source, "root fetch failed");
        NodeData::Failed(Arc::new(FetchBatchError { target, source }))
    }
}

async fn with_deadline<F>(timeout: Option<Duration>, run: F) -> Result<(), ExecutionError>
where
    F: Future<Output = ()>,
{
    match timeout {
        Some(duration) => tokio::time::timeout(duration, run)
            .await
            .map_err(|_| ExecutionError::TimedOut(duration)),
        None => {
            run.await;
            Ok(())
        }
    }
}

/// One group per requested key, in request order. Groups under keys nobody asked for are
/// dropped, and a `One` edge keeps a single row per key.
fn complete_groups(
    entry: &PlanEntry,
    keys: &[EntityKey],
    mut fetched: GroupedRows,
    anomalies: &mut Vec<AssemblyAnomaly>,
) -> GroupedRows {
    let edge = entry.edge.key();
    let mut groups = GroupedRows::with_capacity(keys.len());

    for key in keys {
        let mut rows = fetched.swap_remove(key).unwrap_or_default();
        if entry.edge.cardinality == Cardinality::One && rows.len() > 1 {
            let anomaly = AssemblyAnomaly::ExtraRowsForOne {
                edge: edge.clone(),
                key: key.clone(),
                rows: rows.len(),
            };
            warn!(anomaly = %anomaly, "assembly anomaly");
            anomalies.push(anomaly);
            rows.truncate(1);
        }
        groups.insert(key.clone(), rows);
    }

    for (key, rows) in fetched {
        let anomaly = AssemblyAnomaly::UnrequestedKey {
            edge: edge.clone(),
            key,
            rows: rows.len(),
        };
        warn!(anomaly = %anomaly, "assembly anomaly");
        anomalies.push(anomaly);
    }

    groups
}
