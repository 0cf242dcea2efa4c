pub mod error;
pub mod plan_nodes;

use std::{collections::VecDeque, sync::Arc};

use tracing::{debug, instrument};

use crate::{
    ast::selection::{Operation, SelectionNode},
    planner::{
        error::QueryPlanError,
        plan_nodes::{ExecutionPlan, NodeId, PlanEntry, PlanLevel, PlanNode, RootFetch},
    },
    schema::{EntityType, RelationEdge, SchemaError, SchemaRegistry},
};

pub const DEFAULT_MAX_DEPTH: usize = 5;

pub struct Planner {
    registry: Arc<SchemaRegistry>,
    max_depth: usize,
}

impl Planner {
    pub fn new(registry: Arc<SchemaRegistry>, max_depth: usize) -> Self {
        Planner {
            registry,
            max_depth,
        }
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Validates the operation against the registry and the depth limit, then groups its
    /// relation nodes into levels of batch fetches. Nothing is fetched here.
    #[instrument(level = "debug", skip_all, fields(kind = %operation.kind, roots = operation.roots.len()))]
    pub fn plan(&self, operation: &Operation) -> Result<ExecutionPlan, QueryPlanError> {
        if operation.roots.is_empty() && operation.root_typenames.is_empty() {
            return Err(QueryPlanError::EmptyOperation);
        }

        let depth = operation.depth();
        if depth > self.max_depth {
            return Err(QueryPlanError::DepthLimitExceeded {
                depth,
                max_depth: self.max_depth,
            });
        }

        let mut nodes: Vec<PlanNode> = Vec::new();
        let mut roots = Vec::with_capacity(operation.roots.len());
        let mut queue: VecDeque<(&SelectionNode, NodeId)> = VecDeque::new();

        for root in &operation.roots {
            let path = vec![root.node.response_key.clone()];
            let entity = self.root_entity(operation, &root.node, &path)?;
            let id = nodes.len();
            nodes.push(plan_node(id, None, path, &root.node, entity, None)?);
            roots.push(RootFetch {
                node: id,
                field: root.node.field.clone(),
                action: root.action.clone(),
            });
            queue.push_back((&root.node, id));
        }

        // Breadth-first, so node ids at the same level follow first-appearance order.
        while let Some((selection, parent_id)) = queue.pop_front() {
            for child in selection.children() {
                let mut path = nodes[parent_id].path.clone();
                path.push(child.response_key.clone());

                let edge = self.child_edge(&nodes[parent_id], child, &path)?;
                let entity = self
                    .registry
                    .entity_type(&child.entity_type)
                    .map_err(|e| QueryPlanError::consistency(&path, e))?;

                let id = nodes.len();
                let mut node = plan_node(id, Some(parent_id), path, child, entity, Some(edge))?;
                node.level = nodes[parent_id].level + 1;
                nodes.push(node);
                nodes[parent_id].children.push(id);
                queue.push_back((child, id));
            }
        }

        let levels = group_levels(&nodes);
        let plan = ExecutionPlan {
            kind: operation.kind,
            nodes,
            roots,
            levels,
        };

        debug!(
            nodes = plan.nodes.len(),
            levels = plan.levels.len() + 1,
            batches = plan.batch_count(),
            "execution plan built"
        );

        Ok(plan)
    }

    fn root_entity(
        &self,
        operation: &Operation,
        node: &SelectionNode,
        path: &[String],
    ) -> Result<&Arc<EntityType>, QueryPlanError> {
        let root_field = self
            .registry
            .root_field(operation.kind, &node.field)
            .map_err(|e| QueryPlanError::consistency(path, e))?;

        if root_field.entity != node.entity_type {
            return Err(QueryPlanError::consistency(
                path,
                SchemaError::SchemaConsistency(format!(
                    "root field \"{}\" returns \"{}\", not \"{}\"",
                    root_field.name, root_field.entity, node.entity_type
                )),
            ));
        }

        self.registry
            .entity_type(&node.entity_type)
            .map_err(|e| QueryPlanError::consistency(path, e))
    }

    fn child_edge(
        &self,
        parent: &PlanNode,
        child: &SelectionNode,
        path: &[String],
    ) -> Result<Arc<RelationEdge>, QueryPlanError> {
        let edge = self
            .registry
            .edge(&parent.entity_type, &child.field)
            .map_err(|e| QueryPlanError::consistency(path, e))?;

        if edge.target != child.entity_type {
            return Err(QueryPlanError::consistency(
                path,
                SchemaError::SchemaConsistency(format!(
                    "edge \"{}\" targets \"{}\", but the selection expects \"{}\"",
                    edge.key(),
                    edge.target,
                    child.entity_type
                )),
            ));
        }

        if edge.cardinality != child.cardinality {
            return Err(QueryPlanError::consistency(
                path,
                SchemaError::SchemaConsistency(format!(
                    "edge \"{}\" has cardinality {:?}, but the selection expects {:?}",
                    edge.key(),
                    edge.cardinality,
                    child.cardinality
                )),
            ));
        }

        Ok(edge.clone())
    }
}

fn plan_node(
    id: NodeId,
    parent: Option<NodeId>,
    path: Vec<String>,
    selection: &SelectionNode,
    entity: &EntityType,
    edge: Option<Arc<RelationEdge>>,
) -> Result<PlanNode, QueryPlanError> {
    let mut fields: Vec<String> = Vec::new();
    let mut add_field = |field: &str| {
        if !fields.iter().any(|existing| existing == field) {
            fields.push(field.to_string());
        }
    };

    add_field(&entity.primary_key);
    for field in selection.scalar_fields() {
        if entity.field(field).is_none() {
            return Err(QueryPlanError::consistency(
                &path,
                SchemaError::SchemaConsistency(format!(
                    "type \"{}\" has no field \"{}\"",
                    entity.name, field
                )),
            ));
        }
        add_field(field);
    }
    // Unknown edges are reported when the child itself is planned.
    for child in selection.children() {
        if let Some(child_edge) = entity.edge(&child.field) {
            add_field(&child_edge.join.parent_field);
        }
    }

    Ok(PlanNode {
        id,
        parent,
        children: Vec::new(),
        path,
        entity_type: entity.name.clone(),
        edge,
        cardinality: selection.cardinality,
        filter: selection.filter.clone(),
        fields,
        level: 0,
    })
}

/// Groups the non-root nodes by level, then by `(edge, filter)` in first-appearance order.
fn group_levels(nodes: &[PlanNode]) -> Vec<PlanLevel> {
    let deepest = nodes.iter().map(|node| node.level).max().unwrap_or(0);
    let mut levels = Vec::with_capacity(deepest);

    for depth in 1..=deepest {
        let mut entries: Vec<PlanEntry> = Vec::new();

        for node in nodes.iter().filter(|node| node.level == depth) {
            let Some(edge) = &node.edge else {
                continue;
            };

            let existing = entries
                .iter_mut()
                .find(|entry| Arc::ptr_eq(&entry.edge, edge) && entry.filter == node.filter);

            match existing {
                Some(entry) => {
                    entry.nodes.push(node.id);
                    for field in &node.fields {
                        if !entry.fields.contains(field) {
                            entry.fields.push(field.clone());
                        }
                    }
                }
                None => entries.push(PlanEntry {
                    edge: edge.clone(),
                    filter: node.filter.clone(),
                    fields: node.fields.clone(),
                    nodes: vec![node.id],
                }),
            }
        }

        levels.push(PlanLevel { depth, entries });
    }

    levels
}
