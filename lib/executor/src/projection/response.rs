use relgraph_query_planner::{
    ast::selection::{Operation, OperationKind, Selection, SelectionNode},
    planner::plan_nodes::{ExecutionPlan, NodeId, PlanNode},
    schema::Cardinality,
};
use tracing::{instrument, trace};

use crate::{
    execution::{error::FetchBatchError, resolved::NodeData, resolved::ResolvedPlan},
    response::{graphql_error::GraphQLError, value::Value},
    store::{EntityKey, Row},
};

pub const FETCH_FAILED: &str = "FETCH_FAILED";
pub const MUTATION_FAILED: &str = "MUTATION_FAILED";

/// Folds the resolved rows back into the shape of the operation.
///
/// Every selected field gets a slot: `null` for a missing `One` relation, `[]` for an empty
/// `Many` relation, and `null` for a relation whose fetch failed. Each failed node adds one error
/// carrying its response path.
#[instrument(level = "trace", skip_all, fields(roots = operation.roots.len()))]
pub fn project_by_operation(
    operation: &Operation,
    plan: &ExecutionPlan,
    resolved: &ResolvedPlan,
) -> (Value, Vec<GraphQLError>) {
    let mut projection = Projection {
        plan,
        resolved,
        reported: vec![false; plan.nodes.len()],
        errors: Vec::new(),
    };

    let mut data = Vec::with_capacity(operation.roots.len());
    for (root, fetch) in operation.roots.iter().zip(&plan.roots) {
        let value = projection.project_root(&root.node, fetch.node);
        data.push((root.node.response_key.clone(), value));
    }
    // Positions ascend, so each one is final once inserted.
    for typename in &operation.root_typenames {
        let position = typename.position.min(data.len());
        data.insert(
            position,
            (
                typename.response_key.clone(),
                Value::String(operation.kind.root_type_name().to_string()),
            ),
        );
    }

    // Failures nothing pointed at during the walk still deserve an error.
    for (id, node) in resolved.nodes.iter().enumerate() {
        if let NodeData::Failed(failure) = node {
            projection.report(id, failure);
        }
    }

    trace!(errors = projection.errors.len(), "response projected");

    (Value::Object(data), projection.errors)
}

struct Projection<'a> {
    plan: &'a ExecutionPlan,
    resolved: &'a ResolvedPlan,
    reported: Vec<bool>,
    errors: Vec<GraphQLError>,
}

impl<'a> Projection<'a> {
    fn project_root(&mut self, selection: &SelectionNode, id: NodeId) -> Value {
        let (plan, resolved) = (self.plan, self.resolved);
        let node = plan.node(id);
        match resolved.node(id) {
            NodeData::Rows(rows) => self.project_rows(selection, node, rows),
            NodeData::Id(value) => Value::from(value),
            NodeData::Failed(failure) => {
                self.report(id, failure);
                Value::Null
            }
            NodeData::Keyed { .. } | NodeData::Skipped => Value::Null,
        }
    }

    fn project_rows(
        &mut self,
        selection: &SelectionNode,
        node: &PlanNode,
        rows: &[Row],
    ) -> Value {
        match node.cardinality {
            Cardinality::Many => Value::Array(
                rows.iter()
                    .map(|row| self.project_object(selection, node, row))
                    .collect(),
            ),
            Cardinality::One => rows
                .first()
                .map(|row| self.project_object(selection, node, row))
                .unwrap_or_default(),
        }
    }

    fn project_object(&mut self, selection: &SelectionNode, node: &PlanNode, row: &Row) -> Value {
        let mut fields = Vec::with_capacity(selection.selections.len());
        // Relation selections map onto the node's children in order.
        let mut children = node.children.iter();

        for item in &selection.selections {
            let value = match item {
                Selection::Scalar(scalar) => {
                    row.get(&scalar.field).map(Value::from).unwrap_or_default()
                }
                Selection::Typename(_) => Value::String(node.entity_type.clone()),
                Selection::Relation(child) => match children.next() {
                    Some(&child_id) => self.project_child(child, child_id, row),
                    None => Value::Null,
                },
            };
            fields.push((item.response_key().to_string(), value));
        }

        Value::Object(fields)
    }

    fn project_child(&mut self, selection: &SelectionNode, id: NodeId, parent_row: &Row) -> Value {
        let (plan, resolved) = (self.plan, self.resolved);
        let node = plan.node(id);
        match resolved.node(id) {
            NodeData::Failed(failure) => {
                self.report(id, failure);
                Value::Null
            }
            NodeData::Keyed { groups, .. } => {
                let rows = node
                    .edge
                    .as_ref()
                    .and_then(|edge| parent_row.get(&edge.join.parent_field))
                    .and_then(EntityKey::from_value)
                    .and_then(|key| groups.get(&key))
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                self.project_rows(selection, node, rows)
            }
            NodeData::Rows(_) | NodeData::Id(_) | NodeData::Skipped => {
                self.project_rows(selection, node, &[])
            }
        }
    }

    fn report(&mut self, id: NodeId, failure: &FetchBatchError) {
        if self.reported[id] {
            return;
        }
        self.reported[id] = true;

        let node = self.plan.node(id);
        let code = if node.parent.is_none() && self.plan.kind == OperationKind::Mutation {
            MUTATION_FAILED
        } else {
            FETCH_FAILED
        };

        self.errors.push(
            GraphQLError::from_message_and_code(failure.to_string(), code)
                .with_path(node.path.clone()),
        );
    }
}
