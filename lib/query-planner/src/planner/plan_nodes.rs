use std::{
    fmt::{Display, Formatter as FmtFormatter, Result as FmtResult},
    sync::Arc,
};

use serde::Serialize;

use crate::{
    ast::selection::{Filter, MutationAction, OperationKind, RootAction},
    schema::{Cardinality, RelationEdge},
    utils::pretty_display::{get_indent, write_field_list, PrettyDisplay},
};

pub type NodeId = usize;

/// One SelectionNode of the operation, as seen by the executor.
#[derive(Debug, Clone, Serialize)]
pub struct PlanNode {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    /// Relation children, in the order they were selected.
    pub children: Vec<NodeId>,
    /// Response keys from the root down to this node.
    pub path: Vec<String>,
    pub entity_type: String,
    /// `None` for root nodes.
    pub edge: Option<Arc<RelationEdge>>,
    pub cardinality: Cardinality,
    pub filter: Option<Filter>,
    /// Requested scalar fields plus the key fields needed by the node's children.
    pub fields: Vec<String>,
    pub level: usize,
}

impl PlanNode {
    pub fn path_string(&self) -> String {
        self.path.join(".")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RootFetch {
    pub node: NodeId,
    pub field: String,
    pub action: RootAction,
}

/// One FetchBatch to issue: every parent key produced for `nodes` at the previous level,
/// fetched through `edge` in a single round trip.
#[derive(Debug, Clone, Serialize)]
pub struct PlanEntry {
    pub edge: Arc<RelationEdge>,
    pub filter: Option<Filter>,
    pub fields: Vec<String>,
    pub nodes: Vec<NodeId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanLevel {
    pub depth: usize,
    pub entries: Vec<PlanEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionPlan {
    pub kind: OperationKind,
    pub nodes: Vec<PlanNode>,
    /// Level 0.
    pub roots: Vec<RootFetch>,
    /// Levels 1 and deeper, in dependency order.
    pub levels: Vec<PlanLevel>,
}

impl ExecutionPlan {
    pub fn node(&self, id: NodeId) -> &PlanNode {
        &self.nodes[id]
    }

    /// Upper bound of the round trips the plan can cause.
    pub fn batch_count(&self) -> usize {
        self.roots.len()
            + self
                .levels
                .iter()
                .map(|level| level.entries.len())
                .sum::<usize>()
    }
}

impl Display for ExecutionPlan {
    fn fmt(&self, f: &mut FmtFormatter<'_>) -> FmtResult {
        self.pretty_fmt(f, 0)
    }
}

impl PrettyDisplay for ExecutionPlan {
    fn pretty_fmt(&self, f: &mut FmtFormatter<'_>, depth: usize) -> FmtResult {
        let indent = get_indent(depth);
        writeln!(f, "{indent}ExecutionPlan({}) {{", self.kind)?;

        writeln!(f, "{}Level 0 {{", get_indent(depth + 1))?;
        for root in &self.roots {
            let node = self.node(root.node);
            write!(f, "{}", get_indent(depth + 2))?;
            match &root.action {
                RootAction::Read => write!(f, "Root")?,
                RootAction::Mutate(action) => write!(f, "{}", mutation_label(action))?,
            }
            write!(f, "({}: {}) ", node.path_string(), node.entity_type)?;
            write_field_list(f, &node.fields)?;
            if let Some(filter) = &node.filter {
                write!(f, " where {}", filter)?;
            }
            writeln!(f)?;
        }
        writeln!(f, "{}}}", get_indent(depth + 1))?;

        for level in &self.levels {
            level.pretty_fmt_with(f, depth + 1, self)?;
        }

        writeln!(f, "{indent}}}")
    }
}

fn mutation_label(action: &MutationAction) -> &'static str {
    match action {
        MutationAction::Create { .. } => "Create",
        MutationAction::Update { .. } => "Update",
        MutationAction::Delete { .. } => "Delete",
        MutationAction::Link { .. } => "Link",
        MutationAction::Unlink { .. } => "Unlink",
    }
}

impl PlanLevel {
    fn pretty_fmt_with(
        &self,
        f: &mut FmtFormatter<'_>,
        depth: usize,
        plan: &ExecutionPlan,
    ) -> FmtResult {
        writeln!(f, "{}Level {} {{", get_indent(depth), self.depth)?;
        for entry in &self.entries {
            write!(f, "{}Batch({}) ", get_indent(depth + 1), entry.edge)?;
            write_field_list(f, &entry.fields)?;
            if let Some(filter) = &entry.filter {
                write!(f, " where {}", filter)?;
            }
            let paths: Vec<String> = entry
                .nodes
                .iter()
                .map(|id| plan.node(*id).path_string())
                .collect();
            writeln!(f, " for {}", paths.join(", "))?;
        }
        writeln!(f, "{}}}", get_indent(depth))
    }
}
