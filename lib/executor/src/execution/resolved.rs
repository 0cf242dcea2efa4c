use std::sync::Arc;

use relgraph_query_planner::{ast::value::ScalarValue, planner::plan_nodes::NodeId};

use crate::{
    execution::error::{AssemblyAnomaly, FetchBatchError},
    store::{EntityKey, GroupedRows, Row},
};

/// What the resolver produced for one plan node.
#[derive(Debug, Clone, Default)]
pub enum NodeData {
    /// Not fetched because an ancestor failed.
    #[default]
    Skipped,
    /// Root rows, and entity-returning mutations.
    Rows(Vec<Row>),
    /// Mutations that resolve to an id.
    Id(ScalarValue),
    /// Rows of an edge, grouped by parent key. `groups` has an entry for every requested key
    /// and is shared by all the nodes of one plan entry; `keys` lists the node's own parent keys.
    Keyed {
        groups: Arc<GroupedRows>,
        keys: Vec<EntityKey>,
    },
    Failed(Arc<FetchBatchError>),
}

impl NodeData {
    /// Rows of the node, in parent order.
    pub fn rows(&self) -> Vec<&Row> {
        match self {
            NodeData::Rows(rows) => rows.iter().collect(),
            NodeData::Keyed { groups, keys } => keys
                .iter()
                .filter_map(|key| groups.get(key))
                .flatten()
                .collect(),
            NodeData::Skipped | NodeData::Id(_) | NodeData::Failed(_) => Vec::new(),
        }
    }
}

/// The resolver's output: one [`NodeData`] per plan node, indexed by [`NodeId`].
#[derive(Debug, Default)]
pub struct ResolvedPlan {
    pub nodes: Vec<NodeData>,
    pub anomalies: Vec<AssemblyAnomaly>,
    /// Round trips issued to the backing store, mutations included.
    pub fetches: usize,
}

impl ResolvedPlan {
    pub fn node(&self, id: NodeId) -> &NodeData {
        &self.nodes[id]
    }
}
