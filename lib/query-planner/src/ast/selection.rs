use std::fmt::{Display, Formatter as FmtFormatter, Result as FmtResult};

use serde::Serialize;

use crate::{
    ast::value::ScalarValue,
    schema::Cardinality,
    utils::pretty_display::{get_indent, PrettyDisplay},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OperationKind {
    Query,
    Mutation,
}

impl OperationKind {
    /// Name of the root type, answered to `__typename` at the top level.
    pub fn root_type_name(&self) -> &'static str {
        match self {
            OperationKind::Query => "Query",
            OperationKind::Mutation => "Mutation",
        }
    }
}

impl Display for OperationKind {
    fn fmt(&self, f: &mut FmtFormatter<'_>) -> FmtResult {
        match self {
            OperationKind::Query => write!(f, "query"),
            OperationKind::Mutation => write!(f, "mutation"),
        }
    }
}

/// Equality on a single field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Filter {
    pub field: String,
    pub value: ScalarValue,
}

impl Filter {
    pub fn eq(field: &str, value: ScalarValue) -> Self {
        Filter {
            field: field.to_string(),
            value,
        }
    }

    pub fn matches(&self, value: Option<&ScalarValue>) -> bool {
        value == Some(&self.value)
    }
}

impl Display for Filter {
    fn fmt(&self, f: &mut FmtFormatter<'_>) -> FmtResult {
        write!(f, "{}: {}", self.field, self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScalarSelection {
    pub response_key: String,
    pub field: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Selection {
    Scalar(ScalarSelection),
    /// `__typename`, answered with the entity name.
    Typename(String),
    Relation(SelectionNode),
}

impl Selection {
    pub fn response_key(&self) -> &str {
        match self {
            Selection::Scalar(scalar) => &scalar.response_key,
            Selection::Typename(response_key) => response_key,
            Selection::Relation(node) => &node.response_key,
        }
    }
}

/// One node of the requested query shape.
///
/// Root nodes name a root field in `field`; every other node names the edge it traverses.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionNode {
    pub response_key: String,
    pub field: String,
    pub entity_type: String,
    pub cardinality: Cardinality,
    pub filter: Option<Filter>,
    pub selections: Vec<Selection>,
}

impl SelectionNode {
    pub fn new(field: &str, entity_type: &str, cardinality: Cardinality) -> Self {
        SelectionNode {
            response_key: field.to_string(),
            field: field.to_string(),
            entity_type: entity_type.to_string(),
            cardinality,
            filter: None,
            selections: Vec::new(),
        }
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.response_key = alias.to_string();
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_scalar(mut self, field: &str) -> Self {
        self.selections.push(Selection::Scalar(ScalarSelection {
            response_key: field.to_string(),
            field: field.to_string(),
        }));
        self
    }

    pub fn with_child(mut self, child: SelectionNode) -> Self {
        self.selections.push(Selection::Relation(child));
        self
    }

    pub fn scalar_fields(&self) -> impl Iterator<Item = &str> {
        self.selections.iter().filter_map(|selection| match selection {
            Selection::Scalar(scalar) => Some(scalar.field.as_str()),
            _ => None,
        })
    }

    pub fn children(&self) -> impl Iterator<Item = &SelectionNode> {
        self.selections.iter().filter_map(|selection| match selection {
            Selection::Relation(node) => Some(node),
            _ => None,
        })
    }

    /// Number of nodes on the longest path from this node down to a leaf, this node included.
    pub fn depth(&self) -> usize {
        1 + self.children().map(SelectionNode::depth).max().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MutationAction {
    Create {
        values: Vec<(String, ScalarValue)>,
    },
    Update {
        id: ScalarValue,
        values: Vec<(String, ScalarValue)>,
    },
    Delete {
        id: ScalarValue,
    },
    Link {
        edge: String,
        parent: ScalarValue,
        child: ScalarValue,
    },
    Unlink {
        edge: String,
        parent: ScalarValue,
        child: ScalarValue,
    },
}

impl MutationAction {
    pub fn returns_entity(&self) -> bool {
        !matches!(
            self,
            MutationAction::Delete { .. } | MutationAction::Unlink { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RootAction {
    Read,
    Mutate(MutationAction),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RootSelection {
    pub node: SelectionNode,
    pub action: RootAction,
}

impl RootSelection {
    pub fn read(node: SelectionNode) -> Self {
        RootSelection {
            node,
            action: RootAction::Read,
        }
    }

    pub fn mutate(node: SelectionNode, action: MutationAction) -> Self {
        RootSelection {
            node,
            action: RootAction::Mutate(action),
        }
    }
}

/// `__typename` selected next to the root fields. Nothing is fetched for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RootTypename {
    pub response_key: String,
    /// Index among the top-level response fields.
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Operation {
    pub kind: OperationKind,
    pub name: Option<String>,
    pub roots: Vec<RootSelection>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub root_typenames: Vec<RootTypename>,
}

impl Operation {
    pub fn query(roots: Vec<SelectionNode>) -> Self {
        Operation {
            kind: OperationKind::Query,
            name: None,
            roots: roots.into_iter().map(RootSelection::read).collect(),
            root_typenames: Vec::new(),
        }
    }

    pub fn depth(&self) -> usize {
        self.roots
            .iter()
            .map(|root| root.node.depth())
            .max()
            .unwrap_or(0)
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut FmtFormatter<'_>) -> FmtResult {
        self.pretty_fmt(f, 0)
    }
}

impl PrettyDisplay for Operation {
    fn pretty_fmt(&self, f: &mut FmtFormatter<'_>, depth: usize) -> FmtResult {
        let indent = get_indent(depth);
        match &self.name {
            Some(name) => writeln!(f, "{indent}{} {} {{", self.kind, name)?,
            None => writeln!(f, "{indent}{} {{", self.kind)?,
        }
        let mut roots = self.roots.iter();
        for position in 0..self.roots.len() + self.root_typenames.len() {
            match self
                .root_typenames
                .iter()
                .find(|typename| typename.position == position)
            {
                Some(typename) if typename.response_key != "__typename" => writeln!(
                    f,
                    "{}{}: __typename",
                    get_indent(depth + 1),
                    typename.response_key
                )?,
                Some(_) => writeln!(f, "{}__typename", get_indent(depth + 1))?,
                None => {
                    if let Some(root) = roots.next() {
                        root.node.pretty_fmt(f, depth + 1)?;
                    }
                }
            }
        }
        writeln!(f, "{indent}}}")
    }
}

impl PrettyDisplay for SelectionNode {
    fn pretty_fmt(&self, f: &mut FmtFormatter<'_>, depth: usize) -> FmtResult {
        let indent = get_indent(depth);
        write!(f, "{indent}")?;
        if self.response_key != self.field {
            write!(f, "{}: ", self.response_key)?;
        }
        write!(f, "{}", self.field)?;
        if let Some(filter) = &self.filter {
            write!(f, "({})", filter)?;
        }
        if self.selections.is_empty() {
            return writeln!(f);
        }
        writeln!(f, " {{")?;
        for selection in &self.selections {
            match selection {
                Selection::Scalar(scalar) if scalar.response_key != scalar.field => writeln!(
                    f,
                    "{}{}: {}",
                    get_indent(depth + 1),
                    scalar.response_key,
                    scalar.field
                )?,
                Selection::Scalar(scalar) => {
                    writeln!(f, "{}{}", get_indent(depth + 1), scalar.field)?
                }
                Selection::Typename(key) if key != "__typename" => {
                    writeln!(f, "{}{}: __typename", get_indent(depth + 1), key)?
                }
                Selection::Typename(_) => writeln!(f, "{}__typename", get_indent(depth + 1))?,
                Selection::Relation(node) => node.pretty_fmt(f, depth + 1)?,
            }
        }
        writeln!(f, "{indent}}}")
    }
}
