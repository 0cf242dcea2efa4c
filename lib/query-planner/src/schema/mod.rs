pub mod error;
pub mod social;

use std::{
    fmt::{Display, Formatter as FmtFormatter, Result as FmtResult},
    sync::Arc,
};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use error::SchemaError;

use crate::ast::selection::OperationKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarKind {
    String,
    Int,
    Float,
    Boolean,
    Id,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScalarField {
    pub name: String,
    pub kind: ScalarKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Cardinality {
    One,
    Many,
}

/// Which side of the relation stores the foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EdgeDirection {
    /// The source row holds the foreign key (`Profile.memberTypeId -> MemberType.id`).
    Owning,
    /// The target rows hold the foreign key (`User.id <- Post.authorId`).
    Referencing,
}

/// An explicit join entity standing between both sides of a many-to-many relation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct JoinTable {
    pub entity: String,
    /// Column of the join entity matched against the parent key.
    pub parent_column: String,
    /// Column of the join entity matched against `JoinKey::child_field` of the target.
    pub child_column: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct JoinKey {
    /// Field of the parent row whose value is the parent key of a batch.
    pub parent_field: String,
    /// Field of the child row matched against the parent key (or the join table's child column).
    pub child_field: String,
    pub through: Option<JoinTable>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelationEdge {
    pub name: String,
    pub source: String,
    pub target: String,
    pub cardinality: Cardinality,
    pub direction: EdgeDirection,
    pub join: JoinKey,
}

impl RelationEdge {
    /// Edge whose target rows point back at the parent through `child_field`.
    pub fn referencing(
        name: &str,
        target: &str,
        cardinality: Cardinality,
        parent_field: &str,
        child_field: &str,
    ) -> Self {
        RelationEdge {
            name: name.to_string(),
            source: String::new(),
            target: target.to_string(),
            cardinality,
            direction: EdgeDirection::Referencing,
            join: JoinKey {
                parent_field: parent_field.to_string(),
                child_field: child_field.to_string(),
                through: None,
            },
        }
    }

    /// Edge resolved from a foreign key stored on the parent row.
    pub fn owning(name: &str, target: &str, parent_field: &str, child_field: &str) -> Self {
        RelationEdge {
            name: name.to_string(),
            source: String::new(),
            target: target.to_string(),
            cardinality: Cardinality::One,
            direction: EdgeDirection::Owning,
            join: JoinKey {
                parent_field: parent_field.to_string(),
                child_field: child_field.to_string(),
                through: None,
            },
        }
    }

    pub fn through(
        name: &str,
        target: &str,
        parent_field: &str,
        child_field: &str,
        join_table: JoinTable,
    ) -> Self {
        RelationEdge {
            name: name.to_string(),
            source: String::new(),
            target: target.to_string(),
            cardinality: Cardinality::Many,
            direction: EdgeDirection::Referencing,
            join: JoinKey {
                parent_field: parent_field.to_string(),
                child_field: child_field.to_string(),
                through: Some(join_table),
            },
        }
    }

    /// Stable identity of the edge, `Source.edge`.
    pub fn key(&self) -> String {
        format!("{}.{}", self.source, self.name)
    }
}

impl Display for RelationEdge {
    fn fmt(&self, f: &mut FmtFormatter<'_>) -> FmtResult {
        write!(f, "{}.{} -> {}", self.source, self.name, self.target)?;
        if let Some(through) = &self.join.through {
            write!(f, " via {}", through.entity)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EntityType {
    pub name: String,
    pub primary_key: String,
    pub fields: Vec<ScalarField>,
    pub edges: Vec<Arc<RelationEdge>>,
}

impl EntityType {
    pub fn new(name: &str) -> Self {
        EntityType {
            name: name.to_string(),
            primary_key: "id".to_string(),
            fields: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn with_primary_key(mut self, field: &str) -> Self {
        self.primary_key = field.to_string();
        self
    }

    pub fn with_field(mut self, name: &str, kind: ScalarKind) -> Self {
        self.fields.push(ScalarField {
            name: name.to_string(),
            kind,
        });
        self
    }

    pub fn with_edge(mut self, mut edge: RelationEdge) -> Self {
        edge.source = self.name.clone();
        self.edges.push(Arc::new(edge));
        self
    }

    pub fn field(&self, name: &str) -> Option<&ScalarField> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn edge(&self, name: &str) -> Option<&Arc<RelationEdge>> {
        self.edges.iter().find(|edge| edge.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RootFieldKind {
    /// `user(id: ...)`
    FindOne,
    /// `users`
    FindMany,
    /// `createUser(dto: ...)`
    Create,
    /// `changeUser(id: ..., dto: ...)`
    Update,
    /// `deleteUser(id: ...)`, resolves to the deleted id.
    Delete,
    /// Inserts a row into the join table of `edge`; resolves to the parent entity.
    Link {
        edge: String,
        parent_argument: String,
        child_argument: String,
    },
    /// Removes the join rows of `edge`; resolves to the parent id.
    Unlink {
        edge: String,
        parent_argument: String,
        child_argument: String,
    },
}

impl RootFieldKind {
    pub fn returns_entity(&self) -> bool {
        !matches!(self, RootFieldKind::Delete | RootFieldKind::Unlink { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RootField {
    pub name: String,
    pub entity: String,
    pub operation: OperationKind,
    pub kind: RootFieldKind,
}

impl RootField {
    pub fn query(name: &str, entity: &str, kind: RootFieldKind) -> Self {
        RootField {
            name: name.to_string(),
            entity: entity.to_string(),
            operation: OperationKind::Query,
            kind,
        }
    }

    pub fn mutation(name: &str, entity: &str, kind: RootFieldKind) -> Self {
        RootField {
            name: name.to_string(),
            entity: entity.to_string(),
            operation: OperationKind::Mutation,
            kind,
        }
    }

    pub fn cardinality(&self) -> Cardinality {
        match self.kind {
            RootFieldKind::FindMany => Cardinality::Many,
            _ => Cardinality::One,
        }
    }
}

/// Collects entity types and root fields while the process starts up.
/// Nothing can be looked up until [`SchemaRegistryBuilder::build`] closes the registration phase.
#[derive(Debug, Default)]
pub struct SchemaRegistryBuilder {
    types: IndexMap<String, EntityType>,
    root_fields: IndexMap<(OperationKind, String), RootField>,
}

impl SchemaRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, entity_type: EntityType) -> Result<&mut Self, SchemaError> {
        if self.types.contains_key(&entity_type.name) {
            return Err(SchemaError::DuplicateType(entity_type.name));
        }

        if entity_type.field(&entity_type.primary_key).is_none() {
            return Err(SchemaError::SchemaConsistency(format!(
                "primary key \"{}\" of type \"{}\" is not one of its fields",
                entity_type.primary_key, entity_type.name
            )));
        }

        self.types.insert(entity_type.name.clone(), entity_type);
        Ok(self)
    }

    pub fn root_field(&mut self, root_field: RootField) -> Result<&mut Self, SchemaError> {
        let key = (root_field.operation, root_field.name.clone());
        if self.root_fields.contains_key(&key) {
            return Err(SchemaError::DuplicateRootField(root_field.name));
        }
        self.root_fields.insert(key, root_field);
        Ok(self)
    }

    pub fn build(self) -> Result<SchemaRegistry, SchemaError> {
        for entity_type in self.types.values() {
            for edge in &entity_type.edges {
                self.validate_edge(entity_type, edge)?;
            }
        }

        for root_field in self.root_fields.values() {
            let entity_type = self.types.get(&root_field.entity).ok_or_else(|| {
                SchemaError::SchemaConsistency(format!(
                    "root field \"{}\" returns unregistered type \"{}\"",
                    root_field.name, root_field.entity
                ))
            })?;

            if let RootFieldKind::Link { edge, .. } | RootFieldKind::Unlink { edge, .. } =
                &root_field.kind
            {
                let has_join_table = entity_type
                    .edge(edge)
                    .is_some_and(|edge| edge.join.through.is_some());
                if !has_join_table {
                    return Err(SchemaError::SchemaConsistency(format!(
                        "root field \"{}\" links through \"{}.{}\", which is not a join-table edge",
                        root_field.name, root_field.entity, edge
                    )));
                }
            }
        }

        debug!(
            types = self.types.len(),
            root_fields = self.root_fields.len(),
            "schema registry built"
        );

        Ok(SchemaRegistry {
            types: self
                .types
                .into_iter()
                .map(|(name, entity_type)| (name, Arc::new(entity_type)))
                .collect(),
            root_fields: self.root_fields,
        })
    }

    fn validate_edge(&self, source: &EntityType, edge: &RelationEdge) -> Result<(), SchemaError> {
        let target = self.types.get(&edge.target).ok_or_else(|| {
            SchemaError::SchemaConsistency(format!(
                "edge \"{}\" targets unregistered type \"{}\"",
                edge.key(),
                edge.target
            ))
        })?;

        let missing_field = |type_name: &str, field: &str| {
            SchemaError::SchemaConsistency(format!(
                "edge \"{}\" joins on \"{}.{}\", which does not exist",
                edge.key(),
                type_name,
                field
            ))
        };

        if source.field(&edge.join.parent_field).is_none() {
            return Err(missing_field(&source.name, &edge.join.parent_field));
        }
        if target.field(&edge.join.child_field).is_none() {
            return Err(missing_field(&target.name, &edge.join.child_field));
        }

        if let Some(through) = &edge.join.through {
            let join_entity = self.types.get(&through.entity).ok_or_else(|| {
                SchemaError::SchemaConsistency(format!(
                    "edge \"{}\" goes through unregistered type \"{}\"",
                    edge.key(),
                    through.entity
                ))
            })?;
            for column in [&through.parent_column, &through.child_column] {
                if join_entity.field(column).is_none() {
                    return Err(missing_field(&join_entity.name, column));
                }
            }
        }

        Ok(())
    }
}

/// Static description of the data graph. Immutable once built, shared between requests.
#[derive(Debug)]
pub struct SchemaRegistry {
    types: IndexMap<String, Arc<EntityType>>,
    root_fields: IndexMap<(OperationKind, String), RootField>,
}

impl SchemaRegistry {
    pub fn builder() -> SchemaRegistryBuilder {
        SchemaRegistryBuilder::new()
    }

    pub fn entity_type(&self, name: &str) -> Result<&Arc<EntityType>, SchemaError> {
        self.types
            .get(name)
            .ok_or_else(|| SchemaError::UnknownType(name.to_string()))
    }

    pub fn edge(&self, source: &str, edge_name: &str) -> Result<&Arc<RelationEdge>, SchemaError> {
        self.entity_type(source)?
            .edge(edge_name)
            .ok_or_else(|| SchemaError::UnknownEdge {
                type_name: source.to_string(),
                edge: edge_name.to_string(),
            })
    }

    pub fn root_field(&self, operation: OperationKind, name: &str) -> Result<&RootField, SchemaError> {
        self.root_fields
            .get(&(operation, name.to_string()))
            .ok_or_else(|| SchemaError::UnknownRootField {
                operation,
                field: name.to_string(),
            })
    }

    pub fn types(&self) -> impl Iterator<Item = &Arc<EntityType>> {
        self.types.values()
    }

    pub fn root_fields(&self) -> impl Iterator<Item = &RootField> {
        self.root_fields.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn author() -> EntityType {
        EntityType::new("Author")
            .with_field("id", ScalarKind::Id)
            .with_field("name", ScalarKind::String)
            .with_edge(RelationEdge::referencing(
                "books",
                "Book",
                Cardinality::Many,
                "id",
                "authorId",
            ))
    }

    fn book() -> EntityType {
        EntityType::new("Book")
            .with_field("id", ScalarKind::Id)
            .with_field("authorId", ScalarKind::Id)
    }

    #[test]
    fn rejects_duplicate_type_names() {
        let mut builder = SchemaRegistry::builder();
        builder.register(book()).unwrap();
        let err = builder.register(book()).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateType(name) if name == "Book"));
    }

    #[test]
    fn rejects_edges_to_unregistered_targets() {
        let mut builder = SchemaRegistry::builder();
        builder.register(author()).unwrap();
        let err = builder.build().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Schema consistency error: edge \"Author.books\" targets unregistered type \"Book\""
        );
    }

    #[test]
    fn rejects_join_fields_missing_on_the_target() {
        let mut builder = SchemaRegistry::builder();
        builder
            .register(author())
            .unwrap()
            .register(EntityType::new("Book").with_field("id", ScalarKind::Id))
            .unwrap();
        let err = builder.build().unwrap_err();
        assert!(matches!(err, SchemaError::SchemaConsistency(_)));
    }

    #[test]
    fn registration_order_does_not_matter_for_edges() {
        let mut builder = SchemaRegistry::builder();
        builder.register(author()).unwrap().register(book()).unwrap();
        let registry = builder.build().unwrap();

        let edge = registry.edge("Author", "books").unwrap();
        assert_eq!(edge.key(), "Author.books");
        assert_eq!(edge.target, "Book");
        assert_eq!(edge.cardinality, Cardinality::Many);
    }

    #[test]
    fn lookups_fail_for_unknown_names() {
        let mut builder = SchemaRegistry::builder();
        builder.register(book()).unwrap();
        let registry = builder.build().unwrap();

        assert!(matches!(
            registry.entity_type("Author"),
            Err(SchemaError::UnknownType(_))
        ));
        assert!(matches!(
            registry.edge("Book", "author"),
            Err(SchemaError::UnknownEdge { .. })
        ));
        assert!(matches!(
            registry.root_field(OperationKind::Query, "books"),
            Err(SchemaError::UnknownRootField { .. })
        ));
    }
}
