use crate::ast::selection::OperationKind;

#[derive(Debug, Clone, thiserror::Error)]
pub enum SchemaError {
    #[error("Unknown type \"{0}\"")]
    UnknownType(String),
    #[error("Unknown edge \"{edge}\" on type \"{type_name}\"")]
    UnknownEdge { type_name: String, edge: String },
    #[error("Unknown {operation} root field \"{field}\"")]
    UnknownRootField {
        operation: OperationKind,
        field: String,
    },
    #[error("Type \"{0}\" is already registered")]
    DuplicateType(String),
    #[error("Root field \"{0}\" is already registered")]
    DuplicateRootField(String),
    #[error("Schema consistency error: {0}")]
    SchemaConsistency(String),
}
