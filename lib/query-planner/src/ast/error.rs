use crate::schema::SchemaError;

#[derive(Debug, Clone, thiserror::Error)]
pub enum LoweringError {
    #[error("Operation \"{0}\" was not found in the document")]
    SpecifiedOperationNotFound(String),
    #[error("The document does not contain any operation")]
    OperationNotFound,
    #[error("The document contains multiple operations, an operation name is required")]
    MultipleMatchingOperationsFound,
    #[error("Subscription operations are not supported")]
    UnsupportedOperation,
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("Cannot query field \"{field}\" on type \"{type_name}\"")]
    UnknownField { type_name: String, field: String },
    #[error("Field \"{field}\" of type \"{type_name}\" must have a selection of subfields")]
    MissingSelectionSet { type_name: String, field: String },
    #[error("Field \"{field}\" must not have a selection since it has no subfields")]
    UnexpectedSelectionSet { field: String },
    #[error("Field \"{field}\" argument \"{argument}\" is required")]
    MissingArgument { field: String, argument: String },
    #[error("Unknown argument \"{argument}\" on field \"{field}\"")]
    UnknownArgument { field: String, argument: String },
    #[error("Variable \"${0}\" was not provided")]
    MissingVariable(String),
    #[error("Invalid value for argument \"{argument}\": {reason}")]
    InvalidValue { argument: String, reason: String },
    #[error("Unknown fragment \"{0}\"")]
    UnknownFragment(String),
    #[error("Fragment \"{0}\" spreads itself")]
    FragmentCycle(String),
    #[error("Fields \"{0}\" conflict because they select different fields or arguments")]
    FieldConflict(String),
}
