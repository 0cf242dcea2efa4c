use std::time::Duration;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("Backing store did not answer within {0:?}")]
    Timeout(Duration),
    #[error("Connection to the backing store failed: {0}")]
    Connection(String),
    #[error("Constraint violation: {0}")]
    Constraint(String),
    #[error("Fetch was cancelled")]
    Cancelled,
    #[error("Backing store failed: {0}")]
    Internal(String),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FixtureError {
    #[error("Fixture must be a JSON object of tables")]
    NotAnObject,
    #[error("Table \"{0}\" must be a list of rows")]
    NotATable(String),
    #[error("Row {index} of table \"{table}\" is not an object")]
    NotARow { table: String, index: usize },
    #[error("Unknown type \"{0}\" in fixture")]
    UnknownType(String),
    #[error("Unknown column \"{column}\" in table \"{table}\"")]
    UnknownColumn { table: String, column: String },
    #[error("Invalid value for \"{table}.{column}\" in row {index}")]
    InvalidValue {
        table: String,
        column: String,
        index: usize,
    },
}
