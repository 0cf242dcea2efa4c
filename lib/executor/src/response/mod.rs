pub mod graphql_error;
pub mod response;
pub mod value;
