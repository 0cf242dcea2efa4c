pub mod execution;
pub mod pipeline;
pub mod projection;
pub mod response;
pub mod store;
#[cfg(test)]
mod tests;

pub use execution::plan::PlanExecutor;
pub use pipeline::{GraphQLRequest, QueryEngine};
pub use response::{graphql_error::GraphQLError, response::ExecutionResponse, value::Value};
pub use store::{memory::InMemoryStore, BackingStore, MutationStore};
