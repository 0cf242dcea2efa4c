pub mod ast;
pub mod planner;
pub mod schema;
pub mod utils;

#[cfg(test)]
mod tests;
