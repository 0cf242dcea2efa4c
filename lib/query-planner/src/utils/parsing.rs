use graphql_parser::query::ParseError;

use crate::ast::lowering::QueryDocument;

#[inline]
pub fn parse_operation(operation: &str) -> Result<QueryDocument, ParseError> {
    graphql_parser::parse_query::<String>(operation).map(|op| op.into_static())
}
