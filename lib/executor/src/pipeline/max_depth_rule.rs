use std::collections::HashMap;

use graphql_parser::query::{
    Definition, FragmentDefinition, OperationDefinition, Selection, SelectionSet,
};
use relgraph_config::limits::MaxDepthRuleConfig;
use relgraph_query_planner::ast::lowering::QueryDocument;

use crate::pipeline::error::PipelineError;

type GqlSelectionSet = SelectionSet<'static, String>;
type GqlFragment = FragmentDefinition<'static, String>;

/// Rejects documents nested deeper than `config.n`, before they are lowered.
///
/// Only fields with a selection set count, and fragments are flattened into the place they are
/// spread, so the depth matches the one the planner enforces.
pub fn validate_max_depth(
    document: &QueryDocument,
    config: &MaxDepthRuleConfig,
) -> Result<(), PipelineError> {
    let depth = document_depth(document);
    if depth > config.n {
        let message = if config.expose_limits {
            format!("Query depth limit of {} exceeded, found {}.", config.n, depth)
        } else {
            "Query depth limit exceeded.".to_string()
        };
        return Err(PipelineError::MaxDepthExceeded(message));
    }

    Ok(())
}

/// Deepest nesting over every operation of the document.
pub fn document_depth(document: &QueryDocument) -> usize {
    let mut visitor = MaxDepthVisitor {
        fragments: document
            .definitions
            .iter()
            .filter_map(|definition| match definition {
                Definition::Fragment(fragment) => Some((fragment.name.as_str(), fragment)),
                _ => None,
            })
            .collect(),
        visited_fragments: HashMap::new(),
    };

    document
        .definitions
        .iter()
        .filter_map(|definition| match definition {
            Definition::Operation(operation) => Some(operation_selection_set(operation)),
            Definition::Fragment(_) => None,
        })
        .map(|selection_set| visitor.count_depth(selection_set))
        .max()
        .unwrap_or(0)
}

fn operation_selection_set<'a>(
    operation: &'a OperationDefinition<'static, String>,
) -> &'a GqlSelectionSet {
    match operation {
        OperationDefinition::SelectionSet(selection_set) => selection_set,
        OperationDefinition::Query(query) => &query.selection_set,
        OperationDefinition::Mutation(mutation) => &mutation.selection_set,
        OperationDefinition::Subscription(subscription) => &subscription.selection_set,
    }
}

struct MaxDepthVisitor<'a> {
    fragments: HashMap<&'a str, &'a GqlFragment>,
    /// `None` while a fragment is being counted, so a spread cycle counts as zero.
    visited_fragments: HashMap<&'a str, Option<usize>>,
}

impl<'a> MaxDepthVisitor<'a> {
    fn count_depth(&mut self, selection_set: &'a GqlSelectionSet) -> usize {
        let mut depth = 0;
        for item in &selection_set.items {
            let item_depth = match item {
                Selection::Field(field) if field.selection_set.items.is_empty() => 0,
                Selection::Field(field) => 1 + self.count_depth(&field.selection_set),
                Selection::InlineFragment(fragment) => self.count_depth(&fragment.selection_set),
                Selection::FragmentSpread(spread) => self.count_fragment(&spread.fragment_name),
            };
            depth = depth.max(item_depth);
        }
        depth
    }

    fn count_fragment(&mut self, name: &'a str) -> usize {
        if let Some(visited) = self.visited_fragments.get(name) {
            return visited.unwrap_or(0);
        }

        let Some(fragment) = self.fragments.get(name).copied() else {
            return 0;
        };

        self.visited_fragments.insert(name, None);
        let depth = self.count_depth(&fragment.selection_set);
        self.visited_fragments.insert(name, Some(depth));
        depth
    }
}

#[cfg(test)]
mod tests {
    use relgraph_config::limits::MaxDepthRuleConfig;
    use relgraph_query_planner::utils::parsing::parse_operation;

    use super::{document_depth, validate_max_depth};

    const QUERY: &str = r#"
        query {
          users {
            name
            posts {
              author {
                name
              }
              title
            }
          }
        }
    "#;

    #[test]
    fn works() {
        let document = parse_operation(QUERY).expect("Failed to parse query");
        let config = MaxDepthRuleConfig {
            n: 3,
            expose_limits: true,
        };

        assert_eq!(document_depth(&document), 3);
        assert!(validate_max_depth(&document, &config).is_ok());
    }

    #[test]
    fn rejects_query_exceeding_max_depth() {
        let document = parse_operation(QUERY).expect("Failed to parse query");
        let config = MaxDepthRuleConfig {
            n: 1,
            expose_limits: true,
        };

        let error = validate_max_depth(&document, &config).unwrap_err();
        assert_eq!(error.to_string(), "Query depth limit of 1 exceeded, found 3.");
        assert_eq!(error.graphql_error_code(), "DEPTH_LIMIT_EXCEEDED");
    }

    #[test]
    fn hides_limits_when_not_exposed() {
        let document = parse_operation(QUERY).expect("Failed to parse query");
        let config = MaxDepthRuleConfig {
            n: 2,
            expose_limits: false,
        };

        let error = validate_max_depth(&document, &config).unwrap_err();
        assert_eq!(error.to_string(), "Query depth limit exceeded.");
    }

    #[test]
    fn flattens_fragments_and_survives_cycles() {
        let document = parse_operation(
            r#"
            query {
              user(id: "U1") {
                ...UserPosts
                ... on User {
                  profile {
                    isMale
                  }
                }
              }
            }

            fragment UserPosts on User {
              posts {
                author {
                  ...Loop
                }
              }
            }

            fragment Loop on User {
              name
              ...Loop
            }
            "#,
        )
        .expect("Failed to parse query");

        assert_eq!(document_depth(&document), 3);
    }
}
