use std::error::Error;

use crate::{
    planner::{error::QueryPlanError, Planner, DEFAULT_MAX_DEPTH},
    tests::testkit::{build_plan, init_logger, lower, registry},
};

// users > posts > author > profile > memberType is five nodes deep.
const FIVE_LEVELS: &str = r#"
  query {
    users {
      posts {
        author {
          profile {
            memberType {
              discount
            }
          }
        }
      }
    }
  }"#;

const SIX_LEVELS: &str = r#"
  query {
    users {
      posts {
        author {
          profile {
            memberType {
              profiles {
                isMale
              }
            }
          }
        }
      }
    }
  }"#;

#[test]
fn depth_at_the_limit_is_planned() -> Result<(), Box<dyn Error>> {
    init_logger();
    let plan = build_plan(FIVE_LEVELS)?;

    assert_eq!(plan.levels.len(), DEFAULT_MAX_DEPTH - 1);
    assert_eq!(plan.batch_count(), 5);

    Ok(())
}

#[test]
fn depth_over_the_limit_is_rejected() -> Result<(), Box<dyn Error>> {
    init_logger();
    let operation = lower(SIX_LEVELS)?;
    assert_eq!(operation.depth(), 6);

    let err = Planner::new(registry(), DEFAULT_MAX_DEPTH)
        .plan(&operation)
        .unwrap_err();

    assert!(matches!(
        err,
        QueryPlanError::DepthLimitExceeded {
            depth: 6,
            max_depth: 5
        }
    ));
    assert_eq!(
        err.to_string(),
        "Query depth of 6 exceeds the maximum allowed depth of 5"
    );

    Ok(())
}

#[test]
fn depth_limit_is_configurable() -> Result<(), Box<dyn Error>> {
    init_logger();
    let operation = lower(FIVE_LEVELS)?;

    assert!(Planner::new(registry(), 7).plan(&operation).is_ok());
    assert!(matches!(
        Planner::new(registry(), 2).plan(&operation),
        Err(QueryPlanError::DepthLimitExceeded {
            depth: 5,
            max_depth: 2
        })
    ));

    Ok(())
}

#[test]
fn recursive_subscriptions_are_stopped_by_the_depth_limit() -> Result<(), Box<dyn Error>> {
    init_logger();
    let operation = lower(
        r#"
          query {
            user(id: "U1") {
              userSubscribedTo {
                userSubscribedTo {
                  userSubscribedTo {
                    userSubscribedTo {
                      userSubscribedTo {
                        name
                      }
                    }
                  }
                }
              }
            }
          }"#,
    )?;

    let err = Planner::new(registry(), DEFAULT_MAX_DEPTH)
        .plan(&operation)
        .unwrap_err();
    assert!(matches!(
        err,
        QueryPlanError::DepthLimitExceeded { depth: 6, .. }
    ));

    Ok(())
}

#[test]
fn scalar_only_root_has_depth_one() -> Result<(), Box<dyn Error>> {
    init_logger();
    let operation = lower(r#"query { users { id name } }"#)?;
    assert_eq!(operation.depth(), 1);

    let plan = Planner::new(registry(), 1).plan(&operation)?;
    assert!(plan.levels.is_empty());

    Ok(())
}
