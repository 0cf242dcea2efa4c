use serde_json::json;

use crate::{
    store::{memory::FetchRecord, EntityKey},
    tests::testkit::{engine, execute, execute_to_string, fetch_targets, fixture_store, init_logger},
};

fn keyed_fetches(records: Vec<FetchRecord>) -> Vec<(String, Vec<EntityKey>)> {
    records
        .into_iter()
        .filter_map(|record| match record {
            FetchRecord::Keyed { edge, keys, .. } => Some((edge, keys)),
            FetchRecord::Root { .. } => None,
        })
        .collect()
}

#[tokio::test]
async fn parent_keys_are_deduplicated() {
    init_logger();
    let store = fixture_store();
    let engine = engine(&store);

    let response = execute(
        &engine,
        r#"
          query {
            posts {
              title
              author {
                name
              }
            }
          }"#,
    )
    .await;

    assert_eq!(
        keyed_fetches(store.fetch_log()),
        vec![(
            "Post.author".to_string(),
            vec![EntityKey::from("U1"), EntityKey::from("U2")]
        )]
    );
    assert_eq!(
        response,
        json!({
            "data": {
                "posts": [
                    { "title": "Hello", "author": { "name": "Ann" } },
                    { "title": "Again", "author": { "name": "Ann" } },
                    { "title": "Bob writes", "author": { "name": "Bob" } }
                ]
            }
        })
    );
}

#[tokio::test]
async fn no_parent_keys_means_no_fetch() {
    init_logger();
    let store = fixture_store();
    let engine = engine(&store);

    let response = execute(
        &engine,
        r#"
          query {
            user(id: "U3") {
              posts {
                author {
                  name
                }
              }
            }
          }"#,
    )
    .await;

    assert_eq!(fetch_targets(&store), vec!["User", "User.posts"]);
    assert_eq!(response, json!({ "data": { "user": { "posts": [] } } }));
}

#[tokio::test]
async fn missing_root_stops_after_one_fetch() {
    init_logger();
    let store = fixture_store();
    let engine = engine(&store);

    let response = execute(
        &engine,
        r#"
          query {
            user(id: "U9") {
              name
              posts {
                title
              }
            }
          }"#,
    )
    .await;

    assert_eq!(store.fetch_count(), 1);
    assert_eq!(response, json!({ "data": { "user": null } }));
}

#[tokio::test]
async fn same_edge_under_different_parents_is_one_batch() {
    init_logger();
    let store = fixture_store();
    let engine = engine(&store);

    execute(
        &engine,
        r#"
          query {
            users {
              posts {
                title
              }
            }
            profiles {
              user {
                posts {
                  content
                }
              }
            }
          }"#,
    )
    .await;

    let posts_fetches = keyed_fetches(store.fetch_log())
        .into_iter()
        .filter(|(edge, _)| edge == "User.posts")
        .count();
    // users.posts sits at level 1 and profiles.user.posts at level 2.
    assert_eq!(posts_fetches, 2);
}

#[tokio::test]
async fn fetches_through_the_join_table() {
    init_logger();
    let store = fixture_store();
    let engine = engine(&store);

    let response = execute_to_string(
        &engine,
        r#"
          query {
            user(id: "U3") {
              userSubscribedTo {
                name
                subscribedToUser {
                  name
                }
              }
            }
          }"#,
    )
    .await;

    assert_eq!(
        keyed_fetches(store.fetch_log()),
        vec![
            ("User.userSubscribedTo".to_string(), vec![EntityKey::from("U3")]),
            (
                "User.subscribedToUser".to_string(),
                vec![EntityKey::from("U2"), EntityKey::from("U1")]
            ),
        ]
    );
    insta::assert_snapshot!(response, @r#"{"data":{"user":{"userSubscribedTo":[{"name":"Bob","subscribedToUser":[{"name":"Ann"},{"name":"Cid"}]},{"name":"Ann","subscribedToUser":[{"name":"Cid"}]}]}}}"#);
}

#[tokio::test]
async fn relation_filter_narrows_the_batch() {
    init_logger();
    let store = fixture_store();
    let engine = engine(&store);

    let response = execute(
        &engine,
        r#"
          query {
            users {
              name
              posts(id: "P2") {
                title
              }
            }
          }"#,
    )
    .await;

    assert_eq!(
        response,
        json!({
            "data": {
                "users": [
                    { "name": "Ann", "posts": [{ "title": "Again" }] },
                    { "name": "Bob", "posts": [] },
                    { "name": "Cid", "posts": [] }
                ]
            }
        })
    );
}

#[tokio::test]
async fn repeated_requests_are_identical() {
    init_logger();
    let store = fixture_store();
    let engine = engine(&store);
    let query = r#"
      query {
        users {
          name
          balance
          posts {
            title
            author {
              name
            }
          }
          subscribedToUser {
            name
          }
        }
      }"#;

    let first = execute_to_string(&engine, query).await;
    for _ in 0..10 {
        assert_eq!(execute_to_string(&engine, query).await, first);
    }
}
