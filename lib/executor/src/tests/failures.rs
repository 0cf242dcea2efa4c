use serde_json::json;

use crate::{
    store::FetchError,
    tests::testkit::{engine, execute, fetch_targets, fixture_store, init_logger},
};

#[tokio::test]
async fn failed_batch_nulls_only_its_branch() {
    init_logger();
    let store = fixture_store();
    store.fail("User.posts", FetchError::Connection("refused".to_string()));
    let engine = engine(&store);

    let response = execute(
        &engine,
        r#"
          query {
            user(id: "U1") {
              name
              posts {
                title
                author {
                  name
                }
              }
              profile {
                isMale
              }
            }
          }"#,
    )
    .await;

    // Post.author depended on the failed batch and is never fetched.
    assert_eq!(fetch_targets(&store), vec!["User", "User.posts", "User.profile"]);
    assert_eq!(
        response,
        json!({
            "data": {
                "user": {
                    "name": "Ann",
                    "posts": null,
                    "profile": { "isMale": false }
                }
            },
            "errors": [
                {
                    "message": "Failed to fetch \"User.posts\": Connection to the backing store failed: refused",
                    "path": ["user", "posts"],
                    "extensions": { "code": "FETCH_FAILED" }
                }
            ]
        })
    );
}

#[tokio::test]
async fn failed_root_leaves_other_roots_alone() {
    init_logger();
    let store = fixture_store();
    store.fail("Post", FetchError::Internal("disk full".to_string()));
    let engine = engine(&store);

    let response = execute(
        &engine,
        r#"
          query {
            posts {
              title
            }
            user(id: "U2") {
              name
            }
          }"#,
    )
    .await;

    assert_eq!(
        response,
        json!({
            "data": {
                "posts": null,
                "user": { "name": "Bob" }
            },
            "errors": [
                {
                    "message": "Failed to fetch \"Query.posts\": Backing store failed: disk full",
                    "path": ["posts"],
                    "extensions": { "code": "FETCH_FAILED" }
                }
            ]
        })
    );
}

#[tokio::test]
async fn shared_batch_failure_reports_every_node() {
    init_logger();
    let store = fixture_store();
    store.fail("User.posts", FetchError::Timeout(std::time::Duration::from_secs(2)));
    let engine = engine(&store);

    let response = execute(
        &engine,
        r#"
          query {
            first: user(id: "U1") {
              posts {
                title
              }
            }
            second: user(id: "U2") {
              posts {
                title
              }
            }
          }"#,
    )
    .await;

    assert_eq!(store.fetch_count(), 3);
    assert_eq!(
        response["data"],
        json!({
            "first": { "posts": null },
            "second": { "posts": null }
        })
    );

    let paths: Vec<serde_json::Value> = response["errors"]
        .as_array()
        .expect("errors should be reported")
        .iter()
        .map(|error| error["path"].clone())
        .collect();
    assert_eq!(
        paths,
        vec![json!(["first", "posts"]), json!(["second", "posts"])]
    );
}

#[tokio::test]
async fn failure_deep_in_the_tree() {
    init_logger();
    let store = fixture_store();
    store.fail("Profile.memberType", FetchError::Connection("reset".to_string()));
    let engine = engine(&store);

    let response = execute(
        &engine,
        r#"
          query {
            users {
              name
              profile {
                memberType {
                  discount
                }
              }
            }
          }"#,
    )
    .await;

    // Every profile that reached the failed batch shows null; U3 has no profile at all.
    assert_eq!(
        response["data"],
        json!({
            "users": [
                { "name": "Ann", "profile": { "memberType": null } },
                { "name": "Bob", "profile": { "memberType": null } },
                { "name": "Cid", "profile": null }
            ]
        })
    );
    assert_eq!(response["errors"].as_array().map(Vec::len), Some(1));
    assert_eq!(
        response["errors"][0]["path"],
        json!(["users", "profile", "memberType"])
    );
}

#[tokio::test]
async fn failures_clear_between_requests() {
    init_logger();
    let store = fixture_store();
    let engine = engine(&store);
    let query = r#"query { user(id: "U1") { posts { title } } }"#;

    store.fail("User.posts", FetchError::Connection("refused".to_string()));
    let failed = execute(&engine, query).await;
    assert_eq!(failed["data"], json!({ "user": { "posts": null } }));

    store.clear_failures();
    store.clear_fetch_log();
    let recovered = execute(&engine, query).await;
    assert_eq!(fetch_targets(&store), vec!["User", "User.posts"]);
    assert_eq!(
        recovered,
        json!({ "data": { "user": { "posts": [{ "title": "Hello" }, { "title": "Again" }] } } })
    );
}
