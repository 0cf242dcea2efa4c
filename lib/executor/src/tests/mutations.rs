use relgraph_config::EngineConfig;
use serde_json::json;

use crate::{
    pipeline::{GraphQLRequest, QueryEngine},
    store::{BackingStore, FetchError},
    tests::testkit::{engine, execute, fixture_store, init_logger, registry},
};

#[tokio::test]
async fn create_returns_the_stored_row() {
    init_logger();
    let store = fixture_store();
    let engine = engine(&store);

    let response = execute(
        &engine,
        r#"
          mutation {
            createUser(dto: { name: "Dee", balance: 12.5 }) {
              id
              name
              balance
              posts {
                title
              }
            }
          }"#,
    )
    .await;

    let created = &response["data"]["createUser"];
    assert!(response.get("errors").is_none());
    assert!(created["id"].as_str().is_some_and(|id| !id.is_empty()));
    assert_eq!(created["name"], "Dee");
    assert_eq!(created["balance"], json!(12.5));
    assert_eq!(created["posts"], json!([]));
    assert_eq!(store.rows("User").len(), 4);
}

#[tokio::test]
async fn change_then_resolve_relations() {
    init_logger();
    let store = fixture_store();
    let engine = engine(&store);

    let response = execute(
        &engine,
        r#"
          mutation {
            changePost(id: "P1", dto: { title: "Renamed" }) {
              title
              content
              author {
                name
              }
            }
          }"#,
    )
    .await;

    assert_eq!(
        response,
        json!({
            "data": {
                "changePost": {
                    "title": "Renamed",
                    "content": "First post",
                    "author": { "name": "Ann" }
                }
            }
        })
    );
}

#[tokio::test]
async fn delete_returns_the_id() {
    init_logger();
    let store = fixture_store();
    let engine = engine(&store);

    let response = execute(&engine, r#"mutation { deleteUser(id: "U3") }"#).await;

    assert_eq!(response, json!({ "data": { "deleteUser": "U3" } }));
    assert_eq!(store.rows("User").len(), 2);
}

#[tokio::test]
async fn subscribe_reads_the_subscriber_back() {
    init_logger();
    let store = fixture_store();
    let engine = engine(&store);

    let response = execute(
        &engine,
        r#"
          mutation {
            subscribeTo(userId: "U2", authorId: "U3") {
              name
              userSubscribedTo {
                name
              }
            }
          }"#,
    )
    .await;

    // Only the nested batch; the subscriber row comes back with the link.
    assert_eq!(store.fetch_count(), 1);
    assert_eq!(
        response,
        json!({
            "data": {
                "subscribeTo": {
                    "name": "Bob",
                    "userSubscribedTo": [{ "name": "Cid" }]
                }
            }
        })
    );
    assert_eq!(store.rows("SubscribersOnAuthors").len(), 4);
}

#[tokio::test]
async fn committed_link_survives_failing_reads() {
    init_logger();
    let store = fixture_store();
    store.fail("User", FetchError::Connection("refused".to_string()));
    let engine = engine(&store);
    let subscribe = r#"
      mutation {
        subscribeTo(userId: "U2", authorId: "U3") {
          name
        }
      }"#;

    let response = execute(&engine, subscribe).await;

    assert_eq!(
        response,
        json!({ "data": { "subscribeTo": { "name": "Bob" } } })
    );
    assert_eq!(store.fetch_count(), 0);
    assert_eq!(store.rows("SubscribersOnAuthors").len(), 4);

    let retried = execute(&engine, subscribe).await;
    assert_eq!(retried["data"], json!({ "subscribeTo": null }));
    assert_eq!(
        retried["errors"][0]["message"],
        "Failed to fetch \"Mutation.subscribeTo\": Constraint violation: SubscribersOnAuthors already links \"U2\" to \"U3\""
    );
    assert_eq!(store.rows("SubscribersOnAuthors").len(), 4);
}

#[tokio::test]
async fn unsubscribe_returns_the_subscriber_id() {
    init_logger();
    let store = fixture_store();
    let engine = engine(&store);

    let response = execute(
        &engine,
        r#"mutation { unsubscribeFrom(userId: "U1", authorId: "U2") }"#,
    )
    .await;

    assert_eq!(response, json!({ "data": { "unsubscribeFrom": "U1" } }));
    assert_eq!(store.rows("SubscribersOnAuthors").len(), 2);
}

#[tokio::test]
async fn mutation_fields_run_in_document_order() {
    init_logger();
    let store = fixture_store();
    let engine = engine(&store);

    // Unsubscribing only succeeds once the subscription exists.
    let response = execute(
        &engine,
        r#"
          mutation {
            subscribeTo(userId: "U2", authorId: "U1") {
              name
            }
            unsubscribeFrom(userId: "U2", authorId: "U1")
          }"#,
    )
    .await;

    assert_eq!(
        response,
        json!({
            "data": {
                "subscribeTo": { "name": "Bob" },
                "unsubscribeFrom": "U2"
            }
        })
    );
    assert_eq!(store.rows("SubscribersOnAuthors").len(), 3);
}

#[tokio::test]
async fn missing_record_fails_only_that_field() {
    init_logger();
    let store = fixture_store();
    let engine = engine(&store);

    let response = execute(
        &engine,
        r#"
          mutation {
            changeUser(id: "U9", dto: { name: "Nobody" }) {
              name
            }
            changeUser2: changeUser(id: "U2", dto: { name: "Robert" }) {
              name
              balance
            }
          }"#,
    )
    .await;

    assert_eq!(
        response,
        json!({
            "data": {
                "changeUser": null,
                "changeUser2": { "name": "Robert", "balance": 50.5 }
            },
            "errors": [
                {
                    "message": "Failed to fetch \"Mutation.changeUser\": Constraint violation: No User found for id \"U9\"",
                    "path": ["changeUser"],
                    "extensions": { "code": "MUTATION_FAILED" }
                }
            ]
        })
    );
}

#[tokio::test]
async fn dangling_reference_is_rejected() {
    init_logger();
    let store = fixture_store();
    let engine = engine(&store);

    let response = execute(
        &engine,
        r#"
          mutation {
            createPost(dto: { title: "Orphan", content: "...", authorId: "U9" }) {
              id
            }
          }"#,
    )
    .await;

    assert_eq!(response["data"], json!({ "createPost": null }));
    assert_eq!(
        response["errors"][0]["extensions"]["code"],
        "MUTATION_FAILED"
    );
    assert_eq!(store.rows("Post").len(), 3);
}

#[tokio::test]
async fn read_only_engine_refuses_mutations() {
    init_logger();
    let store = fixture_store();
    let engine = QueryEngine::new(
        registry(),
        BackingStore::to_boxed_arc(store.clone()),
        EngineConfig::default(),
    )
    .unwrap();

    let response = engine
        .execute(&GraphQLRequest::new(r#"mutation { deleteUser(id: "U1") }"#))
        .await
        .to_json();

    assert_eq!(
        response,
        json!({
            "data": null,
            "errors": [
                {
                    "message": "Unexpected error",
                    "extensions": { "code": "INTERNAL_SERVER_ERROR" }
                }
            ]
        })
    );
    assert_eq!(store.rows("User").len(), 3);
}
