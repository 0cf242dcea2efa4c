use std::num::NonZeroUsize;

use async_trait::async_trait;
use relgraph_query_planner::schema::Cardinality;

use crate::{
    execution::{error::AssemblyAnomaly, plan::PlanExecutor},
    pipeline::GraphQLRequest,
    projection::response::project_by_operation,
    store::{
        memory::InMemoryStore, BackingStore, EntityKey, FetchError, GroupedRows,
        KeyedFetchRequest, RootFetchRequest, Row,
    },
    tests::testkit::{engine, fixture_store, init_logger, registry},
};

/// Answers like the wrapped store, but doubles every `One` group and adds rows nobody asked for.
struct SloppyStore {
    inner: InMemoryStore,
}

#[async_trait]
impl BackingStore for SloppyStore {
    async fn fetch_root<'a>(&self, request: RootFetchRequest<'a>) -> Result<Vec<Row>, FetchError> {
        self.inner.fetch_root(request).await
    }

    async fn fetch_by_keys<'a>(
        &self,
        request: KeyedFetchRequest<'a>,
    ) -> Result<GroupedRows, FetchError> {
        let cardinality = request.edge.cardinality;
        let mut groups = self.inner.fetch_by_keys(request).await?;

        if cardinality == Cardinality::One {
            for rows in groups.values_mut() {
                let copy = rows.clone();
                rows.extend(copy);
            }
        }
        groups.insert(EntityKey::from("nobody"), vec![Row::new()]);

        Ok(groups)
    }
}

#[tokio::test]
async fn sloppy_answers_are_repaired_and_recorded() {
    init_logger();
    let store = fixture_store();
    let registry = registry();
    let prepared = engine(&store)
        .prepare(&GraphQLRequest::new(
            r#"
              query {
                user(id: "U1") {
                  profile {
                    yearOfBirth
                  }
                  posts {
                    title
                  }
                }
              }"#,
        ))
        .expect("operation should plan");

    let sloppy = SloppyStore { inner: store };
    let max_in_flight = NonZeroUsize::new(4).unwrap();
    let resolved = PlanExecutor::new(&prepared.plan, &registry, &sloppy, max_in_flight)
        .execute()
        .await
        .expect("execution should finish");

    // Doubled profile, plus the stray group on both edges.
    assert_eq!(resolved.anomalies.len(), 3);
    assert!(resolved.anomalies.contains(&AssemblyAnomaly::ExtraRowsForOne {
        edge: "User.profile".to_string(),
        key: EntityKey::from("U1"),
        rows: 2,
    }));
    assert!(resolved.anomalies.contains(&AssemblyAnomaly::UnrequestedKey {
        edge: "User.posts".to_string(),
        key: EntityKey::from("nobody"),
        rows: 1,
    }));

    let (data, errors) = project_by_operation(&prepared.operation, &prepared.plan, &resolved);
    assert!(errors.is_empty());
    assert_eq!(
        serde_json::to_value(&data).expect("data should serialize"),
        serde_json::json!({
            "user": {
                "profile": { "yearOfBirth": 1990 },
                "posts": [{ "title": "Hello" }, { "title": "Again" }]
            }
        })
    );
}

#[test]
fn anomalies_serialize_with_their_kind() {
    let anomaly = AssemblyAnomaly::UnrequestedKey {
        edge: "Post.author".to_string(),
        key: EntityKey::Int(7),
        rows: 2,
    };

    insta::assert_json_snapshot!(anomaly, @r#"
    {
      "kind": "unrequestedKey",
      "edge": "Post.author",
      "key": 7,
      "rows": 2
    }
    "#);
}
