//! The users / profiles / posts / member types data model, with its subscription graph.

use super::{
    Cardinality, EntityType, JoinTable, RelationEdge, RootField, RootFieldKind, ScalarKind,
    SchemaError, SchemaRegistry,
};

pub const USER: &str = "User";
pub const POST: &str = "Post";
pub const PROFILE: &str = "Profile";
pub const MEMBER_TYPE: &str = "MemberType";
pub const SUBSCRIBERS_ON_AUTHORS: &str = "SubscribersOnAuthors";

fn subscriptions(parent_column: &str, child_column: &str) -> JoinTable {
    JoinTable {
        entity: SUBSCRIBERS_ON_AUTHORS.to_string(),
        parent_column: parent_column.to_string(),
        child_column: child_column.to_string(),
    }
}

pub fn social_schema() -> Result<SchemaRegistry, SchemaError> {
    let mut builder = SchemaRegistry::builder();

    builder
        .register(
            EntityType::new(USER)
                .with_field("id", ScalarKind::Id)
                .with_field("name", ScalarKind::String)
                .with_field("balance", ScalarKind::Float)
                .with_edge(RelationEdge::referencing(
                    "profile",
                    PROFILE,
                    Cardinality::One,
                    "id",
                    "userId",
                ))
                .with_edge(RelationEdge::referencing(
                    "posts",
                    POST,
                    Cardinality::Many,
                    "id",
                    "authorId",
                ))
                .with_edge(RelationEdge::through(
                    "userSubscribedTo",
                    USER,
                    "id",
                    "id",
                    subscriptions("subscriberId", "authorId"),
                ))
                .with_edge(RelationEdge::through(
                    "subscribedToUser",
                    USER,
                    "id",
                    "id",
                    subscriptions("authorId", "subscriberId"),
                )),
        )?
        .register(
            EntityType::new(POST)
                .with_field("id", ScalarKind::Id)
                .with_field("title", ScalarKind::String)
                .with_field("content", ScalarKind::String)
                .with_field("authorId", ScalarKind::Id)
                .with_edge(RelationEdge::owning("author", USER, "authorId", "id")),
        )?
        .register(
            EntityType::new(PROFILE)
                .with_field("id", ScalarKind::Id)
                .with_field("isMale", ScalarKind::Boolean)
                .with_field("yearOfBirth", ScalarKind::Int)
                .with_field("userId", ScalarKind::Id)
                .with_field("memberTypeId", ScalarKind::Id)
                .with_edge(RelationEdge::owning(
                    "memberType",
                    MEMBER_TYPE,
                    "memberTypeId",
                    "id",
                ))
                .with_edge(RelationEdge::owning("user", USER, "userId", "id")),
        )?
        .register(
            EntityType::new(MEMBER_TYPE)
                .with_field("id", ScalarKind::Id)
                .with_field("discount", ScalarKind::Float)
                .with_field("postsLimitPerMonth", ScalarKind::Int)
                .with_edge(RelationEdge::referencing(
                    "profiles",
                    PROFILE,
                    Cardinality::Many,
                    "id",
                    "memberTypeId",
                )),
        )?
        .register(
            EntityType::new(SUBSCRIBERS_ON_AUTHORS)
                .with_field("id", ScalarKind::Id)
                .with_field("subscriberId", ScalarKind::Id)
                .with_field("authorId", ScalarKind::Id),
        )?;

    for (single, list, entity) in [
        ("user", "users", USER),
        ("post", "posts", POST),
        ("profile", "profiles", PROFILE),
        ("memberType", "memberTypes", MEMBER_TYPE),
    ] {
        builder
            .root_field(RootField::query(single, entity, RootFieldKind::FindOne))?
            .root_field(RootField::query(list, entity, RootFieldKind::FindMany))?;
    }

    for (suffix, entity) in [("User", USER), ("Post", POST), ("Profile", PROFILE)] {
        builder
            .root_field(RootField::mutation(
                &format!("create{suffix}"),
                entity,
                RootFieldKind::Create,
            ))?
            .root_field(RootField::mutation(
                &format!("change{suffix}"),
                entity,
                RootFieldKind::Update,
            ))?
            .root_field(RootField::mutation(
                &format!("delete{suffix}"),
                entity,
                RootFieldKind::Delete,
            ))?;
    }

    builder
        .root_field(RootField::mutation(
            "subscribeTo",
            USER,
            RootFieldKind::Link {
                edge: "userSubscribedTo".to_string(),
                parent_argument: "userId".to_string(),
                child_argument: "authorId".to_string(),
            },
        ))?
        .root_field(RootField::mutation(
            "unsubscribeFrom",
            USER,
            RootFieldKind::Unlink {
                edge: "userSubscribedTo".to_string(),
                parent_argument: "userId".to_string(),
                child_argument: "authorId".to_string(),
            },
        ))?;

    builder.build()
}
