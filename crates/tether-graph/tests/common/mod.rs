// SPDX-License-Identifier: Apache-2.0
// © Tether Project Developers <https://github.com/tether-data/tether>
#![allow(dead_code, clippy::panic, clippy::expect_used, clippy::unwrap_used)]

use tether_graph::{
    Graph, RelationshipData, RelationshipValue, RemoteOp, ResourceKey, View,
};
use tether_schema::{FieldDescriptor, RelationshipKind, SchemaRegistry};

/// Blog-shaped fixture schema:
/// - `post.author` ⇄ `user.posts` (one-to-many, both declared)
/// - `post.comments` ⇄ `comment.post` (many-to-one, both declared)
/// - `post.tags` → `tag` (to-many, no declared inverse)
/// - `user.spouse` ⇄ `user.spouse` (one-to-one, self-paired)
pub fn schema() -> SchemaRegistry {
    SchemaRegistry::new()
        .with_type(
            "post",
            vec![
                FieldDescriptor::new("author", RelationshipKind::BelongsTo, "user", Some("posts")),
                FieldDescriptor::new("comments", RelationshipKind::HasMany, "comment", Some("post")),
                FieldDescriptor::new("tags", RelationshipKind::HasMany, "tag", None),
            ],
        )
        .with_type(
            "user",
            vec![
                FieldDescriptor::new("posts", RelationshipKind::HasMany, "post", Some("author")),
                FieldDescriptor::new("spouse", RelationshipKind::BelongsTo, "user", Some("spouse")),
            ],
        )
        .with_type(
            "comment",
            vec![FieldDescriptor::new(
                "post",
                RelationshipKind::BelongsTo,
                "post",
                Some("comments"),
            )],
        )
        .with_type("tag", vec![])
}

pub fn graph() -> Graph<SchemaRegistry> {
    Graph::new(schema())
}

pub fn post(n: u32) -> ResourceKey {
    ResourceKey::new("post", format!("@lid:post-{n}"))
}

pub fn user(n: u32) -> ResourceKey {
    ResourceKey::new("user", format!("@lid:user-{n}"))
}

pub fn comment(n: u32) -> ResourceKey {
    ResourceKey::new("comment", format!("@lid:comment-{n}"))
}

pub fn tag(n: u32) -> ResourceKey {
    ResourceKey::new("tag", format!("@lid:tag-{n}"))
}

/// A full to-many remote replacement op.
pub fn replace_many(record: &ResourceKey, field: &str, keys: Vec<ResourceKey>) -> RemoteOp {
    RemoteOp::Update {
        record: record.clone(),
        field: field.into(),
        value: RelationshipValue::Many(keys),
        index: None,
        meta: None,
        links: None,
        observed_ref: None,
    }
}

/// A to-one remote replacement op.
pub fn replace_one(record: &ResourceKey, field: &str, key: Option<ResourceKey>) -> RemoteOp {
    RemoteOp::Update {
        record: record.clone(),
        field: field.into(),
        value: RelationshipValue::One(key),
        index: None,
        meta: None,
        links: None,
        observed_ref: None,
    }
}

/// The effective (local-view) membership of a to-many relationship.
pub fn local_many(graph: &mut Graph<SchemaRegistry>, key: &ResourceKey, field: &str) -> Vec<ResourceKey> {
    match graph
        .relationship_payload(key, field, View::Local)
        .expect("payload")
        .data
    {
        Some(RelationshipData::Many(keys)) => keys,
        other => panic!("expected to-many data for {field}, got {other:?}"),
    }
}

/// The remote-view membership of a to-many relationship.
pub fn remote_many(graph: &mut Graph<SchemaRegistry>, key: &ResourceKey, field: &str) -> Vec<ResourceKey> {
    match graph
        .relationship_payload(key, field, View::Remote)
        .expect("payload")
        .data
    {
        Some(RelationshipData::Many(keys)) => keys,
        other => panic!("expected to-many data for {field}, got {other:?}"),
    }
}

/// The effective (local-view) value of a to-one relationship.
pub fn local_one(graph: &mut Graph<SchemaRegistry>, key: &ResourceKey, field: &str) -> Option<ResourceKey> {
    match graph
        .relationship_payload(key, field, View::Local)
        .expect("payload")
        .data
    {
        Some(RelationshipData::One(key)) => key,
        other => panic!("expected to-one data for {field}, got {other:?}"),
    }
}
