// SPDX-License-Identifier: Apache-2.0
// © Tether Project Developers <https://github.com/tether-data/tether>
//! Identity reconciliation: two keys turning out to name the same resource.
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{comment, graph, local_many, local_one, post, remote_many, replace_many, replace_one, user};
use tether_graph::{LocalMutation, RelationshipValue, RemoteOp};

fn merge(stale: &tether_graph::ResourceKey, canonical: &tether_graph::ResourceKey) -> RemoteOp {
    RemoteOp::MergeIdentifiers {
        record: stale.clone(),
        value: canonical.clone(),
    }
}

#[test]
fn merge_rewrites_remote_and_local_references() {
    let mut g = graph();
    let stale = comment(90);
    let canonical = comment(1);

    // Stale key referenced remotely on one post and locally on another.
    g.push(replace_many(&post(1), "comments", vec![stale.clone(), comment(2)]))
        .unwrap();
    g.update(LocalMutation::AddToRelatedRecords {
        record: post(2),
        field: "comments".into(),
        value: RelationshipValue::Many(vec![stale.clone()]),
        index: None,
    })
    .unwrap();

    g.push(merge(&stale, &canonical)).unwrap();

    assert_eq!(
        remote_many(&mut g, &post(1), "comments"),
        vec![canonical.clone(), comment(2)]
    );
    assert_eq!(
        local_many(&mut g, &post(2), "comments"),
        vec![canonical.clone()]
    );
    assert!(!g.has_edge(&stale, "post"), "stale key's edges are gone");
}

#[test]
fn collections_holding_both_keys_collapse_to_one_entry() {
    let mut g = graph();
    let stale = comment(90);
    let canonical = comment(1);

    g.push(replace_many(
        &post(1),
        "comments",
        vec![stale.clone(), comment(2), canonical.clone()],
    ))
    .unwrap();

    g.push(merge(&stale, &canonical)).unwrap();

    assert_eq!(
        remote_many(&mut g, &post(1), "comments"),
        vec![canonical.clone(), comment(2)],
        "canonical keeps the stale key's (earlier) position, once"
    );
    assert_eq!(local_one(&mut g, &canonical, "post"), Some(post(1)));
}

#[test]
fn merged_key_keeps_both_sides_knowledge() {
    let mut g = graph();
    let placeholder = post(90);
    let persisted = post(1);

    // The placeholder gathered relationships before the server id arrived.
    g.push(replace_one(&placeholder, "author", Some(user(1)))).unwrap();
    g.push(replace_many(&persisted, "comments", vec![comment(1)])).unwrap();

    g.push(merge(&placeholder, &persisted)).unwrap();

    assert_eq!(local_one(&mut g, &persisted, "author"), Some(user(1)));
    assert_eq!(local_many(&mut g, &persisted, "comments"), vec![comment(1)]);
    // The author's collection now names the canonical key only.
    let posts = local_many(&mut g, &user(1), "posts");
    assert_eq!(posts, vec![persisted.clone()]);
    assert!(!g.has_edge(&placeholder, "author"));
}

#[test]
fn merge_repairs_to_one_inverses_pointing_at_the_stale_key() {
    let mut g = graph();
    let stale = post(90);
    let canonical = post(1);

    g.push(replace_many(&stale, "comments", vec![comment(1), comment(2)]))
        .unwrap();
    g.push(merge(&stale, &canonical)).unwrap();

    assert_eq!(local_one(&mut g, &comment(1), "post"), Some(canonical.clone()));
    assert_eq!(local_one(&mut g, &comment(2), "post"), Some(canonical.clone()));
    assert_eq!(
        remote_many(&mut g, &canonical, "comments"),
        vec![comment(1), comment(2)]
    );
}

#[test]
fn merge_of_identical_or_mismatched_keys_is_a_no_op() {
    let mut g = graph();
    g.push(replace_many(&post(1), "comments", vec![comment(1)])).unwrap();
    g.drain_notifications();

    g.push(merge(&post(1), &post(1))).unwrap();
    assert!(g.drain_notifications().is_empty());

    // Keys of different types never denote the same resource.
    g.push(merge(&post(1), &user(1))).unwrap();
    assert_eq!(remote_many(&mut g, &post(1), "comments"), vec![comment(1)]);
}
