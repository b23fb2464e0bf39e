// SPDX-License-Identifier: Apache-2.0
// © Tether Project Developers <https://github.com/tether-data/tether>
//! Diff correctness: the effective view merges remote order with local
//! removals and additions.
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{comment, graph, local_many, post, remote_many, replace_many};
use tether_graph::{LocalMutation, RelationshipValue, RemoteOp};

#[test]
fn removals_are_excised_and_additions_appended() {
    let mut g = graph();
    let p = post(1);
    g.push(replace_many(&p, "comments", vec![comment(1), comment(2), comment(3)]))
        .unwrap();

    g.update(LocalMutation::RemoveFromRelatedRecords {
        record: p.clone(),
        field: "comments".into(),
        value: RelationshipValue::Many(vec![comment(2)]),
        index: None,
    })
    .unwrap();
    g.update(LocalMutation::AddToRelatedRecords {
        record: p.clone(),
        field: "comments".into(),
        value: RelationshipValue::Many(vec![comment(4)]),
        index: None,
    })
    .unwrap();

    assert_eq!(
        local_many(&mut g, &p, "comments"),
        vec![comment(1), comment(3), comment(4)]
    );
    // The remote view is untouched by local edits.
    assert_eq!(
        remote_many(&mut g, &p, "comments"),
        vec![comment(1), comment(2), comment(3)]
    );
    assert!(g.is_dirty(&p, "comments"));

    // The server confirms the edited membership: local edits are satisfied
    // and cleared, and the effective view is unchanged.
    g.push(replace_many(&p, "comments", vec![comment(1), comment(3), comment(4)]))
        .unwrap();
    assert!(!g.is_dirty(&p, "comments"));
    assert_eq!(
        local_many(&mut g, &p, "comments"),
        vec![comment(1), comment(3), comment(4)]
    );
}

#[test]
fn effective_view_is_stable_across_reads() {
    let mut g = graph();
    let p = post(1);
    g.push(replace_many(&p, "comments", vec![comment(1), comment(2)]))
        .unwrap();
    g.update(LocalMutation::AddToRelatedRecords {
        record: p.clone(),
        field: "comments".into(),
        value: RelationshipValue::Many(vec![comment(3)]),
        index: None,
    })
    .unwrap();

    let first = local_many(&mut g, &p, "comments");
    let second = local_many(&mut g, &p, "comments");
    assert_eq!(first, second);
}

#[test]
fn addition_at_index_is_spliced_into_the_view() {
    let mut g = graph();
    let p = post(1);
    g.push(replace_many(&p, "comments", vec![comment(1), comment(2)]))
        .unwrap();
    g.update(LocalMutation::AddToRelatedRecords {
        record: p.clone(),
        field: "comments".into(),
        value: RelationshipValue::Many(vec![comment(8), comment(9)]),
        index: Some(1),
    })
    .unwrap();
    assert_eq!(
        local_many(&mut g, &p, "comments"),
        vec![comment(1), comment(8), comment(9), comment(2)]
    );
}

#[test]
fn replace_related_records_controls_membership_and_order() {
    let mut g = graph();
    let p = post(1);
    g.push(replace_many(&p, "comments", vec![comment(1), comment(2), comment(3)]))
        .unwrap();
    g.update(LocalMutation::ReplaceRelatedRecords {
        record: p.clone(),
        field: "comments".into(),
        value: vec![comment(3), comment(1), comment(4)],
        prior: None,
        index: None,
    })
    .unwrap();
    assert_eq!(
        local_many(&mut g, &p, "comments"),
        vec![comment(3), comment(1), comment(4)]
    );
    assert!(g.is_dirty(&p, "comments"));

    // Replacing back with exactly the remote content leaves the edge clean.
    g.update(LocalMutation::ReplaceRelatedRecords {
        record: p.clone(),
        field: "comments".into(),
        value: vec![comment(1), comment(2), comment(3)],
        prior: None,
        index: None,
    })
    .unwrap();
    assert!(!g.is_dirty(&p, "comments"));
}

#[test]
fn sort_related_records_reorders_without_membership_change() {
    let mut g = graph();
    let p = post(1);
    g.push(replace_many(&p, "comments", vec![comment(1), comment(2), comment(3)]))
        .unwrap();
    g.update(LocalMutation::SortRelatedRecords {
        record: p.clone(),
        field: "comments".into(),
        value: vec![comment(3), comment(2), comment(1)],
    })
    .unwrap();
    assert_eq!(
        local_many(&mut g, &p, "comments"),
        vec![comment(3), comment(2), comment(1)]
    );
    assert_eq!(
        remote_many(&mut g, &p, "comments"),
        vec![comment(1), comment(2), comment(3)]
    );
}

#[test]
fn identical_replace_push_is_idempotent() {
    let mut g = graph();
    let p = post(1);
    let op = replace_many(&p, "comments", vec![comment(1), comment(2)]);
    g.push(op.clone()).unwrap();
    let baseline = local_many(&mut g, &p, "comments");
    g.drain_notifications();

    g.push(op).unwrap();
    assert_eq!(local_many(&mut g, &p, "comments"), baseline);
    assert!(
        g.drain_notifications().is_empty(),
        "an identical push must not re-signal observers"
    );
}

#[test]
fn remote_splice_moves_a_run_in_place() {
    let mut g = graph();
    let p = post(1);
    g.push(replace_many(&p, "comments", vec![comment(1), comment(2), comment(3)]))
        .unwrap();
    g.push(RemoteOp::Update {
        record: p.clone(),
        field: "comments".into(),
        value: RelationshipValue::Many(vec![comment(3), comment(4)]),
        index: Some(0),
        meta: None,
        links: None,
        observed_ref: None,
    })
    .unwrap();
    assert_eq!(
        remote_many(&mut g, &p, "comments"),
        vec![comment(3), comment(4), comment(1), comment(2)]
    );
}
