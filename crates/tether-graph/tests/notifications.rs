// SPDX-License-Identifier: Apache-2.0
// © Tether Project Developers <https://github.com/tether-data/tether>
//! Change-signal batching: once per affected (key, field) pair per turn.
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{comment, graph, post, replace_many, replace_one, user};
use tether_graph::{LocalMutation, RelationshipValue, View};

#[test]
fn many_writes_to_one_pair_signal_once_per_batch() {
    let mut g = graph();
    let p = post(1);
    for n in 1..=3 {
        g.update(LocalMutation::AddToRelatedRecords {
            record: p.clone(),
            field: "comments".into(),
            value: RelationshipValue::Many(vec![comment(n)]),
            index: None,
        })
        .unwrap();
    }
    let signals = g.drain_notifications();
    let comment_signals = signals
        .iter()
        .filter(|s| s.record == p && s.field == "comments")
        .count();
    assert_eq!(comment_signals, 1);

    // A fresh batch may signal the same pair again.
    g.update(LocalMutation::AddToRelatedRecords {
        record: p.clone(),
        field: "comments".into(),
        value: RelationshipValue::Many(vec![comment(4)]),
        index: None,
    })
    .unwrap();
    assert_eq!(g.drain_notifications().len(), 2, "owning pair and inverse");
}

#[test]
fn push_signals_both_sides_of_the_relationship() {
    let mut g = graph();
    g.push(replace_one(&post(1), "author", Some(user(1)))).unwrap();
    let signals = g.drain_notifications();
    assert!(signals
        .iter()
        .any(|s| s.record == post(1) && s.field == "author"));
    assert!(signals
        .iter()
        .any(|s| s.record == user(1) && s.field == "posts"));
}

#[test]
fn implicit_edges_never_signal() {
    let mut g = graph();
    g.push(replace_many(&post(1), "tags", vec![common::tag(1)])).unwrap();
    let signals = g.drain_notifications();
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].field, "tags");
    assert_eq!(signals[0].record, post(1));
}

#[test]
fn unload_signals_only_edges_an_observer_has_read() {
    let mut g = graph();
    g.push(replace_many(&post(1), "comments", vec![comment(1)])).unwrap();
    g.push(replace_many(&post(2), "comments", vec![comment(2)])).unwrap();
    // Only post(1)'s relationship has been observed.
    let _ = g
        .relationship_payload(&post(1), "comments", View::Local)
        .unwrap();
    g.drain_notifications();

    g.unload(&comment(1));
    g.unload(&comment(2));

    let signals = g.drain_notifications();
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].record, post(1));
    assert_eq!(signals[0].field, "comments");
}
