// SPDX-License-Identifier: Apache-2.0
// © Tether Project Developers <https://github.com/tether-data/tether>
//! Discarding unsaved edits: rollback restores the remote view and repairs
//! the inverse side's local planes.
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{comment, graph, local_many, local_one, post, replace_many, replace_one, user};
use tether_graph::{LocalMutation, RelationshipValue};

#[test]
fn rollback_restores_a_to_one_override() {
    let mut g = graph();
    let p = post(1);
    g.push(replace_one(&p, "author", Some(user(1)))).unwrap();
    g.update(LocalMutation::ReplaceRelatedRecord {
        record: p.clone(),
        field: "author".into(),
        value: Some(user(2)),
        prior: Some(user(1)),
    })
    .unwrap();
    assert!(g.is_dirty(&p, "author"));
    assert_eq!(local_many(&mut g, &user(2), "posts"), vec![p.clone()]);

    g.rollback_local(&p, "author").unwrap();

    assert!(!g.is_dirty(&p, "author"));
    assert_eq!(local_one(&mut g, &p, "author"), Some(user(1)));
    assert!(local_many(&mut g, &user(2), "posts").is_empty());
    assert_eq!(local_many(&mut g, &user(1), "posts"), vec![p.clone()]);
}

#[test]
fn rollback_restores_collection_edits() {
    let mut g = graph();
    let p = post(1);
    g.push(replace_many(&p, "comments", vec![comment(1), comment(2)]))
        .unwrap();
    g.update(LocalMutation::RemoveFromRelatedRecords {
        record: p.clone(),
        field: "comments".into(),
        value: RelationshipValue::Many(vec![comment(1)]),
        index: None,
    })
    .unwrap();
    g.update(LocalMutation::AddToRelatedRecords {
        record: p.clone(),
        field: "comments".into(),
        value: RelationshipValue::Many(vec![comment(3)]),
        index: None,
    })
    .unwrap();
    assert_eq!(local_many(&mut g, &p, "comments"), vec![comment(2), comment(3)]);

    g.rollback_local(&p, "comments").unwrap();

    assert!(!g.is_dirty(&p, "comments"));
    assert_eq!(
        local_many(&mut g, &p, "comments"),
        vec![comment(1), comment(2)]
    );
    // Inverse local planes follow: the cancelled addition no longer claims
    // the post, the cancelled removal points at it again.
    assert_eq!(local_one(&mut g, &comment(3), "post"), None);
    assert_eq!(local_one(&mut g, &comment(1), "post"), Some(p.clone()));
}

#[test]
fn rollback_all_clears_every_dirty_field() {
    let mut g = graph();
    let p = post(1);
    g.push(replace_one(&p, "author", Some(user(1)))).unwrap();
    g.push(replace_many(&p, "comments", vec![comment(1)])).unwrap();
    g.update(LocalMutation::ReplaceRelatedRecord {
        record: p.clone(),
        field: "author".into(),
        value: None,
        prior: None,
    })
    .unwrap();
    g.update(LocalMutation::AddToRelatedRecords {
        record: p.clone(),
        field: "comments".into(),
        value: RelationshipValue::Many(vec![comment(2)]),
        index: None,
    })
    .unwrap();
    assert_eq!(g.local_changes(&p).len(), 2);

    g.rollback_all(&p);

    assert!(g.local_changes(&p).is_empty());
    assert_eq!(local_one(&mut g, &p, "author"), Some(user(1)));
    assert_eq!(local_many(&mut g, &p, "comments"), vec![comment(1)]);
}

#[test]
fn rollback_of_a_clean_edge_is_a_no_op() {
    let mut g = graph();
    let p = post(1);
    g.push(replace_many(&p, "comments", vec![comment(1)])).unwrap();
    g.drain_notifications();

    g.rollback_local(&p, "comments").unwrap();

    assert!(g.drain_notifications().is_empty());
}
