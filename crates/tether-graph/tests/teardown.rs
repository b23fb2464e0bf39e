// SPDX-License-Identifier: Apache-2.0
// © Tether Project Developers <https://github.com/tether-data/tether>
//! Unload teardown: scrubbing every inbound reference to a removed key.
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{comment, graph, local_many, local_one, post, remote_many, replace_many, replace_one, tag, user};
use tether_graph::{implicit_field_name, LocalMutation, RelationshipValue};

#[test]
fn unload_scrubs_collections_and_marks_the_gap() {
    let mut g = graph();
    let p = post(1);
    g.push(replace_many(&p, "comments", vec![comment(1), comment(2)]))
        .unwrap();

    g.unload(&comment(1));

    assert_eq!(remote_many(&mut g, &p, "comments"), vec![comment(2)]);
    assert_eq!(local_many(&mut g, &p, "comments"), vec![comment(2)]);
    let state = g.state(&p, "comments").unwrap();
    assert!(
        state.has_dematerialized_inverse,
        "the surviving side records that a referenced resource vanished"
    );
    assert!(!g.has_edge(&comment(1), "post"));
}

#[test]
fn unload_scrubs_to_one_references() {
    let mut g = graph();
    let p = post(1);
    g.push(replace_one(&p, "author", Some(user(1)))).unwrap();

    g.unload(&user(1));

    assert_eq!(local_one(&mut g, &p, "author"), None);
    assert!(g.state(&p, "author").unwrap().has_dematerialized_inverse);
}

#[test]
fn unload_uses_implicit_edges_for_one_sided_relationships() {
    let mut g = graph();
    g.push(replace_many(&post(1), "tags", vec![tag(1), tag(2)])).unwrap();
    g.push(replace_many(&post(2), "tags", vec![tag(1)])).unwrap();

    // The tag never declares an inverse; the synthesized back-reference
    // still lets teardown find both posts.
    g.unload(&tag(1));

    assert_eq!(remote_many(&mut g, &post(1), "tags"), vec![tag(2)]);
    assert!(remote_many(&mut g, &post(2), "tags").is_empty());
    assert!(g.state(&post(1), "tags").unwrap().has_dematerialized_inverse);
}

#[test]
fn unloading_the_owner_cleans_the_implicit_side() {
    let mut g = graph();
    g.push(replace_many(&post(1), "tags", vec![tag(1)])).unwrap();

    let implicit_field = implicit_field_name("post", "tags");
    let implicit = g.edge_for(&tag(1), &implicit_field).unwrap();
    assert_eq!(
        implicit.as_implicit().unwrap().remote_members().count(),
        1,
        "back-reference tracks the owning post"
    );

    g.unload(&post(1));

    let implicit = g.edge_for(&tag(1), &implicit_field).unwrap();
    assert_eq!(implicit.as_implicit().unwrap().remote_members().count(), 0);
}

#[test]
fn unload_scrubs_pending_local_additions() {
    let mut g = graph();
    let p = post(1);
    g.update(LocalMutation::AddToRelatedRecords {
        record: p.clone(),
        field: "comments".into(),
        value: RelationshipValue::Many(vec![comment(9)]),
        index: None,
    })
    .unwrap();
    assert_eq!(local_many(&mut g, &p, "comments"), vec![comment(9)]);

    g.unload(&comment(9));

    assert!(local_many(&mut g, &p, "comments").is_empty());
    assert!(!g.is_dirty(&p, "comments"), "the dangling addition is gone");
}

#[test]
fn unload_of_an_unknown_key_is_a_no_op() {
    let mut g = graph();
    g.push(replace_many(&post(1), "comments", vec![comment(1)])).unwrap();
    g.drain_notifications();

    g.unload(&comment(42));

    assert!(g.drain_notifications().is_empty());
    assert_eq!(remote_many(&mut g, &post(1), "comments"), vec![comment(1)]);
}
