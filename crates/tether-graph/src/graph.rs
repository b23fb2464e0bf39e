// SPDX-License-Identifier: Apache-2.0
// © Tether Project Developers <https://github.com/tether-data/tether>
//! The relationship graph registry and its mutation/push/teardown API.
//!
//! One graph exists per store instance. It maps `(resource key, field)` to
//! edge state, constructs edges (and their inverse definitions) lazily on
//! first touch, and keeps both sides of every bidirectional relationship
//! consistent: any operation that changes one side applies the symmetric
//! update to the other, so callers never push twice.
//!
//! # Concurrency contract
//!
//! The graph is single-threaded cooperative: operations run synchronously
//! to completion and are serialized by the caller's event loop. The
//! `transaction_ref` counter orders local edits against remote pushes:
//! every applied write stamps the touched edges from a monotonic counter,
//! and a push carrying `observed_ref` (the stamp captured when its request
//! was issued) that is older than an edge's current stamp keeps that edge's
//! unsatisfied local overrides instead of clobbering them. Last write by
//! `transaction_ref` order wins.

use std::collections::BTreeMap;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;
use tether_schema::SchemaProvider;

use crate::collection_edge::MembershipDelta;
use crate::definition::{DefinitionCache, DefinitionError, EdgeDefinition};
use crate::edge::Edge;
use crate::ident::ResourceKey;
use crate::notify::{ChangedRelationship, NotificationBatch};
use crate::ops::{LocalMutation, RelationshipValue, RemoteOp};
use crate::payload::{RelationshipData, RelationshipPayload, View};
use crate::state::RelationshipState;

type EdgeMap = FxHashMap<ResourceKey, BTreeMap<String, Edge>>;

/// Which side of an edge an inverse update writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Plane {
    Remote,
    Local,
}

/// Inverse repairs owed after a rollback.
enum RollbackUndo {
    One {
        discarded: Option<ResourceKey>,
        restored: Option<ResourceKey>,
    },
    Many {
        added: Vec<ResourceKey>,
        removed: Vec<ResourceKey>,
    },
}

/// Errors surfaced by graph operations.
///
/// Configuration errors come from definition resolution and are memoized
/// there; the rest indicate an operation whose shape cannot apply to the
/// addressed edge. Recoverable data inconsistencies never surface here —
/// the graph corrects them in place and reports a diagnostic instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// Malformed or contradictory schema for the addressed field.
    #[error(transparent)]
    Definition(#[from] DefinitionError),
    /// Operation shape (to-one vs. to-many) does not match the edge.
    #[error("operation shape does not match `{field}` (expected {expected})")]
    CardinalityMismatch {
        /// Addressed field.
        field: String,
        /// Shape the edge requires.
        expected: &'static str,
    },
    /// The field names a synthesized back-reference, which is not
    /// addressable by callers.
    #[error("`{field}` is an internal back-reference and cannot be addressed directly")]
    ImplicitField {
        /// Addressed field.
        field: String,
    },
    /// Internal invariant violated (graph state corruption).
    #[error("internal invariant violated: {0}")]
    Internal(&'static str),
}

/// The relationship graph.
///
/// Generic over the schema collaborator; resource keys arrive from the
/// identity collaborator inside operation payloads and are never minted
/// here.
#[derive(Debug)]
pub struct Graph<S: SchemaProvider> {
    schema: S,
    definitions: DefinitionCache,
    edges: EdgeMap,
    tx_counter: u64,
    notifications: NotificationBatch,
}

impl<S: SchemaProvider> Graph<S> {
    /// Creates an empty graph over `schema`.
    #[must_use]
    pub fn new(schema: S) -> Self {
        Self {
            schema,
            definitions: DefinitionCache::new(),
            edges: EdgeMap::default(),
            tx_counter: 0,
            notifications: NotificationBatch::default(),
        }
    }

    /// The schema collaborator.
    #[must_use]
    pub fn schema(&self) -> &S {
        &self.schema
    }

    /// Returns the edge for `(key, field)`, constructing it (fully
    /// initialized) on first touch.
    ///
    /// # Errors
    /// Propagates definition resolution failures for the pair.
    pub fn edge_for(&mut self, key: &ResourceKey, field: &str) -> Result<&Edge, GraphError> {
        self.ensure_edge(key, field)?;
        self.edges
            .get(key)
            .and_then(|fields| fields.get(field))
            .ok_or(GraphError::Internal("edge missing after construction"))
    }

    /// Whether an edge for `(key, field)` has been materialized.
    #[must_use]
    pub fn has_edge(&self, key: &ResourceKey, field: &str) -> bool {
        self.edges
            .get(key)
            .is_some_and(|fields| fields.contains_key(field))
    }

    /// Knowledge/staleness flags for `(key, field)`, materializing the edge.
    ///
    /// # Errors
    /// Fails for implicit fields, which carry no state.
    pub fn state(&mut self, key: &ResourceKey, field: &str) -> Result<RelationshipState, GraphError> {
        self.ensure_edge(key, field)?;
        let edge = edge_slot(&mut self.edges, key, field)
            .ok_or(GraphError::Internal("edge missing after construction"))?;
        edge.state().copied().ok_or_else(|| GraphError::ImplicitField {
            field: field.to_owned(),
        })
    }

    /// Whether `(key, field)` carries an unsaved local override. Does not
    /// materialize the edge.
    #[must_use]
    pub fn is_dirty(&self, key: &ResourceKey, field: &str) -> bool {
        self.edges
            .get(key)
            .and_then(|fields| fields.get(field))
            .is_some_and(Edge::is_dirty)
    }

    /// Names of the fields on `key` with unsaved local overrides.
    #[must_use]
    pub fn local_changes(&self, key: &ResourceKey) -> Vec<String> {
        self.edges.get(key).map_or_else(Vec::new, |fields| {
            fields
                .iter()
                .filter(|(_, edge)| edge.is_dirty())
                .map(|(field, _)| field.clone())
                .collect()
        })
    }

    /// Takes the batched change signals accumulated since the last drain.
    pub fn drain_notifications(&mut self) -> Vec<ChangedRelationship> {
        self.notifications.drain()
    }

    // ── Read accessor ───────────────────────────────────────────────

    /// The JSON:API-shaped `{ data, meta, links }` payload for
    /// `(key, field)`, computed from the requested view. Marks the edge
    /// accessed.
    ///
    /// # Errors
    /// Fails for implicit fields and on definition resolution failure.
    pub fn relationship_payload(
        &mut self,
        key: &ResourceKey,
        field: &str,
        view: View,
    ) -> Result<RelationshipPayload, GraphError> {
        self.ensure_edge(key, field)?;
        let edge = edge_slot(&mut self.edges, key, field)
            .ok_or(GraphError::Internal("edge missing after construction"))?;
        match edge {
            Edge::BelongsTo(e) => {
                e.mark_accessed();
                let data = e.state().has_received_data.then(|| {
                    RelationshipData::One(match view {
                        View::Remote => e.remote_state().cloned(),
                        View::Local => e.local_state().cloned(),
                    })
                });
                Ok(RelationshipPayload {
                    data,
                    meta: e.meta().cloned(),
                    links: e.links().cloned(),
                })
            }
            Edge::HasMany(e) => {
                e.mark_accessed();
                let data = e.state().has_received_data.then(|| {
                    RelationshipData::Many(match view {
                        View::Remote => e.remote_state().to_vec(),
                        View::Local => e.effective_state().to_vec(),
                    })
                });
                Ok(RelationshipPayload {
                    data,
                    meta: e.meta().cloned(),
                    links: e.links().cloned(),
                })
            }
            Edge::Implicit(_) => Err(GraphError::ImplicitField {
                field: field.to_owned(),
            }),
        }
    }

    // ── Remote operations ───────────────────────────────────────────

    /// Applies a remote operation.
    ///
    /// Remote operations write remote state only and trigger the symmetric
    /// update on the inverse side. See the module docs for how
    /// `observed_ref` orders a push against concurrent local edits.
    ///
    /// # Errors
    /// Fails on definition resolution failure or an operation shape that
    /// cannot apply to the addressed edge.
    pub fn push(&mut self, op: RemoteOp) -> Result<(), GraphError> {
        match op {
            RemoteOp::Add {
                record,
                field,
                value,
                index,
            } => self.push_add(&record, &field, &value, index),
            RemoteOp::Remove { record, field, value } => self.push_remove(&record, &field, &value),
            RemoteOp::Update {
                record,
                field,
                value,
                index,
                meta,
                links,
                observed_ref,
            } => match value {
                RelationshipValue::One(key) => {
                    if index.is_some() {
                        return Err(GraphError::CardinalityMismatch {
                            field,
                            expected: "to-many for a positional splice",
                        });
                    }
                    self.push_replace_one(&record, &field, key, meta, links, observed_ref)
                }
                RelationshipValue::Many(keys) => {
                    self.push_replace_many(&record, &field, keys, index, meta, links, observed_ref)
                }
            },
            RemoteOp::MergeIdentifiers { record, value } => {
                self.merge_identifiers(&record, &value);
                Ok(())
            }
        }
    }

    /// Records a failed load attempt for `(key, field)`. Sticky until a
    /// successful push clears it; prior content is left untouched.
    ///
    /// # Errors
    /// Fails for implicit fields and on definition resolution failure.
    pub fn push_load_failure(&mut self, key: &ResourceKey, field: &str) -> Result<(), GraphError> {
        self.ensure_edge(key, field)?;
        let edge = edge_slot(&mut self.edges, key, field)
            .ok_or(GraphError::Internal("edge missing after construction"))?;
        let Some(state) = edge.state_mut() else {
            return Err(GraphError::ImplicitField {
                field: field.to_owned(),
            });
        };
        state.on_load_failure();
        self.notifications.signal(key, field);
        Ok(())
    }

    /// Marks `(key, field)` request-worthy for the upstream request layer.
    ///
    /// # Errors
    /// Fails for implicit fields and on definition resolution failure.
    pub fn mark_stale(
        &mut self,
        key: &ResourceKey,
        field: &str,
        force: bool,
    ) -> Result<(), GraphError> {
        self.ensure_edge(key, field)?;
        let edge = edge_slot(&mut self.edges, key, field)
            .ok_or(GraphError::Internal("edge missing after construction"))?;
        let Some(state) = edge.state_mut() else {
            return Err(GraphError::ImplicitField {
                field: field.to_owned(),
            });
        };
        state.mark_stale(force);
        self.notifications.signal(key, field);
        Ok(())
    }

    fn push_add(
        &mut self,
        record: &ResourceKey,
        field: &str,
        value: &RelationshipValue,
        index: Option<usize>,
    ) -> Result<(), GraphError> {
        self.ensure_edge(record, field)?;
        let tref = self.next_ref();
        let (def, applied) = {
            let edge = edge_slot(&mut self.edges, record, field)
                .ok_or(GraphError::Internal("edge missing after construction"))?;
            let Edge::HasMany(e) = edge else {
                return Err(GraphError::CardinalityMismatch {
                    field: field.to_owned(),
                    expected: "to-many",
                });
            };
            let mut applied = Vec::new();
            let mut at = index;
            for key in value.keys() {
                if e.push_add(key.clone(), at) {
                    applied.push(key.clone());
                }
                if let Some(i) = at.as_mut() {
                    *i += 1;
                }
            }
            e.stamp(tref);
            (e.definition().clone(), applied)
        };
        for key in &applied {
            self.inverse_attach(&def, key, record, Plane::Remote)?;
        }
        if !applied.is_empty() {
            self.notifications.signal(record, field);
        }
        Ok(())
    }

    fn push_remove(
        &mut self,
        record: &ResourceKey,
        field: &str,
        value: &RelationshipValue,
    ) -> Result<(), GraphError> {
        self.ensure_edge(record, field)?;
        let tref = self.next_ref();
        let (def, applied) = {
            let edge = edge_slot(&mut self.edges, record, field)
                .ok_or(GraphError::Internal("edge missing after construction"))?;
            let Edge::HasMany(e) = edge else {
                return Err(GraphError::CardinalityMismatch {
                    field: field.to_owned(),
                    expected: "to-many",
                });
            };
            let mut applied = Vec::new();
            for key in value.keys() {
                if e.push_remove(key) {
                    applied.push(key.clone());
                }
            }
            e.stamp(tref);
            (e.definition().clone(), applied)
        };
        for key in &applied {
            self.inverse_detach(&def, key, record, Plane::Remote)?;
        }
        if !applied.is_empty() {
            self.notifications.signal(record, field);
        }
        Ok(())
    }

    fn push_replace_one(
        &mut self,
        record: &ResourceKey,
        field: &str,
        value: Option<ResourceKey>,
        meta: Option<serde_json::Value>,
        links: Option<serde_json::Value>,
        observed_ref: Option<u64>,
    ) -> Result<(), GraphError> {
        self.ensure_edge(record, field)?;
        let tref = self.next_ref();
        let (def, prev, discarded, changed) = {
            let edge = edge_slot(&mut self.edges, record, field)
                .ok_or(GraphError::Internal("edge missing after construction"))?;
            let Edge::BelongsTo(e) = edge else {
                return Err(GraphError::CardinalityMismatch {
                    field: field.to_owned(),
                    expected: "to-one",
                });
            };
            let keep_newer_local = observed_ref.is_some_and(|seen| seen < e.transaction_ref());
            let prev = e.remote_state().cloned();
            let discarded = e.push_replace(value.clone(), keep_newer_local);
            let changed = prev != value || discarded.is_some();
            e.set_side_channels(meta, links);
            e.stamp(tref);
            (e.definition().clone(), prev, discarded, changed)
        };
        if prev != value {
            if let Some(prev_key) = &prev {
                self.inverse_detach(&def, prev_key, record, Plane::Remote)?;
            }
            if let Some(next) = &value {
                self.inverse_attach(&def, next, record, Plane::Remote)?;
            }
        }
        if let Some(discarded_local) = discarded {
            // The override's inverse local attachments must be undone, and
            // the restored value's reasserted.
            if let Some(dropped) = &discarded_local {
                self.inverse_detach(&def, dropped, record, Plane::Local)?;
            }
            if let Some(restored) = &value {
                self.inverse_attach(&def, restored, record, Plane::Local)?;
            }
        }
        if changed {
            self.notifications.signal(record, field);
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn push_replace_many(
        &mut self,
        record: &ResourceKey,
        field: &str,
        values: Vec<ResourceKey>,
        index: Option<usize>,
        meta: Option<serde_json::Value>,
        links: Option<serde_json::Value>,
        observed_ref: Option<u64>,
    ) -> Result<(), GraphError> {
        self.ensure_edge(record, field)?;
        let tref = self.next_ref();
        let (def, delta) = {
            let edge = edge_slot(&mut self.edges, record, field)
                .ok_or(GraphError::Internal("edge missing after construction"))?;
            let Edge::HasMany(e) = edge else {
                return Err(GraphError::CardinalityMismatch {
                    field: field.to_owned(),
                    expected: "to-many",
                });
            };
            let keep_newer_local = observed_ref.is_some_and(|seen| seen < e.transaction_ref());
            let delta = match index {
                Some(at) => e.push_splice(values, at, keep_newer_local),
                None => e.push_replace(values, keep_newer_local),
            };
            e.set_side_channels(meta, links);
            e.stamp(tref);
            (e.definition().clone(), delta)
        };
        self.apply_delta(&def, record, &delta, Plane::Remote)?;
        for dropped in &delta.discarded_adds {
            self.inverse_detach(&def, dropped, record, Plane::Local)?;
        }
        for restored in &delta.discarded_removals {
            self.inverse_attach(&def, restored, record, Plane::Local)?;
        }
        if delta.changed {
            self.notifications.signal(record, field);
        }
        Ok(())
    }

    // ── Local mutations ─────────────────────────────────────────────

    /// Applies a local mutation.
    ///
    /// Mutations write local overrides only, stamp the touched edges from
    /// the transaction counter, and trigger the symmetric local update on
    /// the inverse side.
    ///
    /// # Errors
    /// Fails on definition resolution failure or a mutation shape that
    /// cannot apply to the addressed edge.
    pub fn update(&mut self, mutation: LocalMutation) -> Result<(), GraphError> {
        match mutation {
            LocalMutation::ReplaceRelatedRecord {
                record,
                field,
                value,
                prior,
            } => self.update_replace_one(&record, &field, value, prior),
            LocalMutation::ReplaceRelatedRecords {
                record,
                field,
                value,
                prior,
                index,
            } => self.update_replace_many(&record, &field, value, prior, index),
            LocalMutation::AddToRelatedRecords {
                record,
                field,
                value,
                index,
            } => self.update_add(&record, &field, &value, index),
            LocalMutation::RemoveFromRelatedRecords {
                record,
                field,
                value,
                index: _,
            } => self.update_remove(&record, &field, &value),
            LocalMutation::SortRelatedRecords { record, field, value } => {
                self.update_sort(&record, &field, value)
            }
        }
    }

    /// Discards the local override on `(key, field)`, restoring the remote
    /// view, and repairs the inverse side's local planes.
    ///
    /// # Errors
    /// Fails on definition resolution failure for the pair.
    pub fn rollback_local(&mut self, key: &ResourceKey, field: &str) -> Result<(), GraphError> {
        self.ensure_edge(key, field)?;
        let tref = self.next_ref();
        let (def, undo) = {
            let edge = edge_slot(&mut self.edges, key, field)
                .ok_or(GraphError::Internal("edge missing after construction"))?;
            let def = edge.definition().clone();
            let undo = match edge {
                Edge::BelongsTo(e) => {
                    let Some(discarded) = e.rollback_local() else {
                        return Ok(());
                    };
                    e.stamp(tref);
                    RollbackUndo::One {
                        discarded,
                        restored: e.remote_state().cloned(),
                    }
                }
                Edge::HasMany(e) => {
                    let added: Vec<ResourceKey> = e.additions().cloned().collect();
                    let removed: Vec<ResourceKey> = e.removals().cloned().collect();
                    if !e.rollback_local() {
                        return Ok(());
                    }
                    e.stamp(tref);
                    RollbackUndo::Many { added, removed }
                }
                Edge::Implicit(_) => return Ok(()),
            };
            (def, undo)
        };
        match undo {
            RollbackUndo::One { discarded, restored } => {
                if let Some(discarded) = &discarded {
                    self.inverse_detach(&def, discarded, key, Plane::Local)?;
                }
                if let Some(restored) = &restored {
                    self.inverse_attach(&def, restored, key, Plane::Local)?;
                }
            }
            RollbackUndo::Many { added, removed } => {
                for key_added in &added {
                    self.inverse_detach(&def, key_added, key, Plane::Local)?;
                }
                for key_removed in &removed {
                    self.inverse_attach(&def, key_removed, key, Plane::Local)?;
                }
            }
        }
        self.notifications.signal(key, field);
        Ok(())
    }

    /// Discards every local override on `key`.
    pub fn rollback_all(&mut self, key: &ResourceKey) {
        let dirty: Vec<String> = self.local_changes(key);
        for field in dirty {
            if let Err(err) = self.rollback_local(key, &field) {
                tracing::warn!(key = %key, field, error = %err, "rollback skipped a field");
            }
        }
    }

    fn update_replace_one(
        &mut self,
        record: &ResourceKey,
        field: &str,
        value: Option<ResourceKey>,
        prior: Option<ResourceKey>,
    ) -> Result<(), GraphError> {
        self.ensure_edge(record, field)?;
        let tref = self.next_ref();
        let (def, previous, changed) = {
            let edge = edge_slot(&mut self.edges, record, field)
                .ok_or(GraphError::Internal("edge missing after construction"))?;
            let Edge::BelongsTo(e) = edge else {
                return Err(GraphError::CardinalityMismatch {
                    field: field.to_owned(),
                    expected: "to-one",
                });
            };
            if let Some(prior) = &prior {
                if e.local_state() != Some(prior) {
                    tracing::warn!(
                        record = %record,
                        field,
                        "replaceRelatedRecord prior did not match the current value"
                    );
                }
            }
            let changed = e.local_state() != value.as_ref();
            let previous = e.replace_local(value.clone());
            e.stamp(tref);
            (e.definition().clone(), previous, changed)
        };
        if changed {
            if let Some(previous) = &previous {
                self.inverse_detach(&def, previous, record, Plane::Local)?;
            }
            if let Some(next) = &value {
                self.inverse_attach(&def, next, record, Plane::Local)?;
            }
            self.notifications.signal(record, field);
        }
        Ok(())
    }

    fn update_replace_many(
        &mut self,
        record: &ResourceKey,
        field: &str,
        values: Vec<ResourceKey>,
        prior: Option<Vec<ResourceKey>>,
        index: Option<usize>,
    ) -> Result<(), GraphError> {
        self.ensure_edge(record, field)?;
        let tref = self.next_ref();
        let (def, delta) = {
            let edge = edge_slot(&mut self.edges, record, field)
                .ok_or(GraphError::Internal("edge missing after construction"))?;
            let Edge::HasMany(e) = edge else {
                return Err(GraphError::CardinalityMismatch {
                    field: field.to_owned(),
                    expected: "to-many",
                });
            };
            if let Some(prior) = &prior {
                if e.effective_state() != prior.as_slice() {
                    tracing::warn!(
                        record = %record,
                        field,
                        "replaceRelatedRecords prior did not match the current view"
                    );
                }
            }
            // A positional replace keeps the rest of the effective view and
            // splices the named run in at `index`.
            let full = match index {
                Some(at) => {
                    let members: FxHashSet<&ResourceKey> = values.iter().collect();
                    let mut base: Vec<ResourceKey> = e
                        .effective_state()
                        .iter()
                        .filter(|k| !members.contains(*k))
                        .cloned()
                        .collect();
                    let at = at.min(base.len());
                    base.splice(at..at, values);
                    base
                }
                None => values,
            };
            let delta = e.replace_local(full);
            e.stamp(tref);
            (e.definition().clone(), delta)
        };
        self.apply_delta(&def, record, &delta, Plane::Local)?;
        if delta.changed {
            self.notifications.signal(record, field);
        }
        Ok(())
    }

    fn update_add(
        &mut self,
        record: &ResourceKey,
        field: &str,
        value: &RelationshipValue,
        index: Option<usize>,
    ) -> Result<(), GraphError> {
        self.ensure_edge(record, field)?;
        let tref = self.next_ref();
        let (def, applied) = {
            let edge = edge_slot(&mut self.edges, record, field)
                .ok_or(GraphError::Internal("edge missing after construction"))?;
            let Edge::HasMany(e) = edge else {
                return Err(GraphError::CardinalityMismatch {
                    field: field.to_owned(),
                    expected: "to-many",
                });
            };
            let mut applied = Vec::new();
            let mut at = index;
            for key in value.keys() {
                if e.add_local(key.clone(), at) {
                    applied.push(key.clone());
                }
                if let Some(i) = at.as_mut() {
                    *i += 1;
                }
            }
            e.stamp(tref);
            (e.definition().clone(), applied)
        };
        for key in &applied {
            self.inverse_attach(&def, key, record, Plane::Local)?;
        }
        if !applied.is_empty() {
            self.notifications.signal(record, field);
        }
        Ok(())
    }

    fn update_remove(
        &mut self,
        record: &ResourceKey,
        field: &str,
        value: &RelationshipValue,
    ) -> Result<(), GraphError> {
        self.ensure_edge(record, field)?;
        let tref = self.next_ref();
        let (def, applied) = {
            let edge = edge_slot(&mut self.edges, record, field)
                .ok_or(GraphError::Internal("edge missing after construction"))?;
            let Edge::HasMany(e) = edge else {
                return Err(GraphError::CardinalityMismatch {
                    field: field.to_owned(),
                    expected: "to-many",
                });
            };
            let mut applied = Vec::new();
            for key in value.keys() {
                if e.remove_local(key) {
                    applied.push(key.clone());
                } else {
                    tracing::warn!(
                        record = %record,
                        field,
                        removed = %key,
                        "removeFromRelatedRecords targeted a key not in the relationship"
                    );
                }
            }
            e.stamp(tref);
            (e.definition().clone(), applied)
        };
        for key in &applied {
            self.inverse_detach(&def, key, record, Plane::Local)?;
        }
        if !applied.is_empty() {
            self.notifications.signal(record, field);
        }
        Ok(())
    }

    fn update_sort(
        &mut self,
        record: &ResourceKey,
        field: &str,
        order: Vec<ResourceKey>,
    ) -> Result<(), GraphError> {
        self.ensure_edge(record, field)?;
        let tref = self.next_ref();
        let edge = edge_slot(&mut self.edges, record, field)
            .ok_or(GraphError::Internal("edge missing after construction"))?;
        let Edge::HasMany(e) = edge else {
            return Err(GraphError::CardinalityMismatch {
                field: field.to_owned(),
                expected: "to-many",
            });
        };
        e.sort_local(order);
        e.stamp(tref);
        self.notifications.signal(record, field);
        Ok(())
    }

    // ── Identity merge ──────────────────────────────────────────────

    /// Rewrites every reference to `stale` — either side, remote or local,
    /// any edge variant — to `canonical`, collapsing duplicates, then folds
    /// the stale key's own edges into the canonical key's.
    fn merge_identifiers(&mut self, stale: &ResourceKey, canonical: &ResourceKey) {
        if stale == canonical {
            return;
        }
        if stale.type_name() != canonical.type_name() {
            tracing::warn!(
                stale = %stale,
                canonical = %canonical,
                "refusing to merge identifiers of different types"
            );
            return;
        }
        tracing::debug!(stale = %stale, canonical = %canonical, "merging identifiers");
        let Some(stale_edges) = self.edges.remove(stale) else {
            return;
        };
        for (field, mut edge) in stale_edges {
            let def = edge.definition().clone();
            // Every inbound reference to the stale key lives in the inverse
            // edge of something this edge references; rewrite them all.
            for related in edge.referenced_keys() {
                let related = if related == *stale {
                    canonical.clone()
                } else {
                    related
                };
                if let Some(inverse) = edge_slot(&mut self.edges, &related, &def.inverse_field) {
                    if inverse.replace_key(stale, canonical)
                        && !inverse.definition().is_implicit()
                    {
                        self.notifications.signal(&related, &def.inverse_field);
                    }
                }
            }
            // Self-references within the moved edge.
            edge.replace_key(stale, canonical);
            let slot = self.edges.entry(canonical.clone()).or_default();
            match slot.entry(field.clone()) {
                std::collections::btree_map::Entry::Occupied(mut occupied) => {
                    occupied.get_mut().absorb(edge);
                }
                std::collections::btree_map::Entry::Vacant(vacant) => {
                    vacant.insert(edge);
                }
            }
            if !def.is_implicit() {
                self.notifications.signal(canonical, &field);
            }
        }
    }

    // ── Teardown ────────────────────────────────────────────────────

    /// Permanently removes `key` from the graph: every edge that references
    /// it (located through this key's own edges, implicit ones included) is
    /// scrubbed and marked `has_dematerialized_inverse`, then the key's own
    /// edges are discarded.
    pub fn unload(&mut self, key: &ResourceKey) {
        let Some(own_edges) = self.edges.remove(key) else {
            return;
        };
        tracing::debug!(key = %key, "unloading resource");
        for edge in own_edges.values() {
            let def = edge.definition().clone();
            for related in edge.referenced_keys() {
                if related == *key {
                    continue;
                }
                let Some(inverse) = edge_slot(&mut self.edges, &related, &def.inverse_field)
                else {
                    continue;
                };
                if inverse.remove_key(key) {
                    let accessed = inverse.accessed();
                    if let Some(state) = inverse.state_mut() {
                        state.has_dematerialized_inverse = true;
                    }
                    if !inverse.definition().is_implicit() && accessed {
                        self.notifications.signal(&related, &def.inverse_field);
                    }
                }
            }
        }
    }

    // ── Inverse maintenance ─────────────────────────────────────────

    fn apply_delta(
        &mut self,
        def: &Arc<EdgeDefinition>,
        owner: &ResourceKey,
        delta: &MembershipDelta,
        plane: Plane,
    ) -> Result<(), GraphError> {
        for departed in &delta.departed {
            self.inverse_detach(def, departed, owner, plane)?;
        }
        for joined in &delta.joined {
            self.inverse_attach(def, joined, owner, plane)?;
        }
        Ok(())
    }

    /// Makes `related`'s inverse edge reference `owner` on `plane`,
    /// displacing (and repairing) a conflicting to-one value.
    fn inverse_attach(
        &mut self,
        def: &Arc<EdgeDefinition>,
        related: &ResourceKey,
        owner: &ResourceKey,
        plane: Plane,
    ) -> Result<(), GraphError> {
        if !self.ensure_inverse_edge(def, related)? {
            return Ok(());
        }
        let inv_field = def.inverse_field.as_str();
        let Some(edge) = edge_slot(&mut self.edges, related, inv_field) else {
            return Err(GraphError::Internal("inverse edge missing after construction"));
        };
        let mut displaced = None;
        let mut changed = false;
        let mut implicit = false;
        match edge {
            Edge::BelongsTo(e) => {
                let current = match plane {
                    Plane::Remote => e.remote_state().cloned(),
                    Plane::Local => e.local_state().cloned(),
                };
                if current.as_ref() != Some(owner) {
                    match plane {
                        Plane::Remote => {
                            if let Some(conflicting) = &current {
                                // The two sides of the payload disagreed; the
                                // side performing the find is authoritative.
                                tracing::warn!(
                                    record = %related,
                                    field = inv_field,
                                    was = %conflicting,
                                    now = %owner,
                                    "corrected an inverse that did not point back"
                                );
                            }
                            let _ = e.push_replace(Some(owner.clone()), true);
                        }
                        Plane::Local => {
                            let _ = e.replace_local(Some(owner.clone()));
                        }
                    }
                    displaced = current;
                    changed = true;
                }
            }
            Edge::HasMany(e) => {
                changed = match plane {
                    Plane::Remote => e.push_add(owner.clone(), None),
                    Plane::Local => e.add_local(owner.clone(), None),
                };
            }
            Edge::Implicit(e) => {
                implicit = true;
                match plane {
                    Plane::Remote => e.add_remote(owner.clone()),
                    Plane::Local => e.add_local(owner.clone()),
                }
            }
        }
        if changed && !implicit {
            self.notifications.signal(related, inv_field);
        }
        if let Some(displaced) = displaced {
            self.detach_displaced(def, &displaced, related, plane);
        }
        Ok(())
    }

    /// Drops `owner` from `related`'s inverse edge on `plane`.
    fn inverse_detach(
        &mut self,
        def: &Arc<EdgeDefinition>,
        related: &ResourceKey,
        owner: &ResourceKey,
        plane: Plane,
    ) -> Result<(), GraphError> {
        if !self.ensure_inverse_edge(def, related)? {
            return Ok(());
        }
        let inv_field = def.inverse_field.as_str();
        let Some(edge) = edge_slot(&mut self.edges, related, inv_field) else {
            return Err(GraphError::Internal("inverse edge missing after construction"));
        };
        let mut changed = false;
        let mut implicit = false;
        match edge {
            Edge::BelongsTo(e) => match plane {
                Plane::Remote => {
                    if e.remote_state() == Some(owner) {
                        let _ = e.push_replace(None, true);
                        changed = true;
                    }
                }
                Plane::Local => {
                    if e.local_state() == Some(owner) {
                        let _ = e.replace_local(None);
                        changed = true;
                    }
                }
            },
            Edge::HasMany(e) => {
                changed = match plane {
                    Plane::Remote => e.push_remove(owner),
                    Plane::Local => e.remove_local(owner),
                };
            }
            Edge::Implicit(e) => {
                implicit = true;
                match plane {
                    Plane::Remote => e.remove_remote(owner),
                    Plane::Local => e.remove_local(owner),
                }
            }
        }
        if changed && !implicit {
            self.notifications.signal(related, inv_field);
        }
        Ok(())
    }

    /// A to-one inverse was re-pointed from `displaced` to a new owner:
    /// drop `related` from the displaced owner's original field so the two
    /// sides keep agreeing.
    fn detach_displaced(
        &mut self,
        def: &Arc<EdgeDefinition>,
        displaced: &ResourceKey,
        related: &ResourceKey,
        plane: Plane,
    ) {
        let Some(edge) = edge_slot(&mut self.edges, displaced, &def.field_name) else {
            return;
        };
        let changed = match edge {
            Edge::BelongsTo(e) => match plane {
                Plane::Remote => {
                    if e.remote_state() == Some(related) {
                        let _ = e.push_replace(None, true);
                        true
                    } else {
                        false
                    }
                }
                Plane::Local => {
                    if e.local_state() == Some(related) {
                        let _ = e.replace_local(None);
                        true
                    } else {
                        false
                    }
                }
            },
            Edge::HasMany(e) => match plane {
                Plane::Remote => e.push_remove(related),
                Plane::Local => e.remove_local(related),
            },
            Edge::Implicit(_) => false,
        };
        if changed {
            self.notifications.signal(displaced, &def.field_name);
        }
    }

    /// Materializes the inverse edge for `related`, resolving its
    /// definition. Returns `Ok(false)` — after a diagnostic — when the
    /// inverse cannot be resolved for a polymorphic or implicit
    /// relationship; the owning side stays applied either way.
    fn ensure_inverse_edge(
        &mut self,
        def: &Arc<EdgeDefinition>,
        related: &ResourceKey,
    ) -> Result<bool, GraphError> {
        if self.has_edge(related, &def.inverse_field) {
            return Ok(true);
        }
        match self
            .definitions
            .resolve(&self.schema, related.type_name(), &def.inverse_field)
        {
            Ok(inverse_def) => {
                self.edges
                    .entry(related.clone())
                    .or_default()
                    .insert(def.inverse_field.clone(), Edge::new(inverse_def));
                Ok(true)
            }
            Err(err) => {
                if def.inverse_is_implicit() || def.is_polymorphic {
                    tracing::warn!(
                        record = %related,
                        field = %def.inverse_field,
                        error = %err,
                        "skipping unresolvable inverse"
                    );
                    Ok(false)
                } else {
                    Err(err.into())
                }
            }
        }
    }

    // ── Plumbing ────────────────────────────────────────────────────

    fn next_ref(&mut self) -> u64 {
        self.tx_counter += 1;
        self.tx_counter
    }

    fn ensure_edge(&mut self, key: &ResourceKey, field: &str) -> Result<(), GraphError> {
        if self.has_edge(key, field) {
            return Ok(());
        }
        let definition = self
            .definitions
            .resolve(&self.schema, key.type_name(), field)?;
        self.edges
            .entry(key.clone())
            .or_default()
            .insert(field.to_owned(), Edge::new(definition));
        Ok(())
    }
}

fn edge_slot<'a>(edges: &'a mut EdgeMap, key: &ResourceKey, field: &str) -> Option<&'a mut Edge> {
    edges.get_mut(key).and_then(|fields| fields.get_mut(field))
}
