// SPDX-License-Identifier: Apache-2.0
// © Tether Project Developers <https://github.com/tether-data/tether>
//! To-many edge state and the local-state diff computation.

use std::sync::Arc;

use rustc_hash::FxHashSet;

use crate::definition::EdgeDefinition;
use crate::ident::ResourceKey;
use crate::state::RelationshipState;

/// A locally enqueued addition, with the position recorded at mutation time.
#[derive(Debug, Clone)]
struct PendingAdd {
    key: ResourceKey,
    index: Option<usize>,
}

/// Relationship state for one to-many field on one resource.
///
/// `remote_state` is the authoritative server order; `remote_members` is its
/// O(1) membership mirror, maintained in lock step. Local edits live in
/// `pending_adds`/`removals` (disjoint by construction: re-adding a removed
/// key cancels the removal and vice versa) plus an optional local ordering
/// override. The effective view is computed per the diff rule — remote order
/// with removals excised and additions appended or spliced at their recorded
/// index — and cached until the next mutation of either side.
#[derive(Debug)]
pub struct CollectionEdge {
    definition: Arc<EdgeDefinition>,
    remote_state: Vec<ResourceKey>,
    remote_members: FxHashSet<ResourceKey>,
    pending_adds: Vec<PendingAdd>,
    addition_members: FxHashSet<ResourceKey>,
    removals: FxHashSet<ResourceKey>,
    local_order: Option<Vec<ResourceKey>>,
    meta: Option<serde_json::Value>,
    links: Option<serde_json::Value>,
    transaction_ref: u64,
    accessed: bool,
    state: RelationshipState,
    cached_diff: Option<Vec<ResourceKey>>,
}

/// Membership deltas produced by a replace, used for symmetric inverse
/// maintenance. `discarded_*` name the unsatisfied local edits an
/// authoritative push dropped; their inverse local planes need repair.
#[derive(Debug, Default)]
pub(crate) struct MembershipDelta {
    pub(crate) joined: Vec<ResourceKey>,
    pub(crate) departed: Vec<ResourceKey>,
    pub(crate) discarded_adds: Vec<ResourceKey>,
    pub(crate) discarded_removals: Vec<ResourceKey>,
    /// Whether the observable edge content changed at all (membership,
    /// order, or a dropped override). Gates notification.
    pub(crate) changed: bool,
}

impl CollectionEdge {
    pub(crate) fn new(definition: Arc<EdgeDefinition>) -> Self {
        Self {
            definition,
            remote_state: Vec::new(),
            remote_members: FxHashSet::default(),
            pending_adds: Vec::new(),
            addition_members: FxHashSet::default(),
            removals: FxHashSet::default(),
            local_order: None,
            meta: None,
            links: None,
            transaction_ref: 0,
            accessed: false,
            state: RelationshipState::default(),
            cached_diff: None,
        }
    }

    /// Shared definition for this field.
    #[must_use]
    pub fn definition(&self) -> &Arc<EdgeDefinition> {
        &self.definition
    }

    /// Last server-confirmed membership, in server order.
    #[must_use]
    pub fn remote_state(&self) -> &[ResourceKey] {
        &self.remote_state
    }

    /// Whether `key` is remotely present.
    #[must_use]
    pub fn remote_contains(&self, key: &ResourceKey) -> bool {
        self.remote_members.contains(key)
    }

    /// Locally enqueued additions, in insertion order.
    pub fn additions(&self) -> impl Iterator<Item = &ResourceKey> {
        self.pending_adds.iter().map(|a| &a.key)
    }

    /// Locally enqueued removals (unordered).
    pub fn removals(&self) -> impl Iterator<Item = &ResourceKey> {
        self.removals.iter()
    }

    /// Whether unsaved local edits exist.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !self.pending_adds.is_empty() || !self.removals.is_empty() || self.local_order.is_some()
    }

    /// Knowledge/staleness flags.
    #[must_use]
    pub fn state(&self) -> &RelationshipState {
        &self.state
    }

    pub(crate) fn state_mut(&mut self) -> &mut RelationshipState {
        &mut self.state
    }

    /// Server-provided metadata.
    #[must_use]
    pub fn meta(&self) -> Option<&serde_json::Value> {
        self.meta.as_ref()
    }

    /// Server-provided links.
    #[must_use]
    pub fn links(&self) -> Option<&serde_json::Value> {
        self.links.as_ref()
    }

    /// Monotonic write stamp; see the graph's concurrency contract.
    #[must_use]
    pub fn transaction_ref(&self) -> u64 {
        self.transaction_ref
    }

    pub(crate) fn stamp(&mut self, transaction_ref: u64) {
        self.transaction_ref = transaction_ref;
    }

    /// Whether the application has read this edge.
    #[must_use]
    pub fn accessed(&self) -> bool {
        self.accessed
    }

    pub(crate) fn mark_accessed(&mut self) {
        self.accessed = true;
    }

    pub(crate) fn set_side_channels(
        &mut self,
        meta: Option<serde_json::Value>,
        links: Option<serde_json::Value>,
    ) {
        if meta.is_some() {
            self.meta = meta;
        }
        if links.is_some() {
            self.links = links;
        }
    }

    /// The effective ordered membership (the diff), cached.
    ///
    /// Recomputed only after a mutation of either side; repeated calls in
    /// between return the cached list. O(remote + additions + removals).
    pub fn effective_state(&mut self) -> &[ResourceKey] {
        if self.cached_diff.is_none() {
            self.cached_diff = Some(self.compute_diff());
        }
        self.cached_diff.as_deref().unwrap_or(&[])
    }

    fn compute_diff(&self) -> Vec<ResourceKey> {
        let mut out = Vec::with_capacity(self.remote_state.len() + self.pending_adds.len());
        for key in &self.remote_state {
            if !self.removals.contains(key) {
                out.push(key.clone());
            }
        }
        for add in &self.pending_adds {
            // A pending add that remote state has since confirmed is already
            // present in the base list.
            if self.remote_members.contains(&add.key) && !self.removals.contains(&add.key) {
                continue;
            }
            match add.index {
                Some(index) => out.insert(index.min(out.len()), add.key.clone()),
                None => out.push(add.key.clone()),
            }
        }
        if let Some(order) = &self.local_order {
            out = apply_order(out, order);
        }
        out
    }

    fn invalidate(&mut self) {
        self.cached_diff = None;
    }

    fn refresh_emptiness(&mut self) {
        let surviving_remote = self.remote_state.iter().any(|k| !self.removals.contains(k));
        self.state.is_empty = !surviving_remote && self.pending_adds.is_empty();
    }

    // ── Remote side ─────────────────────────────────────────────────

    /// Replaces the remote membership wholesale. Returns the membership
    /// delta relative to the previous remote state for inverse maintenance.
    ///
    /// Satisfied local edits are pruned (an addition now remotely present, a
    /// removal now remotely absent). Unsatisfied edits survive only with
    /// `keep_newer_local`; otherwise the push is the newer write and wins.
    pub(crate) fn push_replace(
        &mut self,
        values: Vec<ResourceKey>,
        keep_newer_local: bool,
    ) -> MembershipDelta {
        let mut next_members = FxHashSet::default();
        let mut next_state = Vec::with_capacity(values.len());
        for key in values {
            if next_members.insert(key.clone()) {
                next_state.push(key);
            }
        }

        let mut delta = MembershipDelta {
            joined: next_state
                .iter()
                .filter(|k| !self.remote_members.contains(*k))
                .cloned()
                .collect(),
            departed: self
                .remote_state
                .iter()
                .filter(|k| !next_members.contains(*k))
                .cloned()
                .collect(),
            ..MembershipDelta::default()
        };
        delta.changed = self.remote_state != next_state;

        self.remote_state = next_state;
        self.remote_members = next_members;
        self.reconcile_local(keep_newer_local, &mut delta);
        self.invalidate();
        self.refresh_emptiness();
        let empty = self.state.is_empty;
        self.state.on_remote_data(empty);
        delta
    }

    /// Splices `values` into the remote order at `index` without touching
    /// the rest: each key is removed from its old position (if any) and the
    /// run is inserted at `index`.
    pub(crate) fn push_splice(
        &mut self,
        values: Vec<ResourceKey>,
        index: usize,
        keep_newer_local: bool,
    ) -> MembershipDelta {
        let mut delta = MembershipDelta::default();
        let run: Vec<ResourceKey> = {
            let mut seen = FxHashSet::default();
            values
                .into_iter()
                .filter(|k| seen.insert(k.clone()))
                .collect()
        };
        for key in &run {
            if self.remote_members.insert(key.clone()) {
                delta.joined.push(key.clone());
            }
        }
        let before = self.remote_state.clone();
        let moved: FxHashSet<&ResourceKey> = run.iter().collect();
        self.remote_state.retain(|k| !moved.contains(k));
        let at = index.min(self.remote_state.len());
        self.remote_state.splice(at..at, run);
        delta.changed = self.remote_state != before;
        self.reconcile_local(keep_newer_local, &mut delta);
        self.invalidate();
        self.refresh_emptiness();
        let empty = self.state.is_empty;
        self.state.on_remote_data(empty);
        delta
    }

    /// Adds one key remotely. Returns `true` when membership changed.
    pub(crate) fn push_add(&mut self, key: ResourceKey, index: Option<usize>) -> bool {
        if !self.remote_members.insert(key.clone()) {
            return false;
        }
        // The server confirmed a pending local addition.
        if self.addition_members.remove(&key) {
            self.pending_adds.retain(|a| a.key != key);
        }
        match index {
            Some(index) => self.remote_state.insert(index.min(self.remote_state.len()), key),
            None => self.remote_state.push(key),
        }
        self.invalidate();
        self.refresh_emptiness();
        self.state.has_received_data = true;
        true
    }

    /// Removes one key remotely. Returns `true` when membership changed.
    pub(crate) fn push_remove(&mut self, key: &ResourceKey) -> bool {
        if !self.remote_members.remove(key) {
            return false;
        }
        self.remote_state.retain(|k| k != key);
        // The server confirmed a pending local removal.
        self.removals.remove(key);
        self.invalidate();
        self.refresh_emptiness();
        self.state.has_received_data = true;
        true
    }

    fn reconcile_local(&mut self, keep_newer_local: bool, delta: &mut MembershipDelta) {
        // Satisfied edits are always pruned: an addition the server now
        // lists, a removal it no longer does. They need no inverse repair —
        // the remote delta already covers them.
        let members = &self.remote_members;
        let addition_members = &mut self.addition_members;
        self.pending_adds.retain(|a| {
            if members.contains(&a.key) {
                addition_members.remove(&a.key);
                false
            } else {
                true
            }
        });
        self.removals.retain(|k| members.contains(k));

        if !keep_newer_local {
            // The push is the newer write: unsatisfied edits are discarded,
            // and the caller must undo their inverse local attachments.
            delta.discarded_adds = self.pending_adds.drain(..).map(|a| a.key).collect();
            self.addition_members.clear();
            delta.discarded_removals = self.removals.drain().collect();
            self.local_order = None;
            delta.changed |=
                !delta.discarded_adds.is_empty() || !delta.discarded_removals.is_empty();
        }
    }

    // ── Local side ──────────────────────────────────────────────────

    /// Enqueues a local addition. Returns `true` when the effective view
    /// changed (no-op for keys already effectively present).
    pub(crate) fn add_local(&mut self, key: ResourceKey, index: Option<usize>) -> bool {
        if self.removals.remove(&key) {
            // Re-adding a removed key cancels the removal.
            self.invalidate();
            self.refresh_emptiness();
            self.state.on_local_data(self.state.is_empty);
            return true;
        }
        if self.remote_members.contains(&key) || !self.addition_members.insert(key.clone()) {
            return false;
        }
        self.pending_adds.push(PendingAdd { key, index });
        self.invalidate();
        self.refresh_emptiness();
        self.state.on_local_data(self.state.is_empty);
        true
    }

    /// Enqueues a local removal. Returns `true` when the effective view
    /// changed. A key may only be enqueued for removal while remotely
    /// present; removing a pending addition just cancels it.
    pub(crate) fn remove_local(&mut self, key: &ResourceKey) -> bool {
        if self.addition_members.remove(key) {
            self.pending_adds.retain(|a| &a.key != key);
            self.invalidate();
            self.refresh_emptiness();
            return true;
        }
        if self.remote_members.contains(key) && self.removals.insert(key.clone()) {
            self.invalidate();
            self.refresh_emptiness();
            return true;
        }
        false
    }

    /// Replaces the effective membership and order locally. Returns the
    /// delta relative to the previous effective view.
    pub(crate) fn replace_local(&mut self, values: Vec<ResourceKey>) -> MembershipDelta {
        let prev_diff = self.compute_diff();
        let previous: FxHashSet<ResourceKey> = prev_diff.iter().cloned().collect();

        let mut next = Vec::with_capacity(values.len());
        let mut next_members = FxHashSet::default();
        for key in values {
            if next_members.insert(key.clone()) {
                next.push(key);
            }
        }

        let mut delta = MembershipDelta {
            joined: next
                .iter()
                .filter(|k| !previous.contains(*k))
                .cloned()
                .collect(),
            departed: previous
                .iter()
                .filter(|k| !next_members.contains(*k))
                .cloned()
                .collect(),
            ..MembershipDelta::default()
        };
        delta.changed = prev_diff != next;

        self.removals = self
            .remote_members
            .iter()
            .filter(|k| !next_members.contains(*k))
            .cloned()
            .collect();
        self.addition_members = next_members
            .iter()
            .filter(|k| !self.remote_members.contains(*k))
            .cloned()
            .collect();
        self.pending_adds = next
            .iter()
            .filter(|k| self.addition_members.contains(*k))
            .map(|k| PendingAdd {
                key: k.clone(),
                index: None,
            })
            .collect();
        // Replacing with exactly the remote content leaves the edge clean.
        if self.removals.is_empty() && self.pending_adds.is_empty() && next == self.remote_state {
            self.local_order = None;
        } else {
            self.local_order = Some(next);
        }
        self.invalidate();
        self.refresh_emptiness();
        self.state.on_local_data(self.state.is_empty);
        delta
    }

    /// Reorders the effective view without changing membership.
    pub(crate) fn sort_local(&mut self, order: Vec<ResourceKey>) {
        self.local_order = Some(order);
        self.invalidate();
    }

    /// Discards all local edits. Returns `true` when any existed.
    pub(crate) fn rollback_local(&mut self) -> bool {
        if !self.is_dirty() {
            return false;
        }
        self.pending_adds.clear();
        self.addition_members.clear();
        self.removals.clear();
        self.local_order = None;
        self.invalidate();
        self.refresh_emptiness();
        true
    }

    // ── Sweeps ──────────────────────────────────────────────────────

    /// Scrubs `key` from every plane (teardown). Returns `true` when the
    /// edge referenced it.
    pub(crate) fn remove_key(&mut self, key: &ResourceKey) -> bool {
        let mut hit = false;
        if self.remote_members.remove(key) {
            self.remote_state.retain(|k| k != key);
            hit = true;
        }
        if self.addition_members.remove(key) {
            self.pending_adds.retain(|a| &a.key != key);
            hit = true;
        }
        hit |= self.removals.remove(key);
        if let Some(order) = &mut self.local_order {
            let before = order.len();
            order.retain(|k| k != key);
            hit |= order.len() != before;
        }
        if hit {
            self.invalidate();
            self.refresh_emptiness();
        }
        hit
    }

    /// Rewrites `stale` → `canonical` in every plane, collapsing duplicates
    /// (a list holding both keys ends up with `canonical` exactly once, at
    /// the position of its first occurrence). Returns `true` when the edge
    /// referenced the stale key.
    pub(crate) fn replace_key(&mut self, stale: &ResourceKey, canonical: &ResourceKey) -> bool {
        if !self.remote_members.contains(stale)
            && !self.addition_members.contains(stale)
            && !self.removals.contains(stale)
            && !self
                .local_order
                .as_ref()
                .is_some_and(|order| order.contains(stale))
        {
            return false;
        }

        if self.remote_members.remove(stale) {
            rewrite_dedup(&mut self.remote_state, stale, canonical);
            self.remote_members.insert(canonical.clone());
        }
        if self.addition_members.remove(stale) {
            if self.addition_members.contains(canonical) || self.remote_members.contains(canonical)
            {
                self.pending_adds.retain(|a| &a.key != stale);
            } else {
                for add in &mut self.pending_adds {
                    if &add.key == stale {
                        add.key = canonical.clone();
                    }
                }
                self.addition_members.insert(canonical.clone());
            }
        }
        if self.removals.remove(stale) {
            self.removals.insert(canonical.clone());
        }
        if let Some(order) = &mut self.local_order {
            rewrite_dedup(order, stale, canonical);
        }
        self.invalidate();
        true
    }

    /// Keys referenced by any plane, deduplicated.
    pub(crate) fn referenced_keys(&self) -> Vec<ResourceKey> {
        let mut seen = FxHashSet::default();
        let mut keys = Vec::new();
        for key in self
            .remote_state
            .iter()
            .chain(self.pending_adds.iter().map(|a| &a.key))
            .chain(self.removals.iter())
        {
            if seen.insert(key.clone()) {
                keys.push(key.clone());
            }
        }
        keys
    }

    /// Folds another edge for the same field into this one (identity merge
    /// of two keys of the same type). Remote entries unknown here are
    /// appended; local edits union.
    pub(crate) fn absorb(&mut self, other: Self) {
        for key in other.remote_state {
            if self.remote_members.insert(key.clone()) {
                self.remote_state.push(key);
            }
        }
        for add in other.pending_adds {
            if !self.remote_members.contains(&add.key)
                && self.addition_members.insert(add.key.clone())
            {
                self.pending_adds.push(add);
            }
        }
        for key in other.removals {
            if self.remote_members.contains(&key) {
                self.removals.insert(key);
            }
        }
        if self.local_order.is_none() {
            self.local_order = other.local_order;
        }
        if self.meta.is_none() {
            self.meta = other.meta;
        }
        if self.links.is_none() {
            self.links = other.links;
        }
        self.transaction_ref = self.transaction_ref.max(other.transaction_ref);
        self.accessed |= other.accessed;
        self.state.has_received_data |= other.state.has_received_data;
        self.state.is_stale |= other.state.is_stale;
        self.state.should_force_reload |= other.state.should_force_reload;
        self.state.has_failed_load_attempt |= other.state.has_failed_load_attempt;
        self.state.has_dematerialized_inverse |= other.state.has_dematerialized_inverse;
        self.invalidate();
        self.refresh_emptiness();
    }
}

/// Rewrites `stale` → `canonical` in an ordered list, keeping the first
/// occurrence position and dropping any later duplicate.
fn rewrite_dedup(list: &mut Vec<ResourceKey>, stale: &ResourceKey, canonical: &ResourceKey) {
    let mut seen_canonical = false;
    list.retain_mut(|k| {
        if k == stale {
            *k = canonical.clone();
        }
        if k == canonical {
            if seen_canonical {
                return false;
            }
            seen_canonical = true;
        }
        true
    });
}

/// Overlays a caller-requested order onto the computed membership: keys in
/// `order` first (filtered to current membership), then the rest in their
/// diffed order.
fn apply_order(base: Vec<ResourceKey>, order: &[ResourceKey]) -> Vec<ResourceKey> {
    let members: FxHashSet<&ResourceKey> = base.iter().collect();
    let mut placed = FxHashSet::default();
    let mut out = Vec::with_capacity(base.len());
    for key in order {
        if members.contains(key) && placed.insert(key.clone()) {
            out.push(key.clone());
        }
    }
    for key in &base {
        if !placed.contains(key) {
            out.push(key.clone());
        }
    }
    out
}
