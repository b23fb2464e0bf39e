// SPDX-License-Identifier: Apache-2.0
// © Tether Project Developers <https://github.com/tether-data/tether>
//! To-one edge state.

use std::sync::Arc;

use crate::definition::EdgeDefinition;
use crate::ident::ResourceKey;
use crate::state::RelationshipState;

/// Relationship state for one to-one field on one resource.
///
/// `local_state` mirrors `remote_state` until a local mutation overrides it;
/// the effective (application-observed) value is always `local_state`.
/// Invariant: once `state.has_received_data` is true, `local_state == None`
/// means authoritatively empty, not unknown.
#[derive(Debug)]
pub struct ResourceEdge {
    definition: Arc<EdgeDefinition>,
    remote_state: Option<ResourceKey>,
    local_state: Option<ResourceKey>,
    meta: Option<serde_json::Value>,
    links: Option<serde_json::Value>,
    transaction_ref: u64,
    accessed: bool,
    state: RelationshipState,
}

impl ResourceEdge {
    pub(crate) fn new(definition: Arc<EdgeDefinition>) -> Self {
        Self {
            definition,
            remote_state: None,
            local_state: None,
            meta: None,
            links: None,
            transaction_ref: 0,
            accessed: false,
            state: RelationshipState::default(),
        }
    }

    /// Shared definition for this field.
    #[must_use]
    pub fn definition(&self) -> &Arc<EdgeDefinition> {
        &self.definition
    }

    /// Last server-confirmed value.
    #[must_use]
    pub fn remote_state(&self) -> Option<&ResourceKey> {
        self.remote_state.as_ref()
    }

    /// Effective value (remote with any local override applied).
    #[must_use]
    pub fn local_state(&self) -> Option<&ResourceKey> {
        self.local_state.as_ref()
    }

    /// Whether an unsaved local override exists.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.local_state != self.remote_state
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

    /// Applies a remote replacement.
    ///
    /// With `keep_newer_local`, an unsatisfied local override survives (the
    /// push was computed from data older than the override); otherwise the
    /// new remote value wins. Returns the discarded override value when one
    /// was dropped, so the caller can repair the inverse side's local plane.
    pub(crate) fn push_replace(
        &mut self,
        value: Option<ResourceKey>,
        keep_newer_local: bool,
    ) -> Option<Option<ResourceKey>> {
        let overridden = self.is_dirty();
        let prev_local = self.local_state.clone();
        self.remote_state.clone_from(&value);
        let satisfied = self.local_state == value;
        let survives = keep_newer_local && overridden;
        let mut discarded = None;
        if !satisfied && !survives {
            if overridden {
                discarded = Some(prev_local);
            }
            self.local_state = value;
        }
        let empty = self.local_state.is_none();
        self.state.on_remote_data(empty);
        discarded
    }

    /// Applies a local replacement, returning the previous effective value.
    pub(crate) fn replace_local(&mut self, value: Option<ResourceKey>) -> Option<ResourceKey> {
        let prior = std::mem::replace(&mut self.local_state, value);
        self.state.on_local_data(self.local_state.is_none());
        prior
    }

    /// Discards any local override, restoring the remote value.
    /// Returns the discarded effective value when it differed.
    pub(crate) fn rollback_local(&mut self) -> Option<Option<ResourceKey>> {
        if !self.is_dirty() {
            return None;
        }
        let discarded = self.local_state.clone();
        self.local_state.clone_from(&self.remote_state);
        self.state.is_empty = self.local_state.is_none();
        Some(discarded)
    }

    /// Scrubs `key` from both sides (teardown). Returns `true` when the edge
    /// referenced it.
    pub(crate) fn remove_key(&mut self, key: &ResourceKey) -> bool {
        let mut hit = false;
        if self.remote_state.as_ref() == Some(key) {
            self.remote_state = None;
            hit = true;
        }
        if self.local_state.as_ref() == Some(key) {
            self.local_state = None;
            self.state.is_empty = true;
            hit = true;
        }
        hit
    }

    /// Rewrites `stale` → `canonical` on both sides (identity merge).
    /// Returns `true` when the edge referenced the stale key.
    pub(crate) fn replace_key(&mut self, stale: &ResourceKey, canonical: &ResourceKey) -> bool {
        let mut hit = false;
        if self.remote_state.as_ref() == Some(stale) {
            self.remote_state = Some(canonical.clone());
            hit = true;
        }
        if self.local_state.as_ref() == Some(stale) {
            self.local_state = Some(canonical.clone());
            hit = true;
        }
        hit
    }

    /// Keys referenced by either side, deduplicated.
    pub(crate) fn referenced_keys(&self) -> Vec<ResourceKey> {
        let mut keys = Vec::with_capacity(2);
        if let Some(remote) = &self.remote_state {
            keys.push(remote.clone());
        }
        if let Some(local) = &self.local_state {
            if Some(local) != self.remote_state.as_ref() {
                keys.push(local.clone());
            }
        }
        keys
    }

    /// Folds another edge for the same field into this one (identity merge
    /// of two keys of the same type). Remote knowledge on either side is
    /// kept; a dirty override on `other` wins over a clean mirror here.
    pub(crate) fn absorb(&mut self, other: Self) {
        if other.state.has_received_data && !self.state.has_received_data {
            self.remote_state = other.remote_state;
            self.local_state = other.local_state;
        } else if other.is_dirty() && !self.is_dirty() {
            self.local_state = other.local_state;
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
        self.state.is_empty = self.local_state.is_none() && self.state.has_received_data;
    }
}
