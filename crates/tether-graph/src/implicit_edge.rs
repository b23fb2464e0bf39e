// SPDX-License-Identifier: Apache-2.0
// © Tether Project Developers <https://github.com/tether-data/tether>
//! Synthesized back-reference edges.

use std::sync::Arc;

use rustc_hash::FxHashSet;

use crate::definition::EdgeDefinition;
use crate::ident::ResourceKey;

/// Unordered back-reference membership for a one-sided relationship.
///
/// Exists solely so that unloading a resource can locate and scrub every
/// inbound reference to it even when the schema declares no inverse field.
/// Carries no ordering, no meta/links, no state flags, and never produces
/// notifications or payloads.
#[derive(Debug)]
pub struct ImplicitEdge {
    definition: Arc<EdgeDefinition>,
    remote_members: FxHashSet<ResourceKey>,
    local_members: FxHashSet<ResourceKey>,
}

impl ImplicitEdge {
    pub(crate) fn new(definition: Arc<EdgeDefinition>) -> Self {
        Self {
            definition,
            remote_members: FxHashSet::default(),
            local_members: FxHashSet::default(),
        }
    }

    /// Shared definition for this synthesized field.
    #[must_use]
    pub fn definition(&self) -> &Arc<EdgeDefinition> {
        &self.definition
    }

    /// Keys whose remote state references the owner.
    pub fn remote_members(&self) -> impl Iterator<Item = &ResourceKey> {
        self.remote_members.iter()
    }

    /// Keys whose local (uncommitted) state references the owner.
    pub fn local_members(&self) -> impl Iterator<Item = &ResourceKey> {
        self.local_members.iter()
    }

    pub(crate) fn add_remote(&mut self, key: ResourceKey) {
        self.remote_members.insert(key);
    }

    pub(crate) fn remove_remote(&mut self, key: &ResourceKey) {
        self.remote_members.remove(key);
    }

    pub(crate) fn add_local(&mut self, key: ResourceKey) {
        self.local_members.insert(key);
    }

    pub(crate) fn remove_local(&mut self, key: &ResourceKey) {
        self.local_members.remove(key);
    }

    /// Scrubs `key` from both planes. Returns `true` when it was present.
    pub(crate) fn remove_key(&mut self, key: &ResourceKey) -> bool {
        let remote = self.remote_members.remove(key);
        let local = self.local_members.remove(key);
        remote || local
    }

    /// Rewrites `stale` → `canonical` in both planes (sets dedupe
    /// naturally). Returns `true` when the stale key was present.
    pub(crate) fn replace_key(&mut self, stale: &ResourceKey, canonical: &ResourceKey) -> bool {
        let mut hit = false;
        if self.remote_members.remove(stale) {
            self.remote_members.insert(canonical.clone());
            hit = true;
        }
        if self.local_members.remove(stale) {
            self.local_members.insert(canonical.clone());
            hit = true;
        }
        hit
    }

    /// Keys referenced by either plane, deduplicated.
    pub(crate) fn referenced_keys(&self) -> Vec<ResourceKey> {
        let mut keys: Vec<ResourceKey> = self.remote_members.iter().cloned().collect();
        for key in &self.local_members {
            if !self.remote_members.contains(key) {
                keys.push(key.clone());
            }
        }
        keys
    }

    /// Folds another implicit edge into this one (identity merge).
    pub(crate) fn absorb(&mut self, other: Self) {
        self.remote_members.extend(other.remote_members);
        self.local_members.extend(other.local_members);
    }
}
