// SPDX-License-Identifier: Apache-2.0
// © Tether Project Developers <https://github.com/tether-data/tether>
//! Orthogonal knowledge/staleness flags attached to every declared edge.

use serde::{Deserialize, Serialize};

/// Knowledge and staleness flags for one relationship.
///
/// These are deliberately independent booleans rather than a single state
/// enum: real responses mix the conditions freely (a relationship can be
/// stale, previously failed, and currently non-empty at the same time).
/// Implicit edges carry no state; only declared to-one/to-many edges do.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipState {
    /// True once any authoritative signal (push, or local creation) has
    /// defined the relationship's content. Distinguishes "empty" from
    /// "never loaded".
    pub has_received_data: bool,
    /// True when the relationship is explicitly known to contain nothing.
    pub is_empty: bool,
    /// Background-refresh advisory for the upstream request layer.
    pub is_stale: bool,
    /// Forced-refresh advisory for the upstream request layer.
    pub should_force_reload: bool,
    /// Sticky failure marker, cleared only by a successful load.
    pub has_failed_load_attempt: bool,
    /// Set when a related resource was unloaded while this side still
    /// referenced it; a partial refetch is required before trusting the edge.
    pub has_dematerialized_inverse: bool,
}

impl RelationshipState {
    /// Applies the flag transitions of a successful content-bearing push.
    pub(crate) fn on_remote_data(&mut self, is_empty: bool) {
        self.has_received_data = true;
        self.is_empty = is_empty;
        self.is_stale = false;
        self.should_force_reload = false;
        self.has_failed_load_attempt = false;
        self.has_dematerialized_inverse = false;
    }

    /// Applies the flag transitions of a local mutation defining content.
    pub(crate) fn on_local_data(&mut self, is_empty: bool) {
        self.has_received_data = true;
        self.is_empty = is_empty;
    }

    /// Records a failed load attempt. Prior knowledge is left untouched.
    pub(crate) fn on_load_failure(&mut self) {
        self.has_failed_load_attempt = true;
    }

    /// Marks the relationship request-worthy.
    pub(crate) fn mark_stale(&mut self, force: bool) {
        self.is_stale = true;
        if force {
            self.should_force_reload = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_is_sticky_until_successful_load() {
        let mut state = RelationshipState::default();
        state.on_load_failure();
        state.mark_stale(true);
        assert!(state.has_failed_load_attempt);
        assert!(state.is_stale);
        assert!(state.should_force_reload);
        assert!(!state.has_received_data, "failure must not fabricate knowledge");

        state.on_remote_data(false);
        assert!(!state.has_failed_load_attempt);
        assert!(!state.is_stale);
        assert!(!state.should_force_reload);
        assert!(state.has_received_data);
        assert!(!state.is_empty);
    }

    #[test]
    fn empty_is_knowledge_not_absence() {
        let mut state = RelationshipState::default();
        state.on_remote_data(true);
        assert!(state.has_received_data);
        assert!(state.is_empty);
    }
}
