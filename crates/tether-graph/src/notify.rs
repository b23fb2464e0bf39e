// SPDX-License-Identifier: Apache-2.0
// © Tether Project Developers <https://github.com/tether-data/tether>
//! Batched change notifications for the reactivity collaborator.
//!
//! A single caller-visible operation may touch many edges; observers are
//! told once per affected `(key, field)` pair per batch, in first-touch
//! order. The graph only records the signals — coalescing across turns and
//! turning a signal into a re-render belong to the surrounding system.

use rustc_hash::FxHashSet;

use crate::ident::ResourceKey;

/// One "this relationship changed" signal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChangedRelationship {
    /// Resource whose relationship changed.
    pub record: ResourceKey,
    /// The changed field.
    pub field: String,
}

/// Per-turn collection of change signals, idempotent within the batch.
#[derive(Debug, Default)]
pub struct NotificationBatch {
    seen: FxHashSet<ChangedRelationship>,
    queue: Vec<ChangedRelationship>,
}

impl NotificationBatch {
    /// Records a signal for `(record, field)`. Duplicate signals within the
    /// batch are dropped.
    pub fn signal(&mut self, record: &ResourceKey, field: &str) {
        let entry = ChangedRelationship {
            record: record.clone(),
            field: field.to_owned(),
        };
        if self.seen.insert(entry.clone()) {
            self.queue.push(entry);
        }
    }

    /// Number of distinct pairs signalled so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Takes the batch, resetting it for the next turn.
    pub fn drain(&mut self) -> Vec<ChangedRelationship> {
        self.seen.clear();
        std::mem::take(&mut self.queue)
    }
}
