// SPDX-License-Identifier: Apache-2.0
// © Tether Project Developers <https://github.com/tether-data/tether>
//! Wire-adjacent operation and mutation payloads.
//!
//! These shapes round-trip losslessly through JSON: the `op` tag and field
//! names match what the surrounding store exchanges with its request
//! pipeline, so a payload can be captured, replayed, or forwarded without a
//! translation layer.

use serde::{Deserialize, Serialize};

use crate::ident::ResourceKey;

/// Relationship content carried by an operation: one key (or explicit null)
/// for to-one, a list for to-many. Untagged on the wire — the JSON shape
/// (`null`/object vs. array) is the discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelationshipValue {
    /// To-many content.
    Many(Vec<ResourceKey>),
    /// To-one content; `None` is an explicit empty.
    One(Option<ResourceKey>),
}

impl RelationshipValue {
    /// Iterates the keys named by this value, in payload order.
    pub fn keys(&self) -> impl Iterator<Item = &ResourceKey> {
        match self {
            Self::Many(keys) => keys.iter(),
            Self::One(key) => key.as_slice().iter(),
        }
    }

    /// Returns the to-one form, if this is one.
    #[must_use]
    pub fn as_one(&self) -> Option<Option<&ResourceKey>> {
        match self {
            Self::One(key) => Some(key.as_ref()),
            Self::Many(_) => None,
        }
    }

    /// Returns the to-many form, if this is one.
    #[must_use]
    pub fn as_many(&self) -> Option<&[ResourceKey]> {
        match self {
            Self::Many(keys) => Some(keys),
            Self::One(_) => None,
        }
    }
}

impl From<Option<ResourceKey>> for RelationshipValue {
    fn from(key: Option<ResourceKey>) -> Self {
        Self::One(key)
    }
}

impl From<Vec<ResourceKey>> for RelationshipValue {
    fn from(keys: Vec<ResourceKey>) -> Self {
        Self::Many(keys)
    }
}

/// A remote operation: server-confirmed data entering the graph.
///
/// Remote operations touch remote state only; local overrides are reconciled
/// against the new remote content but never written directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum RemoteOp {
    /// Add the named key(s) to a to-many relationship's remote membership.
    #[serde(rename_all = "camelCase")]
    Add {
        /// Owning resource.
        record: ResourceKey,
        /// Relationship field on `record`.
        field: String,
        /// Key(s) to add.
        value: RelationshipValue,
        /// Optional position for the insertion; appended when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
    },
    /// Remove the named key(s) from a to-many relationship's remote
    /// membership.
    #[serde(rename_all = "camelCase")]
    Remove {
        /// Owning resource.
        record: ResourceKey,
        /// Relationship field on `record`.
        field: String,
        /// Key(s) to remove.
        value: RelationshipValue,
    },
    /// Replace a relationship's remote content: to-one replacement when
    /// `value` is the one-form, full collection replacement when it is the
    /// many-form. With `index`, the many-form is a positional splice
    /// instead: the named keys are moved/inserted at `index`, the rest of
    /// the remote order is untouched.
    #[serde(rename_all = "camelCase")]
    Update {
        /// Owning resource.
        record: ResourceKey,
        /// Relationship field on `record`.
        field: String,
        /// New remote content.
        value: RelationshipValue,
        /// Splice position for the many-form.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
        /// JSON:API `meta` side-channel, stored verbatim on the edge.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        meta: Option<serde_json::Value>,
        /// JSON:API `links` side-channel, stored verbatim on the edge.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        links: Option<serde_json::Value>,
        /// Edge `transaction_ref` captured when the originating request was
        /// issued. Absent ⇒ the push is authoritative over local overrides.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        observed_ref: Option<u64>,
    },
    /// Two keys were discovered to denote the same resource: rewrite every
    /// reference to `record` (the stale key) to `value` (the canonical key).
    #[serde(rename_all = "camelCase")]
    MergeIdentifiers {
        /// Stale key.
        record: ResourceKey,
        /// Canonical key.
        value: ResourceKey,
    },
}

impl RemoteOp {
    /// The resource key the operation is addressed to.
    #[must_use]
    pub fn record(&self) -> &ResourceKey {
        match self {
            Self::Add { record, .. }
            | Self::Remove { record, .. }
            | Self::Update { record, .. }
            | Self::MergeIdentifiers { record, .. } => record,
        }
    }
}

/// A local mutation: an unsaved, user-facing edit layered atop remote state.
///
/// Mutations touch local overrides only (`additions`/`removals`, local
/// to-one state, local ordering); remote state is never written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum LocalMutation {
    /// Set a to-one relationship locally.
    #[serde(rename_all = "camelCase")]
    ReplaceRelatedRecord {
        /// Owning resource.
        record: ResourceKey,
        /// Relationship field on `record`.
        field: String,
        /// New local value; `None` clears it.
        value: Option<ResourceKey>,
        /// Value the caller believes it is replacing; mismatches are
        /// diagnosed, not fatal.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prior: Option<ResourceKey>,
    },
    /// Replace a to-many relationship's effective content and order locally.
    #[serde(rename_all = "camelCase")]
    ReplaceRelatedRecords {
        /// Owning resource.
        record: ResourceKey,
        /// Relationship field on `record`.
        field: String,
        /// New effective membership, in caller order.
        value: Vec<ResourceKey>,
        /// Membership the caller believes it is replacing.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prior: Option<Vec<ResourceKey>>,
        /// Position for a partial (positional) replace.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
    },
    /// Enqueue local addition(s) to a to-many relationship.
    #[serde(rename_all = "camelCase")]
    AddToRelatedRecords {
        /// Owning resource.
        record: ResourceKey,
        /// Relationship field on `record`.
        field: String,
        /// Key(s) to add.
        value: RelationshipValue,
        /// Position recorded for the diff; appended when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
    },
    /// Enqueue local removal(s) from a to-many relationship.
    #[serde(rename_all = "camelCase")]
    RemoveFromRelatedRecords {
        /// Owning resource.
        record: ResourceKey,
        /// Relationship field on `record`.
        field: String,
        /// Key(s) to remove.
        value: RelationshipValue,
        /// Position hint; advisory only, removal is by membership.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
    },
    /// Reorder a to-many relationship locally without changing membership.
    #[serde(rename_all = "camelCase")]
    SortRelatedRecords {
        /// Owning resource.
        record: ResourceKey,
        /// Relationship field on `record`.
        field: String,
        /// Requested order; keys outside the current membership are ignored.
        value: Vec<ResourceKey>,
    },
}

impl LocalMutation {
    /// The resource key the mutation is addressed to.
    #[must_use]
    pub fn record(&self) -> &ResourceKey {
        match self {
            Self::ReplaceRelatedRecord { record, .. }
            | Self::ReplaceRelatedRecords { record, .. }
            | Self::AddToRelatedRecords { record, .. }
            | Self::RemoveFromRelatedRecords { record, .. }
            | Self::SortRelatedRecords { record, .. } => record,
        }
    }

    /// The relationship field the mutation targets.
    #[must_use]
    pub fn field(&self) -> &str {
        match self {
            Self::ReplaceRelatedRecord { field, .. }
            | Self::ReplaceRelatedRecords { field, .. }
            | Self::AddToRelatedRecords { field, .. }
            | Self::RemoveFromRelatedRecords { field, .. }
            | Self::SortRelatedRecords { field, .. } => field,
        }
    }
}
