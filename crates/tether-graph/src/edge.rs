// SPDX-License-Identifier: Apache-2.0
// © Tether Project Developers <https://github.com/tether-data/tether>
//! The edge sum type.

use std::sync::Arc;

use crate::collection_edge::CollectionEdge;
use crate::definition::{EdgeDefinition, EdgeKind};
use crate::ident::ResourceKey;
use crate::implicit_edge::ImplicitEdge;
use crate::resource_edge::ResourceEdge;
use crate::state::RelationshipState;

/// Relationship state for one `(resource key, field)` pair.
///
/// Constructed fully initialized from its resolved definition; callers never
/// observe a partial edge.
#[derive(Debug)]
pub enum Edge {
    /// To-one.
    BelongsTo(ResourceEdge),
    /// To-many.
    HasMany(CollectionEdge),
    /// Synthesized back-reference.
    Implicit(ImplicitEdge),
}

impl Edge {
    pub(crate) fn new(definition: Arc<EdgeDefinition>) -> Self {
        match definition.kind {
            EdgeKind::BelongsTo => Self::BelongsTo(ResourceEdge::new(definition)),
            EdgeKind::HasMany => Self::HasMany(CollectionEdge::new(definition)),
            EdgeKind::Implicit => Self::Implicit(ImplicitEdge::new(definition)),
        }
    }

    /// Shared definition for this edge's field.
    #[must_use]
    pub fn definition(&self) -> &Arc<EdgeDefinition> {
        match self {
            Self::BelongsTo(edge) => edge.definition(),
            Self::HasMany(edge) => edge.definition(),
            Self::Implicit(edge) => edge.definition(),
        }
    }

    /// Knowledge/staleness flags; `None` for implicit edges, which carry no
    /// state.
    #[must_use]
    pub fn state(&self) -> Option<&RelationshipState> {
        match self {
            Self::BelongsTo(edge) => Some(edge.state()),
            Self::HasMany(edge) => Some(edge.state()),
            Self::Implicit(_) => None,
        }
    }

    pub(crate) fn state_mut(&mut self) -> Option<&mut RelationshipState> {
        match self {
            Self::BelongsTo(edge) => Some(edge.state_mut()),
            Self::HasMany(edge) => Some(edge.state_mut()),
            Self::Implicit(_) => None,
        }
    }

    /// The to-one variant, if this is one.
    #[must_use]
    pub fn as_belongs_to(&self) -> Option<&ResourceEdge> {
        match self {
            Self::BelongsTo(edge) => Some(edge),
            _ => None,
        }
    }

    /// The to-many variant, if this is one.
    #[must_use]
    pub fn as_has_many(&self) -> Option<&CollectionEdge> {
        match self {
            Self::HasMany(edge) => Some(edge),
            _ => None,
        }
    }

    /// The implicit variant, if this is one.
    #[must_use]
    pub fn as_implicit(&self) -> Option<&ImplicitEdge> {
        match self {
            Self::Implicit(edge) => Some(edge),
            _ => None,
        }
    }

    /// Whether an unsaved local override exists. Implicit edges are never
    /// dirty in the application-visible sense.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        match self {
            Self::BelongsTo(edge) => edge.is_dirty(),
            Self::HasMany(edge) => edge.is_dirty(),
            Self::Implicit(_) => false,
        }
    }

    /// Whether the application has read this edge.
    #[must_use]
    pub fn accessed(&self) -> bool {
        match self {
            Self::BelongsTo(edge) => edge.accessed(),
            Self::HasMany(edge) => edge.accessed(),
            Self::Implicit(_) => false,
        }
    }

    /// Monotonic write stamp; always 0 for implicit edges.
    #[must_use]
    pub fn transaction_ref(&self) -> u64 {
        match self {
            Self::BelongsTo(edge) => edge.transaction_ref(),
            Self::HasMany(edge) => edge.transaction_ref(),
            Self::Implicit(_) => 0,
        }
    }

    pub(crate) fn stamp(&mut self, transaction_ref: u64) {
        match self {
            Self::BelongsTo(edge) => edge.stamp(transaction_ref),
            Self::HasMany(edge) => edge.stamp(transaction_ref),
            Self::Implicit(_) => {}
        }
    }

    /// Scrubs `key` from every plane of this edge.
    pub(crate) fn remove_key(&mut self, key: &ResourceKey) -> bool {
        match self {
            Self::BelongsTo(edge) => edge.remove_key(key),
            Self::HasMany(edge) => edge.remove_key(key),
            Self::Implicit(edge) => edge.remove_key(key),
        }
    }

    /// Rewrites `stale` → `canonical` in every plane of this edge.
    pub(crate) fn replace_key(&mut self, stale: &ResourceKey, canonical: &ResourceKey) -> bool {
        match self {
            Self::BelongsTo(edge) => edge.replace_key(stale, canonical),
            Self::HasMany(edge) => edge.replace_key(stale, canonical),
            Self::Implicit(edge) => edge.replace_key(stale, canonical),
        }
    }

    /// Every key this edge references, in any plane, deduplicated.
    pub(crate) fn referenced_keys(&self) -> Vec<ResourceKey> {
        match self {
            Self::BelongsTo(edge) => edge.referenced_keys(),
            Self::HasMany(edge) => edge.referenced_keys(),
            Self::Implicit(edge) => edge.referenced_keys(),
        }
    }

    /// Folds `other` (same field, merged-away key) into this edge.
    pub(crate) fn absorb(&mut self, other: Self) {
        match (self, other) {
            (Self::BelongsTo(a), Self::BelongsTo(b)) => a.absorb(b),
            (Self::HasMany(a), Self::HasMany(b)) => a.absorb(b),
            (Self::Implicit(a), Self::Implicit(b)) => a.absorb(b),
            // Variant mismatch would mean two keys of the same type resolved
            // to different definitions; the definition cache makes that
            // impossible, so arriving here is a bookkeeping bug.
            _ => debug_assert!(false, "absorb called across edge variants"),
        }
    }
}
