// SPDX-License-Identifier: Apache-2.0
// © Tether Project Developers <https://github.com/tether-data/tether>
//! Shared relationship schema types for Tether.
//!
//! The graph core never declares relationships itself; it consumes ordered
//! [`FieldDescriptor`]s through the [`SchemaProvider`] port. This crate is
//! deliberately tiny so that schema-producing adapters (code-generated,
//! reflection-driven, hand-written) depend on data types only.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Cardinality of a relationship field as declared by the schema author.
///
/// Wire forms are camelCase (`"belongsTo"` / `"hasMany"`) to match the
/// payload shapes the surrounding store exchanges with its cache layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationshipKind {
    /// To-one: the field resolves to at most one related resource.
    BelongsTo,
    /// To-many: the field resolves to an ordered list of related resources.
    HasMany,
}

impl RelationshipKind {
    /// Returns `true` for the to-many cardinality.
    #[must_use]
    pub fn is_collection(self) -> bool {
        matches!(self, Self::HasMany)
    }
}

/// One relationship field as the schema service describes it.
///
/// `inverse: None` is the "no inverse" sentinel: the related type declares no
/// field pointing back. The graph synthesizes an implicit back-reference in
/// that case so teardown can still locate inbound references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    /// Field name on the owning type.
    pub name: String,
    /// Cardinality.
    pub kind: RelationshipKind,
    /// Logical type of the related resource(s).
    pub related_type: String,
    /// Field on `related_type` pointing back at the owner, if declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inverse: Option<String>,
    /// Whether the relationship is loaded on demand rather than inlined.
    #[serde(default)]
    pub is_async: bool,
    /// Whether `related_type` is an abstract type with concrete subtypes.
    #[serde(default)]
    pub is_polymorphic: bool,
}

impl FieldDescriptor {
    /// Convenience constructor for a synchronous, non-polymorphic field.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        kind: RelationshipKind,
        related_type: impl Into<String>,
        inverse: Option<&str>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            related_type: related_type.into(),
            inverse: inverse.map(str::to_owned),
            is_async: false,
            is_polymorphic: false,
        }
    }

    /// Marks the field as async-loaded.
    #[must_use]
    pub fn with_async(mut self) -> Self {
        self.is_async = true;
        self
    }

    /// Marks the related type as polymorphic.
    #[must_use]
    pub fn with_polymorphic(mut self) -> Self {
        self.is_polymorphic = true;
        self
    }
}

/// Driven port: the graph's only window into the schema service.
///
/// Implementations must return descriptors in a stable declaration order;
/// the graph caches resolution results per (type, field) and assumes
/// repeated calls observe identical descriptors.
pub trait SchemaProvider {
    /// Ordered relationship field descriptors for `ty`, or `None` when the
    /// type is unknown to the schema.
    fn fields(&self, ty: &str) -> Option<&[FieldDescriptor]>;
}

/// In-memory [`SchemaProvider`] backed by a type → descriptor-list map.
///
/// Used by tests and by consumers whose schema is static.
#[derive(Debug, Default, Clone)]
pub struct SchemaRegistry {
    types: HashMap<String, Vec<FieldDescriptor>>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the descriptor list for `ty`.
    pub fn register(&mut self, ty: impl Into<String>, fields: Vec<FieldDescriptor>) {
        self.types.insert(ty.into(), fields);
    }

    /// Builder-style [`Self::register`].
    #[must_use]
    pub fn with_type(mut self, ty: impl Into<String>, fields: Vec<FieldDescriptor>) -> Self {
        self.register(ty, fields);
        self
    }
}

impl SchemaProvider for SchemaRegistry {
    fn fields(&self, ty: &str) -> Option<&[FieldDescriptor]> {
        self.types.get(ty).map(Vec::as_slice)
    }
}
