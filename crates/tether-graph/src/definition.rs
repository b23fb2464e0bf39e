// SPDX-License-Identifier: Apache-2.0
// © Tether Project Developers <https://github.com/tether-data/tether>
//! Edge definition resolution: schema descriptors → canonical, shared,
//! bidirectional relationship metadata.
//!
//! Resolution is memoized per `(type, field)`; repeated resolution returns
//! the identical definition object. When a descriptor declares no inverse,
//! a synthesized *implicit* definition is registered under the related type
//! so the relationship stays traversable from both directions — teardown
//! needs a back-reference even though the application never queries it.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tether_schema::{FieldDescriptor, RelationshipKind, SchemaProvider};

/// Shape of an edge as seen from its owning side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// To-one.
    BelongsTo,
    /// To-many, ordered.
    HasMany,
    /// Synthesized unordered back-reference; never application-visible.
    Implicit,
}

impl EdgeKind {
    /// Returns `true` for the to-many shape.
    #[must_use]
    pub fn is_collection(self) -> bool {
        matches!(self, Self::HasMany)
    }

    /// Returns `true` for the synthesized back-reference shape.
    #[must_use]
    pub fn is_implicit(self) -> bool {
        matches!(self, Self::Implicit)
    }
}

impl From<RelationshipKind> for EdgeKind {
    fn from(kind: RelationshipKind) -> Self {
        match kind {
            RelationshipKind::BelongsTo => Self::BelongsTo,
            RelationshipKind::HasMany => Self::HasMany,
        }
    }
}

/// Resolved, immutable metadata for one relationship field.
///
/// One definition is shared (via `Arc`) by every edge instantiated for that
/// field across all resources of the owning type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeDefinition {
    /// Field name on the owning type. Implicit definitions use a namespaced
    /// name (see [`implicit_field_name`]) that cannot collide with declared
    /// fields.
    pub field_name: String,
    /// Shape of this side.
    pub kind: EdgeKind,
    /// Type owning the field.
    pub owner_type: String,
    /// Type of the related resource(s).
    pub related_type: String,
    /// Field on `related_type` holding the other side. Always present after
    /// resolution: a declared inverse, or the synthesized implicit name.
    pub inverse_field: String,
    /// Shape of the other side.
    pub inverse_kind: EdgeKind,
    /// Whether the relationship loads on demand.
    pub is_async: bool,
    /// Whether `related_type` is abstract.
    pub is_polymorphic: bool,
}

impl EdgeDefinition {
    /// Returns `true` when this definition describes a synthesized
    /// back-reference.
    #[must_use]
    pub fn is_implicit(&self) -> bool {
        self.kind.is_implicit()
    }

    /// Returns `true` when the other side is a synthesized back-reference.
    #[must_use]
    pub fn inverse_is_implicit(&self) -> bool {
        self.inverse_kind.is_implicit()
    }
}

/// Namespaced field name for the synthesized back-reference of
/// `owner_type.field`.
///
/// The `implicit:` prefix keeps synthesized names out of the declared-field
/// namespace.
#[must_use]
pub fn implicit_field_name(owner_type: &str, field: &str) -> String {
    format!("implicit:{owner_type}:{field}")
}

/// Configuration errors surfaced by definition resolution.
///
/// These indicate a malformed or contradictory schema; no valid operation
/// can proceed on the affected field, so they are reported once and the
/// failed resolution is memoized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    /// The schema has no descriptors for the requested type.
    #[error("type not described by schema: {ty}")]
    UnknownType {
        /// Requested type.
        ty: String,
    },
    /// The type exists but declares no such relationship field.
    #[error("no relationship field `{field}` on `{ty}`")]
    UnknownField {
        /// Owning type.
        ty: String,
        /// Requested field.
        field: String,
    },
    /// A declared inverse names a field that does not exist.
    #[error("inverse `{inverse}` of `{ty}.{field}` does not exist on `{related}`")]
    InverseNotFound {
        /// Owning type.
        ty: String,
        /// Owning field.
        field: String,
        /// Declared inverse name.
        inverse: String,
        /// Type the inverse was looked up on.
        related: String,
    },
    /// A declared inverse exists but targets an incompatible type.
    #[error("inverse `{inverse}` of `{ty}.{field}` targets `{found}`, expected `{ty}`")]
    InverseTypeMismatch {
        /// Owning type.
        ty: String,
        /// Owning field.
        field: String,
        /// Declared inverse name.
        inverse: String,
        /// Type the inverse actually targets.
        found: String,
    },
    /// A declared inverse itself declares a different inverse.
    #[error("inverse `{inverse}` of `{ty}.{field}` points back at `{found}`, not `{field}`")]
    InverseNotSymmetric {
        /// Owning type.
        ty: String,
        /// Owning field.
        field: String,
        /// Declared inverse name.
        inverse: String,
        /// Field the inverse points back at.
        found: String,
    },
}

/// Memoized `(type, field)` → [`EdgeDefinition`] resolution.
///
/// Failed resolutions are memoized too, so a configuration error is
/// diagnosed exactly once and every later resolution of the same pair
/// returns the same error without re-reporting.
#[derive(Debug, Default)]
pub struct DefinitionCache {
    resolved: HashMap<(String, String), Result<Arc<EdgeDefinition>, DefinitionError>>,
}

impl DefinitionCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves the definition for `ty.field`, consulting `schema` on a
    /// cache miss.
    ///
    /// # Errors
    /// Returns a memoized [`DefinitionError`] when the schema is malformed
    /// for this pair.
    pub fn resolve<S: SchemaProvider>(
        &mut self,
        schema: &S,
        ty: &str,
        field: &str,
    ) -> Result<Arc<EdgeDefinition>, DefinitionError> {
        if let Some(cached) = self.resolved.get(&(ty.to_owned(), field.to_owned())) {
            return cached.clone();
        }
        let result = self.resolve_uncached(schema, ty, field);
        if let Err(err) = &result {
            // First (and only) diagnosis of this pair.
            tracing::error!(ty, field, error = %err, "relationship misconfigured");
        }
        self.resolved
            .insert((ty.to_owned(), field.to_owned()), result.clone());
        result
    }

    fn resolve_uncached<S: SchemaProvider>(
        &mut self,
        schema: &S,
        ty: &str,
        field: &str,
    ) -> Result<Arc<EdgeDefinition>, DefinitionError> {
        let fields = schema.fields(ty).ok_or_else(|| DefinitionError::UnknownType {
            ty: ty.to_owned(),
        })?;
        let descriptor = fields
            .iter()
            .find(|f| f.name == field)
            .ok_or_else(|| DefinitionError::UnknownField {
                ty: ty.to_owned(),
                field: field.to_owned(),
            })?;

        match &descriptor.inverse {
            Some(inverse) => self.resolve_declared(schema, ty, descriptor, inverse),
            None => Ok(self.resolve_one_sided(ty, descriptor)),
        }
    }

    /// Both sides declared: validate the inverse and build the owning
    /// definition.
    fn resolve_declared<S: SchemaProvider>(
        &mut self,
        schema: &S,
        ty: &str,
        descriptor: &FieldDescriptor,
        inverse: &str,
    ) -> Result<Arc<EdgeDefinition>, DefinitionError> {
        let related = descriptor.related_type.as_str();
        let not_found = || DefinitionError::InverseNotFound {
            ty: ty.to_owned(),
            field: descriptor.name.clone(),
            inverse: inverse.to_owned(),
            related: related.to_owned(),
        };
        let inverse_descriptor = schema
            .fields(related)
            .ok_or_else(not_found)?
            .iter()
            .find(|f| f.name == inverse)
            .ok_or_else(not_found)?;

        // A polymorphic inverse accepts any concrete owner subtype, so the
        // type check only binds when both sides are concrete.
        if !inverse_descriptor.is_polymorphic
            && !descriptor.is_polymorphic
            && inverse_descriptor.related_type != ty
        {
            return Err(DefinitionError::InverseTypeMismatch {
                ty: ty.to_owned(),
                field: descriptor.name.clone(),
                inverse: inverse.to_owned(),
                found: inverse_descriptor.related_type.clone(),
            });
        }
        if let Some(back) = &inverse_descriptor.inverse {
            if back != &descriptor.name {
                return Err(DefinitionError::InverseNotSymmetric {
                    ty: ty.to_owned(),
                    field: descriptor.name.clone(),
                    inverse: inverse.to_owned(),
                    found: back.clone(),
                });
            }
        }

        Ok(Arc::new(EdgeDefinition {
            field_name: descriptor.name.clone(),
            kind: descriptor.kind.into(),
            owner_type: ty.to_owned(),
            related_type: related.to_owned(),
            inverse_field: inverse.to_owned(),
            inverse_kind: inverse_descriptor.kind.into(),
            is_async: descriptor.is_async,
            is_polymorphic: descriptor.is_polymorphic,
        }))
    }

    /// No declared inverse: synthesize the implicit back-reference so the
    /// relationship is traversable from both directions, and register it
    /// under the related type.
    fn resolve_one_sided(&mut self, ty: &str, descriptor: &FieldDescriptor) -> Arc<EdgeDefinition> {
        let related = descriptor.related_type.as_str();
        let implicit_name = implicit_field_name(ty, &descriptor.name);

        let implicit = Arc::new(EdgeDefinition {
            field_name: implicit_name.clone(),
            kind: EdgeKind::Implicit,
            owner_type: related.to_owned(),
            related_type: ty.to_owned(),
            inverse_field: descriptor.name.clone(),
            inverse_kind: descriptor.kind.into(),
            is_async: false,
            is_polymorphic: false,
        });
        self.resolved
            .insert((related.to_owned(), implicit_name.clone()), Ok(implicit));

        Arc::new(EdgeDefinition {
            field_name: descriptor.name.clone(),
            kind: descriptor.kind.into(),
            owner_type: ty.to_owned(),
            related_type: related.to_owned(),
            inverse_field: implicit_name,
            inverse_kind: EdgeKind::Implicit,
            is_async: descriptor.is_async,
            is_polymorphic: descriptor.is_polymorphic,
        })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use tether_schema::SchemaRegistry;

    fn schema() -> SchemaRegistry {
        SchemaRegistry::new()
            .with_type(
                "post",
                vec![
                    FieldDescriptor::new("author", RelationshipKind::BelongsTo, "user", Some("posts")),
                    FieldDescriptor::new("tags", RelationshipKind::HasMany, "tag", None),
                ],
            )
            .with_type(
                "user",
                vec![FieldDescriptor::new(
                    "posts",
                    RelationshipKind::HasMany,
                    "post",
                    Some("author"),
                )],
            )
            .with_type("tag", vec![])
    }

    #[test]
    fn resolution_is_memoized_per_pair() {
        let schema = schema();
        let mut cache = DefinitionCache::new();
        let first = cache.resolve(&schema, "post", "author").unwrap();
        let second = cache.resolve(&schema, "post", "author").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.inverse_field, "posts");
        assert_eq!(first.inverse_kind, EdgeKind::HasMany);
    }

    #[test]
    fn one_sided_field_synthesizes_implicit_inverse() {
        let schema = schema();
        let mut cache = DefinitionCache::new();
        let tags = cache.resolve(&schema, "post", "tags").unwrap();
        assert_eq!(tags.inverse_kind, EdgeKind::Implicit);
        assert_eq!(tags.inverse_field, implicit_field_name("post", "tags"));

        let implicit = cache
            .resolve(&schema, "tag", &implicit_field_name("post", "tags"))
            .unwrap();
        assert!(implicit.is_implicit());
        assert_eq!(implicit.inverse_field, "tags");
        assert_eq!(implicit.related_type, "post");
    }

    #[test]
    fn missing_inverse_is_a_memoized_error() {
        let schema = SchemaRegistry::new()
            .with_type(
                "post",
                vec![FieldDescriptor::new(
                    "author",
                    RelationshipKind::BelongsTo,
                    "user",
                    Some("articles"),
                )],
            )
            .with_type("user", vec![]);
        let mut cache = DefinitionCache::new();
        let first = cache.resolve(&schema, "post", "author").unwrap_err();
        let second = cache.resolve(&schema, "post", "author").unwrap_err();
        assert_eq!(first, second);
        assert!(matches!(first, DefinitionError::InverseNotFound { .. }));
    }

    #[test]
    fn asymmetric_inverse_is_rejected() {
        let schema = SchemaRegistry::new()
            .with_type(
                "post",
                vec![FieldDescriptor::new(
                    "author",
                    RelationshipKind::BelongsTo,
                    "user",
                    Some("posts"),
                )],
            )
            .with_type(
                "user",
                vec![FieldDescriptor::new(
                    "posts",
                    RelationshipKind::HasMany,
                    "post",
                    Some("editor"),
                )],
            );
        let mut cache = DefinitionCache::new();
        let err = cache.resolve(&schema, "post", "author").unwrap_err();
        assert!(matches!(err, DefinitionError::InverseNotSymmetric { .. }));
    }
}
