// SPDX-License-Identifier: Apache-2.0
// © Tether Project Developers <https://github.com/tether-data/tether>
//! Resource key type shared with the identity collaborator.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

use serde::de::Deserializer;
use serde::ser::{SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};

/// Opaque, stable handle for one logical resource.
///
/// Keys are minted and deduplicated by the external identity cache; the graph
/// only receives them inside operation payloads and uses them as map keys.
/// A key carries its logical `type` (needed for schema resolution), a
/// client-local `lid` that is unique for the lifetime of the store, and an
/// optional server `id` assigned at most once when a placeholder resource is
/// persisted.
///
/// Equality, ordering, and hashing consider `(type, lid)` only, so a key is
/// unaffected by its later `id` assignment and round-trips losslessly through
/// serialization. Cloning is cheap (shared allocation).
#[derive(Debug, Clone)]
pub struct ResourceKey(Arc<KeyData>);

#[derive(Debug)]
struct KeyData {
    ty: Box<str>,
    lid: Box<str>,
    id: OnceLock<Box<str>>,
}

impl ResourceKey {
    /// Builds a key for `(type, lid)`.
    ///
    /// Intended for identity-cache adapters and tests; application code
    /// receives keys from the identity collaborator and never mints them.
    #[must_use]
    pub fn new(ty: impl Into<Box<str>>, lid: impl Into<Box<str>>) -> Self {
        Self(Arc::new(KeyData {
            ty: ty.into(),
            lid: lid.into(),
            id: OnceLock::new(),
        }))
    }

    /// Logical resource type, as the schema service names it.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.0.ty
    }

    /// Client-local identifier, stable for the lifetime of the store.
    #[must_use]
    pub fn lid(&self) -> &str {
        &self.0.lid
    }

    /// Server-assigned identifier, when known.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.0.id.get().map(AsRef::as_ref)
    }

    /// Assigns the server identifier.
    ///
    /// A key's `id` can be assigned at most once (placeholder → persisted).
    /// Returns `false` when an id was already present; the existing value is
    /// left untouched.
    pub fn assign_id(&self, id: impl Into<Box<str>>) -> bool {
        self.0.id.set(id.into()).is_ok()
    }
}

impl PartialEq for ResourceKey {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
            || (self.0.ty == other.0.ty && self.0.lid == other.0.lid)
    }
}

impl Eq for ResourceKey {}

impl Hash for ResourceKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.ty.hash(state);
        self.0.lid.hash(state);
    }
}

impl PartialOrd for ResourceKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ResourceKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .ty
            .cmp(&other.0.ty)
            .then_with(|| self.0.lid.cmp(&other.0.lid))
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.0.ty, self.0.lid)
    }
}

impl Serialize for ResourceKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let id = self.id();
        let fields = if id.is_some() { 3 } else { 2 };
        let mut s = serializer.serialize_struct("ResourceKey", fields)?;
        s.serialize_field("type", self.type_name())?;
        s.serialize_field("lid", self.lid())?;
        if let Some(id) = id {
            s.serialize_field("id", id)?;
        }
        s.end()
    }
}

impl<'de> Deserialize<'de> for ResourceKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct KeyWire {
            #[serde(rename = "type")]
            ty: Box<str>,
            lid: Box<str>,
            #[serde(default)]
            id: Option<Box<str>>,
        }

        let wire = KeyWire::deserialize(deserializer)?;
        let key = Self::new(wire.ty, wire.lid);
        if let Some(id) = wire.id {
            let _ = key.assign_id(id);
        }
        Ok(key)
    }
}
