// SPDX-License-Identifier: Apache-2.0
// © Tether Project Developers <https://github.com/tether-data/tether>
//! JSON:API-shaped relationship payloads returned by the read accessor.

use serde::{Deserialize, Serialize};

use crate::ident::ResourceKey;

/// Which side of an edge a read reflects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    /// Last server-confirmed content.
    Remote,
    /// Effective content: remote with local overrides applied.
    Local,
}

/// Relationship linkage data.
///
/// The one/many distinction mirrors the edge shape; the wire form is the
/// JSON:API `data` member (`null`/object vs. array).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelationshipData {
    /// To-many linkage, in effective order.
    Many(Vec<ResourceKey>),
    /// To-one linkage; `None` is an explicit empty.
    One(Option<ResourceKey>),
}

/// A `{ data, meta, links }` relationship payload.
///
/// `data: None` (omitted on the wire) means the linkage is unknown — nothing
/// authoritative has been received yet. `data: Some(One(None))` and
/// `data: Some(Many(vec![]))` are known-empty, which is different knowledge.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RelationshipPayload {
    /// Linkage, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<RelationshipData>,
    /// Server-provided metadata, echoed verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
    /// Server-provided links, echoed verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<serde_json::Value>,
}

impl RelationshipPayload {
    /// Payload with known linkage and no side-channels.
    #[must_use]
    pub fn of(data: RelationshipData) -> Self {
        Self {
            data: Some(data),
            meta: None,
            links: None,
        }
    }
}
