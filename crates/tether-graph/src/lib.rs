// SPDX-License-Identifier: Apache-2.0
// © Tether Project Developers <https://github.com/tether-data/tether>
//! tether-graph: the relationship graph of a client-side resource store.
//!
//! Tracks every belongs-to/has-many link between resources as data streams
//! in from asynchronous loads and is edited locally, separating
//! server-confirmed (remote) state from unsaved (local) overrides, computing
//! the effective diffed view the application observes, and keeping both
//! sides of every bidirectional relationship consistent — including
//! synthesized back-references for one-sided relationships, identity merges,
//! and teardown when a resource is unloaded.
//!
//! Resources are addressed only by opaque [`ResourceKey`]s from the identity
//! collaborator; relationship shapes come from the schema collaborator
//! (`tether-schema`). Network and rendering concerns live upstream: remote
//! data enters through [`Graph::push`], local edits through
//! [`Graph::update`], and observers consume the batched change signals from
//! [`Graph::drain_notifications`].

mod collection_edge;
mod definition;
mod edge;
mod graph;
mod ident;
mod implicit_edge;
mod notify;
mod ops;
mod payload;
mod resource_edge;
mod state;

pub use collection_edge::CollectionEdge;
pub use definition::{implicit_field_name, DefinitionCache, DefinitionError, EdgeDefinition, EdgeKind};
pub use edge::Edge;
pub use graph::{Graph, GraphError};
pub use ident::ResourceKey;
pub use implicit_edge::ImplicitEdge;
pub use notify::{ChangedRelationship, NotificationBatch};
pub use ops::{LocalMutation, RelationshipValue, RemoteOp};
pub use payload::{RelationshipData, RelationshipPayload, View};
pub use resource_edge::ResourceEdge;
pub use state::RelationshipState;
