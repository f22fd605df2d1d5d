//! Shared types for the Conduit connector control plane.
//!
//! - [`connector`]: connector definitions, tenant-owned connectors, and the
//!   enums that scope them (type, state, view).
//! - [`resource`]: parsing of resource names (`collection/id`) and permalinks
//!   (`kind/uid`), plus the request metadata that carries caller identity.

pub mod connector;
pub mod error;
pub mod resource;

pub use connector::{
    Connector, ConnectorDefinition, ConnectorState, ConnectorType, ConnectorUpdate, Owner, View,
    timestamp_now,
};
pub use error::{ResourceError, Result};
pub use resource::{
    HEADER_OWNER_ID, HEADER_OWNER_UID, RequestMetadata, extract_resource_id,
    extract_uid_from_permalink, split_collection_and_id,
};
