//! Connector registry for Conduit.
//!
//! Aggregates independently implemented connector families into one
//! immutable routing table keyed by connector-definition UID, and provides
//! the credential redaction transforms that run over configuration
//! documents using a family's field-sensitivity predicate.
//!
//! - [`family`]: the [`ConnectorFamily`] and [`Connection`] traits.
//! - [`catalog`]: families declared in TOML catalog files.
//! - [`registry`]: the merged, fixed-order [`ConnectorRegistry`].
//! - [`redact`]: mask / strip-if-masked / merge-patch over JSON documents.

pub mod catalog;
pub mod error;
pub mod family;
pub mod redact;
pub mod registry;

pub use catalog::{CatalogConnection, CatalogFamily, load_catalog_dir};
pub use error::{RegistryError, Result};
pub use family::{Connection, ConnectorFamily, FamilyKind};
pub use redact::{MASK_SENTINEL, mask_credentials, merge_patch, strip_masked_credentials};
pub use registry::ConnectorRegistry;
