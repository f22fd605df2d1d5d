//! Domain services for Conduit.
//!
//! Sits between transports (the CLI) and the infrastructure crates:
//!
//! - **Identity**: resolves the request owner from metadata
//! - **Definitions**: the connector catalog, seeded from the registry
//! - **Connectors**: owner-scoped CRUD plus connect / test / write, with
//!   credentials masked on the way out
//! - **Workflow handler**: bodies of the Check / Write / Delete workflows
//!
//! # Example
//!
//! ```ignore
//! use conduit_domain::DomainServices;
//!
//! let services = DomainServices::new(repository, registry, dispatcher, identity);
//! let owner = services.identity().resolve(&metadata).await?;
//! let page = services
//!     .connectors()
//!     .list(&owner, ConnectorType::Destination, 10, "", View::Basic)
//!     .await?;
//! ```

mod error;
pub mod identity;
pub mod services;

pub use error::{DomainError, ErrorCode, Result};
pub use identity::{
    HttpIdentityLookup, IdentityLookup, IdentityResolver, LookupError, StaticIdentityLookup,
    resolve_caller_owner, with_default_owner,
};
pub use services::DomainServices;
pub use services::batch::{ModelTask, RecordBatch};
pub use services::connectors::{
    ConnectorService, CreateConnector, UpdateConnector, validate_connector_id,
};
pub use services::definitions::DefinitionService;
pub use services::workflow::RegistryWorkflowHandler;
