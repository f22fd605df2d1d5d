//! Repository trait for pluggable storage.

use conduit_types::{Connector, ConnectorDefinition, ConnectorType, ConnectorUpdate, View};
use uuid::Uuid;

use crate::error::Result;

/// One page of a list query.
#[derive(Debug, Clone, PartialEq)]
pub struct ListResult<T> {
    /// Rows of this page, newest first.
    pub items: Vec<T>,
    /// Number of rows in the whole scope, independent of the page.
    pub total_size: u64,
    /// Token for the next page; empty when there is none.
    pub next_page_token: String,
}

/// Persistence for connector definitions and connectors.
///
/// Every connector operation is scoped by owner and connector type; a row
/// outside the scope is never returned or modified.
///
/// Implementations must be `Send + Sync`; calls block, so async callers run
/// them on a blocking thread.
pub trait Repository: Send + Sync {
    // ── Connector definitions ────────────────────────────────────────────

    /// Insert a definition, or refresh an existing one with the same UID.
    ///
    /// An existing row keeps its `create_time`.
    fn upsert_definition(&self, definition: &ConnectorDefinition) -> Result<()>;

    /// List definitions of one type.
    ///
    /// `page_size` is clamped (0 → 10, >100 → 100). An empty `page_token`
    /// starts from the newest row.
    fn list_definitions(
        &self,
        connector_type: ConnectorType,
        page_size: u32,
        page_token: &str,
        view: View,
    ) -> Result<ListResult<ConnectorDefinition>>;

    /// Get a definition by id within a type.
    fn get_definition_by_id(
        &self,
        id: &str,
        connector_type: ConnectorType,
        view: View,
    ) -> Result<ConnectorDefinition>;

    /// Get a definition by UID.
    fn get_definition_by_uid(&self, uid: Uuid, view: View) -> Result<ConnectorDefinition>;

    // ── Connectors ───────────────────────────────────────────────────────

    /// Insert a connector. Uniqueness of `(id, owner, type)` is enforced by the store.
    fn create_connector(&self, connector: &Connector) -> Result<()>;

    /// List an owner's connectors of one type.
    fn list_connectors(
        &self,
        owner: &str,
        connector_type: ConnectorType,
        page_size: u32,
        page_token: &str,
        view: View,
    ) -> Result<ListResult<Connector>>;

    /// Get a connector by id.
    fn get_connector_by_id(
        &self,
        id: &str,
        owner: &str,
        connector_type: ConnectorType,
        view: View,
    ) -> Result<Connector>;

    /// Get a connector by UID.
    fn get_connector_by_uid(
        &self,
        uid: Uuid,
        owner: &str,
        connector_type: ConnectorType,
        view: View,
    ) -> Result<Connector>;

    /// Get an owner's connector by UID regardless of type.
    ///
    /// Used where only a permalink is known (e.g. workflow handlers).
    fn lookup_connector(&self, uid: Uuid, owner: &str, view: View) -> Result<Connector>;

    /// Apply the set fields of `update` to the matching connector.
    ///
    /// Matching zero rows is not an error here; callers check existence first.
    fn update_connector(
        &self,
        id: &str,
        owner: &str,
        connector_type: ConnectorType,
        update: &ConnectorUpdate,
    ) -> Result<()>;

    /// Change a connector's id.
    fn rename_connector(
        &self,
        id: &str,
        owner: &str,
        connector_type: ConnectorType,
        new_id: &str,
    ) -> Result<()>;

    /// Delete a connector. Fails with `NotFound` when no row was removed.
    fn delete_connector(&self, id: &str, owner: &str, connector_type: ConnectorType) -> Result<()>;
}
