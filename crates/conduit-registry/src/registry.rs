//! The merged connector registry.

use std::collections::HashMap;
use std::sync::Arc;

use conduit_types::{ConnectorDefinition, ConnectorType};
use serde_json::Value;
use uuid::Uuid;

use crate::error::RegistryError;
use crate::family::{Connection, ConnectorFamily, FamilyKind};
use crate::redact::{mask_credentials, strip_masked_credentials};
use crate::Result;

/// Immutable routing table from definition UID to connector family.
///
/// Built once at startup from a list of families and then shared read-only
/// (wrap in `Arc`) by every request-handling task.
pub struct ConnectorRegistry {
    /// Families in fixed iteration order.
    families: Vec<Arc<dyn ConnectorFamily>>,
    /// Definition UIDs in registration order.
    uids: Vec<Uuid>,
    /// Definition UID → index into `families`.
    routes: HashMap<Uuid, usize>,
}

impl ConnectorRegistry {
    /// Build the registry.
    ///
    /// Families are ordered Destination, Source, Blockchain, AI (the given
    /// order is kept among families of the same kind). A UID declared twice,
    /// or a definition id declared twice for one connector type, is a fatal
    /// error.
    pub fn build(mut families: Vec<Arc<dyn ConnectorFamily>>) -> Result<Self> {
        families.sort_by_key(|f| f.kind().rank());

        let mut uids = Vec::new();
        let mut routes: HashMap<Uuid, usize> = HashMap::new();
        let mut ids: HashMap<(ConnectorType, String), usize> = HashMap::new();

        for (idx, family) in families.iter().enumerate() {
            for uid in family.list_definition_uids() {
                if let Some(&existing) = routes.get(&uid) {
                    let err = RegistryError::DuplicateUid {
                        uid,
                        first: families[existing].kind(),
                        second: family.kind(),
                    };
                    tracing::error!(error = %err, "Connector registry build failed");
                    return Err(err);
                }
                let definition = family
                    .definition_by_uid(uid)
                    .ok_or_else(|| RegistryError::UnknownDefinition(uid.to_string()))?;
                let key = (definition.connector_type, definition.id.clone());
                if ids.insert(key, idx).is_some() {
                    let err = RegistryError::DuplicateId {
                        id: definition.id.clone(),
                        connector_type: definition.connector_type,
                    };
                    tracing::error!(error = %err, "Connector registry build failed");
                    return Err(err);
                }
                routes.insert(uid, idx);
                uids.push(uid);
            }
        }

        tracing::info!(
            families = families.len(),
            definitions = uids.len(),
            "Connector registry built"
        );
        Ok(Self {
            families,
            uids,
            routes,
        })
    }

    /// Create a live connection for a definition.
    ///
    /// The owning family is found by membership test in fixed family order;
    /// the configuration is passed through unmodified.
    pub fn dispatch(&self, definition_uid: Uuid, configuration: &Value) -> Result<Box<dyn Connection>> {
        let family = self
            .families
            .iter()
            .find(|f| f.has_uid(definition_uid))
            .ok_or_else(|| RegistryError::UnknownDefinition(definition_uid.to_string()))?;
        tracing::debug!(family = %family.kind(), definition = %definition_uid, "Dispatching connection");
        family.create_connection(definition_uid, configuration)
    }

    /// All definition UIDs, in registration order.
    pub fn list_definition_uids(&self) -> Vec<Uuid> {
        self.uids.clone()
    }

    /// All definitions, in registration order.
    pub fn definitions(&self) -> impl Iterator<Item = &ConnectorDefinition> + '_ {
        self.uids.iter().filter_map(|uid| self.lookup(*uid))
    }

    /// Look up a definition by UID.
    pub fn definition_by_uid(&self, uid: Uuid) -> Result<&ConnectorDefinition> {
        self.lookup(uid)
            .ok_or_else(|| RegistryError::UnknownDefinition(uid.to_string()))
    }

    /// Look up a definition by id within a connector type.
    pub fn definition_by_id(&self, id: &str, connector_type: ConnectorType) -> Option<&ConnectorDefinition> {
        self.families
            .iter()
            .filter(|f| f.kind().connector_type() == connector_type)
            .find_map(|f| f.definition_by_id(id))
    }

    /// Family owning a UID.
    pub fn family_of(&self, uid: Uuid) -> Option<FamilyKind> {
        self.routes.get(&uid).map(|&i| self.families[i].kind())
    }

    /// Whether `path` is a credential field of the definition.
    pub fn is_credential_field(&self, definition_uid: Uuid, path: &str) -> Result<bool> {
        let (family, definition) = self.route(definition_uid)?;
        Ok(family.is_credential_field(&definition.id, path))
    }

    /// Mask the credential fields of a configuration in place.
    pub fn mask(&self, definition_uid: Uuid, configuration: &mut Value) -> Result<()> {
        let (family, definition) = self.route(definition_uid)?;
        mask_credentials(configuration, &|path: &str| {
            family.is_credential_field(&definition.id, path)
        });
        Ok(())
    }

    /// Masked copy of a configuration, for display and logging.
    pub fn masked(&self, definition_uid: Uuid, configuration: &Value) -> Result<Value> {
        let mut copy = configuration.clone();
        self.mask(definition_uid, &mut copy)?;
        Ok(copy)
    }

    /// Remove credential fields still holding the mask sentinel.
    pub fn strip_masked(&self, definition_uid: Uuid, configuration: &mut Value) -> Result<()> {
        let (family, definition) = self.route(definition_uid)?;
        strip_masked_credentials(configuration, &|path: &str| {
            family.is_credential_field(&definition.id, path)
        });
        Ok(())
    }

    /// Number of registered definitions.
    pub fn len(&self) -> usize {
        self.uids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uids.is_empty()
    }

    fn lookup(&self, uid: Uuid) -> Option<&ConnectorDefinition> {
        self.routes
            .get(&uid)
            .and_then(|&i| self.families[i].definition_by_uid(uid))
    }

    fn route(&self, uid: Uuid) -> Result<(&dyn ConnectorFamily, &ConnectorDefinition)> {
        let idx = *self
            .routes
            .get(&uid)
            .ok_or_else(|| RegistryError::UnknownDefinition(uid.to_string()))?;
        let family = self.families[idx].as_ref();
        let definition = family
            .definition_by_uid(uid)
            .ok_or_else(|| RegistryError::UnknownDefinition(uid.to_string()))?;
        Ok((family, definition))
    }
}
