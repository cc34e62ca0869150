//! Entity identifiers (`E = <collection>#<externalId>`).

use serde::{Deserialize, Serialize};
use std::fmt;
use tridb_errors::{Result, TdbError, TdbErrorKind};

/// A fully-qualified entity id: a collection name plus an external id
/// unique within that collection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId {
    collection: String,
    external_id: String,
}

impl EntityId {
    /// Build an `EntityId` from parts, validating the external id doesn't
    /// contain `#` (it would make the internal `collection#external_id`
    /// form ambiguous to parse back).
    pub fn new(collection: impl Into<String>, external_id: impl Into<String>) -> Result<Self> {
        let external_id = external_id.into();
        validate_external_id(&external_id)?;
        Ok(Self {
            collection: collection.into(),
            external_id,
        })
    }

    /// Parse the internal `collection#external_id` form.
    pub fn parse(internal: &str) -> Result<Self> {
        let (collection, external_id) = internal.split_once('#').ok_or_else(|| {
            TdbError::new(TdbErrorKind::InvalidInternalEntityId)
                .with_op("entity_id::parse")
                .with_message(format!("missing '#' separator in '{internal}'"))
        })?;
        if external_id.contains('#') {
            return Err(TdbError::new(TdbErrorKind::InvalidInternalEntityId)
                .with_op("entity_id::parse")
                .with_message(format!("more than one '#' in '{internal}'")));
        }
        Ok(Self {
            collection: collection.to_string(),
            external_id: external_id.to_string(),
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn external_id(&self) -> &str {
        &self.external_id
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.collection, self.external_id)
    }
}

fn validate_external_id(id: &str) -> Result<()> {
    if id.contains('#') {
        return Err(TdbError::new(TdbErrorKind::InvalidEntityId)
            .with_op("entity_id::new")
            .with_message(format!("external id '{id}' must not contain '#'")));
    }
    Ok(())
}
