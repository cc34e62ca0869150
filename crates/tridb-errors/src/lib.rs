//! Canonical structured error type shared by every `tridb-*` crate.
//!
//! A stable, matchable `kind` plus a builder for attaching context without
//! losing the original cause.

use tridb_core_types::RequestId;

/// Result type alias using [`TdbError`].
pub type Result<T> = std::result::Result<T, TdbError>;

/// Canonical error kind taxonomy.
///
/// Every caller-visible error surfaces here,
/// plus the ambient IO/serialization/internal kinds every crate needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TdbErrorKind {
    /// `fetchById`/`update` referenced an entity that does not exist (or is tombstoned).
    EntityNotFound,
    /// An id supplied to `insert` was malformed (e.g. contains `#`).
    InvalidEntityId,
    /// An internal entity id (`collection#external_id`) failed to parse.
    InvalidInternalEntityId,
    /// A migration's `up`/`down` operation sequence is malformed or unsupported.
    InvalidMigrationOperation,
    /// A `$variable` reference in a filter predicate has no binding.
    SessionVariableNotFound,
    /// A write-rule predicate rejected a staged mutation.
    WriteRuleViolation,
    /// A write targeted a path absent from the collection's schema.
    UnknownAttribute,
    /// A migration's gate (`parent`/`version`) did not match `_schema.version`.
    SchemaVersionMismatch,
    /// The KV adapter reported a write-write conflict at commit.
    TransactionConflict,
    /// A schema, manifest, or document payload failed structural validation.
    InvalidSchema,
    /// A schema-diff round-trip produced a non-identical structure (should never occur).
    DeterminismViolation,
    /// Underlying KV adapter IO failure.
    Io,
    /// `serde_json` (de)serialization failure.
    Serialization,
    /// Unclassified internal invariant violation.
    Internal,
}

impl TdbErrorKind {
    /// Stable error code for this kind, suitable for programmatic matching.
    pub fn code(&self) -> &'static str {
        match self {
            TdbErrorKind::EntityNotFound => "ERR_ENTITY_NOT_FOUND",
            TdbErrorKind::InvalidEntityId => "ERR_INVALID_ENTITY_ID",
            TdbErrorKind::InvalidInternalEntityId => "ERR_INVALID_INTERNAL_ENTITY_ID",
            TdbErrorKind::InvalidMigrationOperation => "ERR_INVALID_MIGRATION_OPERATION",
            TdbErrorKind::SessionVariableNotFound => "ERR_SESSION_VARIABLE_NOT_FOUND",
            TdbErrorKind::WriteRuleViolation => "ERR_WRITE_RULE_VIOLATION",
            TdbErrorKind::UnknownAttribute => "ERR_UNKNOWN_ATTRIBUTE",
            TdbErrorKind::SchemaVersionMismatch => "ERR_SCHEMA_VERSION_MISMATCH",
            TdbErrorKind::TransactionConflict => "ERR_TRANSACTION_CONFLICT",
            TdbErrorKind::InvalidSchema => "ERR_INVALID_SCHEMA",
            TdbErrorKind::DeterminismViolation => "ERR_DETERMINISM_VIOLATION",
            TdbErrorKind::Io => "ERR_IO",
            TdbErrorKind::Serialization => "ERR_SERIALIZATION",
            TdbErrorKind::Internal => "ERR_INTERNAL",
        }
    }
}

/// Canonical structured error type.
#[derive(Debug, Clone)]
pub struct TdbError {
    kind: TdbErrorKind,
    op: Option<String>,
    entity_id: Option<String>,
    request_id: Option<RequestId>,
    message: String,
    source: Option<Box<TdbError>>,
}

impl TdbError {
    pub fn new(kind: TdbErrorKind) -> Self {
        Self {
            kind,
            op: None,
            entity_id: None,
            request_id: None,
            message: String::new(),
            source: None,
        }
    }

    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    pub fn with_entity_id(mut self, id: impl Into<String>) -> Self {
        self.entity_id = Some(id.into());
        self
    }

    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_source(mut self, source: TdbError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> TdbErrorKind {
        self.kind
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    pub fn entity_id(&self) -> Option<&str> {
        self.entity_id.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn source_error(&self) -> Option<&TdbError> {
        self.source.as_deref()
    }
}

impl std::fmt::Display for TdbError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(entity_id) = &self.entity_id {
            write!(f, " (entity_id: {})", entity_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for TdbError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_deref().map(|e| e as &dyn std::error::Error)
    }
}

impl From<serde_json::Error> for TdbError {
    fn from(err: serde_json::Error) -> Self {
        TdbError::new(TdbErrorKind::Serialization)
            .with_op("serde_json")
            .with_message(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code_and_message() {
        let err = TdbError::new(TdbErrorKind::EntityNotFound)
            .with_op("fetch_by_id")
            .with_entity_id("users#1")
            .with_message("no such entity");
        let text = format!("{}", err);
        assert!(text.contains("ERR_ENTITY_NOT_FOUND"));
        assert!(text.contains("fetch_by_id"));
        assert!(text.contains("users#1"));
        assert!(text.contains("no such entity"));
    }

    #[test]
    fn kind_codes_are_distinct() {
        let all = [
            TdbErrorKind::EntityNotFound,
            TdbErrorKind::InvalidEntityId,
            TdbErrorKind::InvalidInternalEntityId,
            TdbErrorKind::InvalidMigrationOperation,
            TdbErrorKind::SessionVariableNotFound,
            TdbErrorKind::WriteRuleViolation,
            TdbErrorKind::UnknownAttribute,
            TdbErrorKind::SchemaVersionMismatch,
            TdbErrorKind::TransactionConflict,
        ];
        let mut codes: Vec<&str> = all.iter().map(|k| k.code()).collect();
        let before = codes.len();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), before);
    }

    #[test]
    fn source_chain_is_preserved() {
        let root = TdbError::new(TdbErrorKind::Io).with_message("disk full");
        let wrapped = TdbError::new(TdbErrorKind::Internal).with_source(root);
        assert_eq!(wrapped.source_error().unwrap().kind(), TdbErrorKind::Io);
    }
}
