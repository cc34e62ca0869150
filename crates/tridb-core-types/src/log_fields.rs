//! Canonical structured-log field and event names.
//!
//! Shared so that every crate's `tracing` spans use the same keys.

pub const FIELD_COMPONENT: &str = "component";
pub const FIELD_OP: &str = "op";
pub const FIELD_EVENT: &str = "event";
pub const FIELD_DURATION_MS: &str = "duration_ms";
pub const FIELD_REQUEST_ID: &str = "request_id";

pub const FIELD_COLLECTION: &str = "collection";
pub const FIELD_ENTITY_ID: &str = "entity_id";
pub const FIELD_ATTRIBUTE_PATH: &str = "attribute_path";

pub const FIELD_ERR_KIND: &str = "err.kind";
pub const FIELD_ERR_CODE: &str = "err.code";

pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";
