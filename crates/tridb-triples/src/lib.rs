//! The triple store and everything built directly on it: the document
//! codec (C4), the change-tracking write proxy (C6), and the filter
//! evaluator (C7).

mod codec;
mod entity;
mod filter;
mod path;
mod proxy;
mod store;
mod triple;
mod value;

pub use codec::{
    decode_document, plain_to_triples, timestamped_to_plain, triples_to_timestamped, TimestampedLeaf,
    TimestampedNode, TimestampedObject, TimestampedSet,
};
pub use entity::EntityId;
pub use filter::{evaluate_all, FilterOp, Predicate, Variables};
pub use path::AttributePath;
pub use proxy::EntityStage;
pub use store::TripleStore;
pub use triple::{StoredTripleValue, Triple};
pub use value::Value;
