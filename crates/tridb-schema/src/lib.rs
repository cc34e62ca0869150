//! Schema model (C5): typed attribute descriptors and the declarative
//! schema builder.

mod builder;
mod descriptor;
mod model;

pub use builder::{CollectionBuilder, SchemaBuilder};
pub use descriptor::{AttributeDescriptor, AttributeOptions, DefaultSpec};
pub use model::{AttributeMap, CollectionDef, OpaqueMatcher, RoleDef, Schema};
