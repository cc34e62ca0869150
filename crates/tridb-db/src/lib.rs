//! `Db`: the facade wiring the triple store, schema model, and migration
//! executor behind a single public operation surface.

mod db;
pub mod logging;
mod mutation;
mod query;
mod subscription;
mod tx;

pub use db::{Db, DbOptions};
pub use mutation::Mutation;
pub use query::Query;
pub use subscription::Subscription;
pub use tx::Tx;
