//! Garden Store - entity model and persistence for the Gardens indexer
//!
//! Every derived governance record (communities, members, strategies,
//! proposals) is a typed [`Entity`] living in one partition of an
//! [`EntityStore`]. Handlers stage writes in a [`Transaction`] and the caller
//! commits the resulting [`WriteBatch`] atomically together with the chain
//! checkpoint.
//!
//! ## Backends
//!
//! - [`MemoryStore`] - maps behind a lock, for tests and one-shot replays
//! - [`SqliteStore`] - one SQLite file, WAL mode
//!
//! ## Reads
//!
//! [`EntityQuery`] filters, orders and pages a partition by the camelCase
//! field names entities serialise with.

pub mod address;
pub mod amount;
pub mod entities;
pub mod error;
pub mod member_set;
pub mod memory;
pub mod query;
pub mod sqlite;
pub mod store;

pub use address::Address;
pub use amount::Amount;
pub use entities::*;
pub use error::{Result, StoreError};
pub use member_set::MemberSet;
pub use memory::MemoryStore;
pub use query::{Comparison, EntityQuery, Filter, OrderDirection};
pub use sqlite::SqliteStore;
pub use store::{
    DataSource, EntityStore, EntityStoreExt, EventPosition, SourceKind, Transaction, WriteBatch,
};
