//! Garden Indexer - event-to-state mapping for Gardens conviction voting
//!
//! Consumes the ordered log stream of the registry factory, its communities
//! and their conviction-voting strategies, and maintains the derived
//! governance entities in a [`garden_store::EntityStore`].
//!
//! ## Flow
//!
//! ```text
//! ChainEvent ─► Router ─► EventHandler ─► (ContractAccessor reads)
//!                  │            │
//!                  │            └─► Transaction (staged writes)
//!                  └─► EntityStore::commit(writes + checkpoint)
//! ```
//!
//! ## Handlers
//!
//! | Source    | Handler            | Events |
//! |-----------|--------------------|--------|
//! | Factory   | `FactoryHandler`   | community creation, protocol fee, validity |
//! | Community | `CommunityHandler` | registration, stake, strategy lifecycle, governance |
//! | Strategy  | `StrategyHandler`  | points, proposals, support, disputes, allowlists |

pub mod accessor;
pub mod config;
pub mod conviction;
pub mod error;
pub mod event;
pub mod handlers;
pub mod router;

pub use accessor::{AccessorError, CallAt, ContractAccessor, RecordedAccessor, ViewCall, ViewValue};
pub use config::{ChainConfig, IndexerConfig};
pub use error::{HandlerError, IndexerError, Result};
pub use event::{ChainEvent, EventKind, EventPayload};
pub use handlers::{default_handlers, EventHandler, HandlerScope};
pub use router::{Outcome, Router, RunStats};
