//! Event handlers.
//!
//! One handler per contract template. A handler reads and stages writes
//! through its [`HandlerScope`]; it never commits. Every required entity is
//! checked before the first write so a skipped event leaves nothing behind.

mod community;
mod factory;
mod strategy;

pub use community::CommunityHandler;
pub use factory::FactoryHandler;
pub use strategy::StrategyHandler;

use std::sync::Arc;

use async_trait::async_trait;
use garden_store::{Address, DataSource, Entity, EntityStore, SourceKind, Transaction, WriteBatch};

use crate::accessor::{
    CallAt, CommunityContract, ContractAccessor, Erc20Contract, FactoryContract, StrategyContract,
};
use crate::error::HandlerError;
use crate::event::{ChainEvent, EventKind};

/// Handles the events of one source kind.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Contract template this handler serves.
    fn source_kind(&self) -> SourceKind;

    /// Events this handler takes. Each must belong to `source_kind`.
    fn event_kinds(&self) -> &'static [EventKind];

    async fn handle(&self, scope: &mut HandlerScope<'_>, event: &ChainEvent) -> Result<(), HandlerError>;
}

/// The handler set for factory, community and strategy sources.
pub fn default_handlers() -> Vec<Arc<dyn EventHandler>> {
    vec![
        Arc::new(FactoryHandler),
        Arc::new(CommunityHandler),
        Arc::new(StrategyHandler),
    ]
}

/// Everything a handler may touch while processing one event.
pub struct HandlerScope<'a> {
    tx: Transaction<'a>,
    accessor: &'a dyn ContractAccessor,
    source: &'a DataSource,
    at: CallAt,
    timestamp: u64,
}

impl<'a> HandlerScope<'a> {
    pub fn new(
        store: &'a dyn EntityStore,
        accessor: &'a dyn ContractAccessor,
        source: &'a DataSource,
        event: &ChainEvent,
    ) -> Self {
        Self {
            tx: Transaction::new(store),
            accessor,
            source,
            at: CallAt {
                chain_id: event.chain_id,
                block_number: event.block_number,
            },
            timestamp: event.block_timestamp,
        }
    }

    /// Contract that emitted the event.
    pub fn address(&self) -> &'a Address {
        &self.source.address
    }

    pub fn chain_id(&self) -> u64 {
        self.source.chain_id
    }

    /// Registry factory the emitting contract descends from.
    pub fn factory(&self) -> &'a Address {
        &self.source.factory
    }

    pub fn block_number(&self) -> u64 {
        self.at.block_number
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn load<E: Entity>(&self, id: &str) -> Result<Option<E>, HandlerError> {
        Ok(self.tx.load(id)?)
    }

    /// Load an entity the event cannot be applied without.
    pub fn require<E: Entity>(&self, id: &str) -> Result<E, HandlerError> {
        self.tx
            .load(id)?
            .ok_or_else(|| HandlerError::not_found(E::KIND, id))
    }

    pub fn exists<E: Entity>(&self, id: &str) -> Result<bool, HandlerError> {
        Ok(self.tx.exists::<E>(id)?)
    }

    /// Entities whose id starts with `prefix`.
    pub fn list_prefix<E: Entity>(&self, prefix: &str) -> Result<Vec<E>, HandlerError> {
        Ok(self.tx.list_prefix(prefix)?)
    }

    pub fn save<E: Entity>(&mut self, entity: &E) -> Result<(), HandlerError> {
        Ok(self.tx.save(entity)?)
    }

    /// Start routing events from `address`, inheriting this source's context.
    pub fn register_source(&mut self, kind: SourceKind, address: Address) {
        self.tx.register_source(DataSource {
            chain_id: self.source.chain_id,
            address,
            kind,
            factory: self.source.factory.clone(),
        });
    }

    pub fn community_contract(&self, address: &Address) -> CommunityContract<'a> {
        CommunityContract::bind(self.accessor, self.at, address)
    }

    pub fn factory_contract(&self, address: &Address) -> FactoryContract<'a> {
        FactoryContract::bind(self.accessor, self.at, address)
    }

    pub fn erc20(&self, address: &Address) -> Erc20Contract<'a> {
        Erc20Contract::bind(self.accessor, self.at, address)
    }

    pub fn strategy_contract(&self, address: &Address) -> StrategyContract<'a> {
        StrategyContract::bind(self.accessor, self.at, address)
    }

    pub fn into_batch(self) -> WriteBatch {
        self.tx.into_batch()
    }
}
