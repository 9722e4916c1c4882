//! Event router.
//!
//! Resolves the data source that emitted an event, picks the one handler for
//! its kind and commits the handler's staged writes together with the chain
//! checkpoint. Events of one chain must be fed in log order.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use garden_store::{Address, DataSource, EntityStore, SourceKind, WriteBatch};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::accessor::ContractAccessor;
use crate::config::ChainConfig;
use crate::error::{IndexerError, Result};
use crate::event::{ChainEvent, EventKind};
use crate::handlers::{default_handlers, EventHandler, HandlerScope};

/// What happened to one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Handler succeeded; writes and checkpoint committed
    Applied,
    /// A required entity was missing; only the checkpoint advanced
    Skipped,
    /// At or before the chain checkpoint
    AlreadyApplied,
    /// Unknown source or before the chain's start block
    Ignored,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub applied: u64,
    pub skipped: u64,
    pub already_applied: u64,
    pub ignored: u64,
}

impl RunStats {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Applied => self.applied += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::AlreadyApplied => self.already_applied += 1,
            Outcome::Ignored => self.ignored += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.applied + self.skipped + self.already_applied + self.ignored
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "applied={} skipped={} already_applied={} ignored={}",
            self.applied, self.skipped, self.already_applied, self.ignored
        )
    }
}

pub struct Router {
    store: Arc<dyn EntityStore>,
    accessor: Arc<dyn ContractAccessor>,
    handlers: HashMap<EventKind, Arc<dyn EventHandler>>,
    sources: HashMap<(u64, Address), DataSource>,
    start_blocks: HashMap<u64, u64>,
    stats: RunStats,
}

impl Router {
    /// Build a router, validating the handler table and seeding the
    /// configured factories as data sources.
    pub fn new(
        store: Arc<dyn EntityStore>,
        accessor: Arc<dyn ContractAccessor>,
        handlers: Vec<Arc<dyn EventHandler>>,
        chains: &[ChainConfig],
    ) -> Result<Self> {
        let handlers = build_handler_table(handlers)?;

        let mut sources: HashMap<(u64, Address), DataSource> = store
            .data_sources()?
            .into_iter()
            .map(|source| ((source.chain_id, source.address.clone()), source))
            .collect();

        let mut seed = WriteBatch::new();
        for chain in chains {
            let key = (chain.chain_id, chain.factory.clone());
            if sources.contains_key(&key) {
                continue;
            }
            let source = DataSource {
                chain_id: chain.chain_id,
                address: chain.factory.clone(),
                kind: SourceKind::Factory,
                factory: chain.factory.clone(),
            };
            info!(chain_id = chain.chain_id, factory = %chain.factory, "Seeded registry factory source");
            seed.add_source(source.clone());
            sources.insert(key, source);
        }
        if !seed.sources().is_empty() {
            store.commit(seed)?;
        }

        let start_blocks = chains
            .iter()
            .map(|chain| (chain.chain_id, chain.start_block))
            .collect();

        Ok(Self {
            store,
            accessor,
            handlers,
            sources,
            start_blocks,
            stats: RunStats::default(),
        })
    }

    pub fn with_default_handlers(
        store: Arc<dyn EntityStore>,
        accessor: Arc<dyn ContractAccessor>,
        chains: &[ChainConfig],
    ) -> Result<Self> {
        Self::new(store, accessor, default_handlers(), chains)
    }

    /// Apply one event.
    ///
    /// Returns an error only for fatal conditions; the caller must stop
    /// feeding events of that chain.
    pub async fn process(&mut self, event: &ChainEvent) -> Result<Outcome> {
        let outcome = self.route(event).await?;
        self.stats.record(outcome);
        Ok(outcome)
    }

    /// Apply events in order, stopping at the first fatal error.
    pub async fn run<'e, I>(&mut self, events: I) -> Result<RunStats>
    where
        I: IntoIterator<Item = &'e ChainEvent>,
    {
        for event in events {
            self.process(event).await?;
        }
        Ok(self.stats.clone())
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn is_registered(&self, chain_id: u64, address: &Address) -> bool {
        self.sources.contains_key(&(chain_id, address.clone()))
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    async fn route(&mut self, event: &ChainEvent) -> Result<Outcome> {
        let chain_id = event.chain_id;
        let kind = event.kind();
        let position = event.position();

        if let Some(start_block) = self.start_blocks.get(&chain_id) {
            if event.block_number < *start_block {
                debug!(chain_id, kind = %kind, position = %position, start_block, "Before start block");
                return Ok(Outcome::Ignored);
            }
        }

        if let Some(cursor) = self.store.cursor(chain_id)? {
            if position <= cursor {
                debug!(chain_id, kind = %kind, position = %position, cursor = %cursor, "Already applied");
                return Ok(Outcome::AlreadyApplied);
            }
        }

        let Some(source) = self.sources.get(&(chain_id, event.source.clone())).cloned() else {
            debug!(chain_id, kind = %kind, source = %event.source, "Event from unregistered source");
            return Ok(Outcome::Ignored);
        };

        if kind.scope() != source.kind {
            return Err(IndexerError::Unroutable {
                kind,
                source_kind: source.kind,
                address: source.address,
            });
        }

        let handler = self
            .handlers
            .get(&kind)
            .cloned()
            .ok_or(IndexerError::MissingHandler(kind))?;
        let store = Arc::clone(&self.store);
        let accessor = Arc::clone(&self.accessor);

        let mut scope = HandlerScope::new(store.as_ref(), accessor.as_ref(), &source, event);
        let result = handler.handle(&mut scope, event).await;
        let mut batch = scope.into_batch();

        match result {
            Ok(()) => {
                batch.set_cursor(chain_id, position);
                let registered = batch.sources().to_vec();
                store.commit(batch)?;

                for source in registered {
                    debug!(chain_id, address = %source.address, kind = %source.kind, "Routing new source");
                    self.sources
                        .insert((source.chain_id, source.address.clone()), source);
                }
                Ok(Outcome::Applied)
            }
            Err(err) if !err.is_fatal() => {
                error!(
                    chain_id,
                    kind = %kind,
                    position = %position,
                    source = %source.address,
                    error = %err,
                    "Precondition failed, skipping event"
                );
                let mut batch = WriteBatch::new();
                batch.set_cursor(chain_id, position);
                store.commit(batch)?;
                Ok(Outcome::Skipped)
            }
            Err(err) => Err(IndexerError::Handler {
                chain_id,
                kind,
                position,
                error: err,
            }),
        }
    }
}

/// Index handlers by event kind; every kind must be served exactly once by a
/// handler of the matching source kind.
fn build_handler_table(
    handlers: Vec<Arc<dyn EventHandler>>,
) -> Result<HashMap<EventKind, Arc<dyn EventHandler>>> {
    let mut table: HashMap<EventKind, Arc<dyn EventHandler>> = HashMap::new();

    for handler in handlers {
        for &kind in handler.event_kinds() {
            if kind.scope() != handler.source_kind() {
                return Err(IndexerError::Config(format!(
                    "{} handler declares {}, which belongs to {} sources",
                    handler.source_kind(),
                    kind,
                    kind.scope()
                )));
            }
            if table.insert(kind, Arc::clone(&handler)).is_some() {
                return Err(IndexerError::DuplicateHandler(kind));
            }
        }
    }

    if let Some(kind) = EventKind::ALL.into_iter().find(|kind| !table.contains_key(kind)) {
        return Err(IndexerError::MissingHandler(kind));
    }
    Ok(table)
}
