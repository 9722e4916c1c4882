//! Store abstraction, write batches and the per-event transaction overlay.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::address::Address;
use crate::entities::{Entity, EntityKind};
use crate::error::{Result, StoreError};

/// Position of a log inside one chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPosition {
    pub block_number: u64,
    pub transaction_index: u64,
    pub log_index: u64,
}

impl fmt::Display for EventPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.block_number, self.transaction_index, self.log_index)
    }
}

/// Contract template an event source was registered as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SourceKind {
    Factory,
    Community,
    Strategy,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Factory => "factory",
            SourceKind::Community => "community",
            SourceKind::Strategy => "strategy",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = StoreError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "factory" => Ok(SourceKind::Factory),
            "community" => Ok(SourceKind::Community),
            "strategy" => Ok(SourceKind::Strategy),
            other => Err(StoreError::Internal(format!("Unknown source kind: {}", other))),
        }
    }
}

/// A contract whose events are routed, plus the context its handlers receive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSource {
    pub chain_id: u64,
    pub address: Address,
    pub kind: SourceKind,
    /// Factory that (transitively) created this source.
    pub factory: Address,
}

/// Everything one event writes, committed as a unit.
#[derive(Debug, Default)]
pub struct WriteBatch {
    entities: BTreeMap<(EntityKind, String), String>,
    cursors: BTreeMap<u64, EventPosition>,
    sources: Vec<DataSource>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_raw(&mut self, kind: EntityKind, id: impl Into<String>, data: String) {
        self.entities.insert((kind, id.into()), data);
    }

    pub fn set_cursor(&mut self, chain_id: u64, position: EventPosition) {
        self.cursors.insert(chain_id, position);
    }

    pub fn add_source(&mut self, source: DataSource) {
        self.sources.push(source);
    }

    pub fn entities(&self) -> impl Iterator<Item = (EntityKind, &str, &str)> {
        self.entities
            .iter()
            .map(|((kind, id), data)| (*kind, id.as_str(), data.as_str()))
    }

    pub fn cursors(&self) -> impl Iterator<Item = (u64, EventPosition)> + '_ {
        self.cursors.iter().map(|(chain, pos)| (*chain, *pos))
    }

    pub fn sources(&self) -> &[DataSource] {
        &self.sources
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    fn get_raw(&self, kind: EntityKind, id: &str) -> Option<&String> {
        self.entities.get(&(kind, id.to_string()))
    }
}

/// Durable entity storage: one partition per kind, plus per-chain checkpoints
/// and the registered data sources.
///
/// Entities are stored as their JSON encoding. `commit` must apply a batch
/// atomically.
pub trait EntityStore: Send + Sync {
    /// Load one row's encoded form.
    fn load_raw(&self, kind: EntityKind, id: &str) -> Result<Option<String>>;

    /// All rows of a partition as `(id, data)`, ordered by id.
    fn list_raw(&self, kind: EntityKind) -> Result<Vec<(String, String)>>;

    /// Rows of a partition whose id starts with `prefix`, ordered by id.
    fn list_raw_prefix(&self, kind: EntityKind, prefix: &str) -> Result<Vec<(String, String)>>;

    /// Last committed event position for a chain.
    fn cursor(&self, chain_id: u64) -> Result<Option<EventPosition>>;

    /// Every registered data source.
    fn data_sources(&self) -> Result<Vec<DataSource>>;

    fn commit(&self, batch: WriteBatch) -> Result<()>;

    /// SHA-256 over every partition in id order, hex encoded.
    fn digest(&self) -> Result<String> {
        let mut hasher = Sha256::new();
        for kind in EntityKind::ALL {
            for (id, data) in self.list_raw(kind)? {
                hasher.update(kind.as_str().as_bytes());
                hasher.update([0u8]);
                hasher.update(id.as_bytes());
                hasher.update([0u8]);
                hasher.update(data.as_bytes());
                hasher.update([0u8]);
            }
        }
        Ok(hex::encode(hasher.finalize()))
    }
}

/// Typed access for any store, including `dyn EntityStore`.
pub trait EntityStoreExt {
    fn load<E: Entity>(&self, id: &str) -> Result<Option<E>>;
    fn list<E: Entity>(&self) -> Result<Vec<E>>;
}

impl<T: EntityStore + ?Sized> EntityStoreExt for T {
    fn load<E: Entity>(&self, id: &str) -> Result<Option<E>> {
        match self.load_raw(E::KIND, id)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn list<E: Entity>(&self) -> Result<Vec<E>> {
        self.list_raw(E::KIND)?
            .into_iter()
            .map(|(_, raw)| serde_json::from_str(&raw).map_err(StoreError::from))
            .collect()
    }
}

/// Staged writes over a store. Reads see the staged rows first.
///
/// Nothing reaches the store until the owner turns the transaction into a
/// batch and commits it.
pub struct Transaction<'a> {
    store: &'a dyn EntityStore,
    batch: WriteBatch,
}

impl<'a> Transaction<'a> {
    pub fn new(store: &'a dyn EntityStore) -> Self {
        Self {
            store,
            batch: WriteBatch::new(),
        }
    }

    pub fn load<E: Entity>(&self, id: &str) -> Result<Option<E>> {
        match self.batch.get_raw(E::KIND, id) {
            Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
            None => self.store.load(id),
        }
    }

    pub fn exists<E: Entity>(&self, id: &str) -> Result<bool> {
        if self.batch.get_raw(E::KIND, id).is_some() {
            return Ok(true);
        }
        Ok(self.store.load_raw(E::KIND, id)?.is_some())
    }

    pub fn save<E: Entity>(&mut self, entity: &E) -> Result<()> {
        let raw = serde_json::to_string(entity)?;
        self.batch.put_raw(E::KIND, entity.id(), raw);
        Ok(())
    }

    /// Rows whose id starts with `prefix`, staged rows overriding stored ones,
    /// in id order.
    pub fn list_prefix<E: Entity>(&self, prefix: &str) -> Result<Vec<E>> {
        let mut rows: BTreeMap<String, String> = self
            .store
            .list_raw_prefix(E::KIND, prefix)?
            .into_iter()
            .collect();
        let staged = self
            .batch
            .entities
            .range::<(EntityKind, String), _>((
                Bound::Included((E::KIND, prefix.to_string())),
                Bound::Unbounded,
            ))
            .take_while(|((kind, id), _)| *kind == E::KIND && id.starts_with(prefix));
        for ((_, id), data) in staged {
            rows.insert(id.clone(), data.clone());
        }
        rows.values()
            .map(|raw| serde_json::from_str(raw).map_err(StoreError::from))
            .collect()
    }

    pub fn register_source(&mut self, source: DataSource) {
        self.batch.add_source(source);
    }

    pub fn staged(&self) -> usize {
        self.batch.entity_count()
    }

    pub fn into_batch(self) -> WriteBatch {
        self.batch
    }
}

/// Smallest string ordered after every string that starts with `prefix`.
///
/// `None` when no such bound exists, i.e. the prefix is empty or made only of
/// `char::MAX`.
pub fn prefix_end(prefix: &str) -> Option<String> {
    let mut chars: Vec<char> = prefix.chars().collect();
    while let Some(last) = chars.pop() {
        if let Some(next) = (last as u32 + 1..=char::MAX as u32).find_map(char::from_u32) {
            chars.push(next);
            return Some(chars.into_iter().collect());
        }
    }
    None
}
