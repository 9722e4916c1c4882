//! In-memory store, used by tests and by one-shot replays without a database.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;

use crate::address::Address;
use crate::entities::EntityKind;
use crate::error::{Result, StoreError};
use crate::store::{DataSource, EntityStore, EventPosition, WriteBatch};

#[derive(Default)]
struct Inner {
    entities: BTreeMap<EntityKind, BTreeMap<String, String>>,
    cursors: BTreeMap<u64, EventPosition>,
    sources: BTreeMap<(u64, Address), DataSource>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows in a partition.
    pub fn count(&self, kind: EntityKind) -> Result<usize> {
        let inner = self.inner.read()
            .map_err(|e| StoreError::Internal(format!("Lock poisoned: {}", e)))?;
        Ok(inner.entities.get(&kind).map(|rows| rows.len()).unwrap_or(0))
    }
}

impl EntityStore for MemoryStore {
    fn load_raw(&self, kind: EntityKind, id: &str) -> Result<Option<String>> {
        let inner = self.inner.read()
            .map_err(|e| StoreError::Internal(format!("Lock poisoned: {}", e)))?;
        Ok(inner.entities.get(&kind).and_then(|rows| rows.get(id)).cloned())
    }

    fn list_raw(&self, kind: EntityKind) -> Result<Vec<(String, String)>> {
        let inner = self.inner.read()
            .map_err(|e| StoreError::Internal(format!("Lock poisoned: {}", e)))?;
        Ok(inner
            .entities
            .get(&kind)
            .map(|rows| rows.iter().map(|(id, data)| (id.clone(), data.clone())).collect())
            .unwrap_or_default())
    }

    fn list_raw_prefix(&self, kind: EntityKind, prefix: &str) -> Result<Vec<(String, String)>> {
        let inner = self.inner.read()
            .map_err(|e| StoreError::Internal(format!("Lock poisoned: {}", e)))?;
        let Some(rows) = inner.entities.get(&kind) else {
            return Ok(Vec::new());
        };
        Ok(rows
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(id, _)| id.starts_with(prefix))
            .map(|(id, data)| (id.clone(), data.clone()))
            .collect())
    }

    fn cursor(&self, chain_id: u64) -> Result<Option<EventPosition>> {
        let inner = self.inner.read()
            .map_err(|e| StoreError::Internal(format!("Lock poisoned: {}", e)))?;
        Ok(inner.cursors.get(&chain_id).copied())
    }

    fn data_sources(&self) -> Result<Vec<DataSource>> {
        let inner = self.inner.read()
            .map_err(|e| StoreError::Internal(format!("Lock poisoned: {}", e)))?;
        Ok(inner.sources.values().cloned().collect())
    }

    fn commit(&self, batch: WriteBatch) -> Result<()> {
        let mut inner = self.inner.write()
            .map_err(|e| StoreError::Internal(format!("Lock poisoned: {}", e)))?;

        for (kind, id, data) in batch.entities() {
            inner
                .entities
                .entry(kind)
                .or_default()
                .insert(id.to_string(), data.to_string());
        }
        for (chain_id, position) in batch.cursors() {
            inner.cursors.insert(chain_id, position);
        }
        for source in batch.sources() {
            inner
                .sources
                .insert((source.chain_id, source.address.clone()), source.clone());
        }

        Ok(())
    }
}
