//! SQLite-backed entity store.
//!
//! ## Tables
//!
//! - `entities` - JSON record per `(kind, id)`
//! - `cursors` - last committed log position per chain
//! - `data_sources` - registered factory, community and strategy contracts

pub mod schema;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::address::Address;
use crate::entities::EntityKind;
use crate::error::{Result, StoreError};
use crate::store::{prefix_end, DataSource, EntityStore, EventPosition, WriteBatch};

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database file
    pub fn open(path: &Path) -> Result<Self> {
        info!("Opening SQLite database at {:?}", path);

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        Self::with_connection(conn)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        debug!("Opening in-memory SQLite database");
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        schema::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock()
            .map_err(|e| StoreError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&conn)
    }
}

impl EntityStore for SqliteStore {
    fn load_raw(&self, kind: EntityKind, id: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let data = conn
                .query_row(
                    "SELECT data FROM entities WHERE kind = ?1 AND id = ?2",
                    params![kind.as_str(), id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(data)
        })
    }

    fn list_raw(&self, kind: EntityKind) -> Result<Vec<(String, String)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, data FROM entities WHERE kind = ?1 ORDER BY id")?;
            let rows = stmt
                .query_map([kind.as_str()], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<(String, String)>, _>>()?;
            Ok(rows)
        })
    }

    fn list_raw_prefix(&self, kind: EntityKind, prefix: &str) -> Result<Vec<(String, String)>> {
        let Some(end) = prefix_end(prefix) else {
            return self.list_raw(kind);
        };
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, data FROM entities WHERE kind = ?1 AND id >= ?2 AND id < ?3 ORDER BY id",
            )?;
            let rows = stmt
                .query_map(params![kind.as_str(), prefix, end], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<(String, String)>, _>>()?;
            Ok(rows)
        })?;
        Ok(rows.into_iter().filter(|(id, _)| id.starts_with(prefix)).collect())
    }

    fn cursor(&self, chain_id: u64) -> Result<Option<EventPosition>> {
        self.with_conn(|conn| {
            let position = conn
                .query_row(
                    "SELECT block_number, transaction_index, log_index FROM cursors WHERE chain_id = ?1",
                    [chain_id as i64],
                    |row| {
                        Ok(EventPosition {
                            block_number: row.get::<_, i64>(0)? as u64,
                            transaction_index: row.get::<_, i64>(1)? as u64,
                            log_index: row.get::<_, i64>(2)? as u64,
                        })
                    },
                )
                .optional()?;
            Ok(position)
        })
    }

    fn data_sources(&self) -> Result<Vec<DataSource>> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT chain_id, address, kind, factory FROM data_sources ORDER BY chain_id, address",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        rows.into_iter()
            .map(|(chain_id, address, kind, factory)| {
                Ok(DataSource {
                    chain_id: chain_id as u64,
                    address: Address::parse(&address)?,
                    kind: kind.parse()?,
                    factory: Address::parse(&factory)?,
                })
            })
            .collect()
    }

    fn commit(&self, batch: WriteBatch) -> Result<()> {
        let mut conn = self.conn.lock()
            .map_err(|e| StoreError::Internal(format!("Lock poisoned: {}", e)))?;
        let tx = conn.transaction()?;

        for (kind, id, data) in batch.entities() {
            tx.execute(
                "INSERT INTO entities (kind, id, data) VALUES (?1, ?2, ?3)
                 ON CONFLICT(kind, id) DO UPDATE SET data = excluded.data",
                params![kind.as_str(), id, data],
            )?;
        }

        for (chain_id, position) in batch.cursors() {
            tx.execute(
                "INSERT INTO cursors (chain_id, block_number, transaction_index, log_index)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(chain_id) DO UPDATE SET
                    block_number = excluded.block_number,
                    transaction_index = excluded.transaction_index,
                    log_index = excluded.log_index",
                params![
                    chain_id as i64,
                    position.block_number as i64,
                    position.transaction_index as i64,
                    position.log_index as i64
                ],
            )?;
        }

        for source in batch.sources() {
            tx.execute(
                "INSERT INTO data_sources (chain_id, address, kind, factory) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(chain_id, address) DO UPDATE SET
                    kind = excluded.kind,
                    factory = excluded.factory",
                params![
                    source.chain_id as i64,
                    source.address.as_str(),
                    source.kind.as_str(),
                    source.factory.as_str()
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }
}
