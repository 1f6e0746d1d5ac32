use crate::factory::{EventRecord, StandardFactory};
use crate::{CustodyError, Result};
use rocksdb::{ColumnFamily, Direction, IteratorMode, Options, WriteBatch, DB};
use std::path::Path;
use tracing::debug;

/// Database column families
pub const CF_STATE: &str = "state";
pub const CF_EVENTS: &str = "events";
pub const CF_METADATA: &str = "metadata";

const FACTORY_KEY: &[u8] = b"factory";
const EVENT_COUNT_KEY: &[u8] = b"event_count";

/// Persistent factory store.
///
/// Holds the latest factory snapshot plus the event log keyed by sequence
/// number. Both are written in a single batch so a crash never leaves a
/// snapshot without its events.
pub struct FactoryStore {
    db: DB,
}

impl FactoryStore {
    /// Open or create the store at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let column_families = vec![CF_STATE, CF_EVENTS, CF_METADATA];

        let db = DB::open_cf(&opts, path, column_families)
            .map_err(|e| CustodyError::StorageError(format!("Failed to open database: {}", e)))?;

        Ok(Self { db })
    }

    /// Open an existing store without taking the write lock.
    ///
    /// The handle sees the data as of the moment it was opened.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        let opts = Options::default();
        let column_families = vec![CF_STATE, CF_EVENTS, CF_METADATA];

        let db = DB::open_cf_for_read_only(&opts, path, column_families, false)
            .map_err(|e| CustodyError::StorageError(format!("Failed to open database: {}", e)))?;

        Ok(Self { db })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| CustodyError::StorageError(format!("{} column family not found", name)))
    }

    /// Load the latest factory snapshot, if one was committed
    pub fn load_factory(&self) -> Result<Option<StandardFactory>> {
        let cf_state = self.cf(CF_STATE)?;

        match self.db.get_cf(cf_state, FACTORY_KEY) {
            Ok(Some(data)) => {
                let factory = bincode::deserialize(&data).map_err(|e| {
                    CustodyError::SerializationError(format!("Failed to deserialize factory: {}", e))
                })?;
                Ok(Some(factory))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(CustodyError::StorageError(format!("Failed to load factory: {}", e))),
        }
    }

    /// Number of events persisted so far
    pub fn event_count(&self) -> Result<u64> {
        let cf_metadata = self.cf(CF_METADATA)?;

        match self.db.get_cf(cf_metadata, EVENT_COUNT_KEY) {
            Ok(Some(bytes)) => {
                let bytes: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    CustodyError::StorageError("Corrupt event count".to_string())
                })?;
                Ok(u64::from_le_bytes(bytes))
            }
            Ok(None) => Ok(0),
            Err(e) => Err(CustodyError::StorageError(format!("Failed to read event count: {}", e))),
        }
    }

    /// Persist `factory` and any events not yet stored.
    ///
    /// Returns the number of newly stored events. Fails if the snapshot has
    /// fewer events than the store, which means it was loaded before another
    /// commit landed.
    pub fn commit(&self, factory: &StandardFactory) -> Result<usize> {
        let stored = self.event_count()?;
        let total = factory.events().len() as u64;
        if total < stored {
            return Err(CustodyError::StorageError(format!(
                "Snapshot is stale: {} events in snapshot, {} stored",
                total, stored
            )));
        }

        let serialized = bincode::serialize(factory).map_err(|e| {
            CustodyError::SerializationError(format!("Failed to serialize factory: {}", e))
        })?;

        let cf_state = self.cf(CF_STATE)?;
        let cf_events = self.cf(CF_EVENTS)?;
        let cf_metadata = self.cf(CF_METADATA)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(cf_state, FACTORY_KEY, &serialized);

        let new_events = factory.events().since(stored);
        for record in new_events {
            let data = bincode::serialize(record).map_err(|e| {
                CustodyError::SerializationError(format!("Failed to serialize event: {}", e))
            })?;
            batch.put_cf(cf_events, record.sequence.to_be_bytes(), &data);
        }
        batch.put_cf(cf_metadata, EVENT_COUNT_KEY, total.to_le_bytes());

        self.db
            .write(batch)
            .map_err(|e| CustodyError::StorageError(format!("Failed to commit factory: {}", e)))?;

        debug!("Committed factory snapshot with {} new events", new_events.len());
        Ok(new_events.len())
    }

    /// Get a single event by sequence number
    pub fn get_event(&self, sequence: u64) -> Result<Option<EventRecord>> {
        let cf_events = self.cf(CF_EVENTS)?;

        match self.db.get_cf(cf_events, sequence.to_be_bytes()) {
            Ok(Some(data)) => {
                let record = bincode::deserialize(&data).map_err(|e| {
                    CustodyError::SerializationError(format!("Failed to deserialize event: {}", e))
                })?;
                Ok(Some(record))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(CustodyError::StorageError(format!("Failed to get event: {}", e))),
        }
    }

    /// Stored events with `sequence >= from`, in commit order
    pub fn events_since(&self, from: u64) -> Result<Vec<EventRecord>> {
        let cf_events = self.cf(CF_EVENTS)?;
        let start = from.to_be_bytes();
        let mut records = Vec::new();

        for item in self
            .db
            .iterator_cf(cf_events, IteratorMode::From(&start, Direction::Forward))
        {
            let (_, value) = item
                .map_err(|e| CustodyError::StorageError(format!("Failed to iterate events: {}", e)))?;
            let record = bincode::deserialize(&value).map_err(|e| {
                CustodyError::SerializationError(format!("Failed to deserialize event: {}", e))
            })?;
            records.push(record);
        }

        Ok(records)
    }
}
