//! In-memory store implementations.
//!
//! Suitable for single-node deployments and tests. Clustered deployments plug
//! in database-backed implementations of the same traits.

use std::collections::BTreeMap;
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use tracing::debug;

use super::{OfflineStore, PresenceStore};
use crate::addressing::bare_userid;
use crate::error::StoreError;
use crate::types::{OfflineMessage, PresenceRecord};

fn poisoned() -> StoreError {
    StoreError::Internal("Lock poisoned".to_string())
}

/// In-memory presence table keyed by userid.
#[derive(Debug, Default)]
pub struct InMemoryPresenceStore {
    records: RwLock<BTreeMap<String, PresenceRecord>>,
}

impl InMemoryPresenceStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update a record.
    ///
    /// An update older than the stored record is ignored so that timestamps
    /// never move backwards. Returns whether the record was written.
    pub fn upsert(&self, record: PresenceRecord) -> Result<bool, StoreError> {
        let mut records = self.records.write().map_err(|_| poisoned())?;

        if let Some(existing) = records.get(&record.userid) {
            if existing.timestamp > record.timestamp {
                debug!(userid = %record.userid, "Ignoring stale presence update");
                return Ok(false);
            }
        }

        records.insert(record.userid.clone(), record);
        Ok(true)
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PresenceStore for InMemoryPresenceStore {
    async fn get(&self, userid: &str) -> Result<Vec<PresenceRecord>, StoreError> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records
            .values()
            .filter(|r| r.userid == userid || bare_userid(&r.userid) == userid)
            .cloned()
            .collect())
    }

    async fn get_all(&self) -> Result<Vec<PresenceRecord>, StoreError> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records.values().cloned().collect())
    }

    async fn delete(&self, userid: &str) -> Result<(), StoreError> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        let before = records.len();
        records.retain(|key, _| key != userid && bare_userid(key) != userid);
        debug!(userid = %userid, removed = before - records.len(), "Deleted presence records");
        Ok(())
    }
}

/// In-memory offline queue preserving enqueue order.
#[derive(Debug, Default)]
pub struct InMemoryOfflineStore {
    messages: Mutex<Vec<OfflineMessage>>,
}

impl InMemoryOfflineStore {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message to the queue.
    pub fn enqueue(&self, message: OfflineMessage) -> Result<(), StoreError> {
        let mut messages = self.messages.lock().map_err(|_| poisoned())?;
        messages.push(message);
        Ok(())
    }

    /// Whether a message with this id is still queued.
    pub fn contains(&self, id: &str) -> bool {
        self.messages
            .lock()
            .map(|m| m.iter().any(|msg| msg.id == id))
            .unwrap_or(false)
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.messages.lock().map(|m| m.len()).unwrap_or(0)
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl OfflineStore for InMemoryOfflineStore {
    async fn get_by_recipient(&self, userid: &str) -> Result<Vec<OfflineMessage>, StoreError> {
        let messages = self.messages.lock().map_err(|_| poisoned())?;
        Ok(messages
            .iter()
            .filter(|m| bare_userid(&m.recipient) == userid)
            .cloned()
            .collect())
    }

    async fn delete(&self, id: &str, kind: &str) -> Result<bool, StoreError> {
        let mut messages = self.messages.lock().map_err(|_| poisoned())?;
        let position = messages
            .iter()
            .position(|m| m.id == id && m.stanza.name() == kind);

        match position {
            Some(idx) => {
                messages.remove(idx);
                debug!(id = %id, kind = %kind, "Deleted offline message");
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
