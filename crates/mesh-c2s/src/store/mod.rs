//! Persistent stores consumed by the c2s handlers.
//!
//! The handlers only see these traits; the storage engines behind them live
//! elsewhere. Implementations must provide their own per-key atomicity: this
//! layer reads, then conditionally deletes, without holding any lock across
//! the two calls.

mod memory;

pub use memory::{InMemoryOfflineStore, InMemoryPresenceStore};

use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::{OfflineMessage, PresenceRecord};

/// Durable last-known presence per userid.
#[async_trait]
pub trait PresenceStore: Send + Sync {
    /// Records for a userid.
    ///
    /// A bare userid matches every resource record of that user, so the
    /// result may hold zero, one or several records.
    async fn get(&self, userid: &str) -> Result<Vec<PresenceRecord>, StoreError>;

    /// Every stored record.
    async fn get_all(&self) -> Result<Vec<PresenceRecord>, StoreError>;

    /// Delete the records of a userid.
    async fn delete(&self, userid: &str) -> Result<(), StoreError>;
}

/// Durable queue of messages waiting for an unreachable recipient.
#[async_trait]
pub trait OfflineStore: Send + Sync {
    /// Messages addressed to a bare userid, in enqueue order.
    async fn get_by_recipient(&self, userid: &str) -> Result<Vec<OfflineMessage>, StoreError>;

    /// Delete a message by id.
    ///
    /// Returns `false` when no message had that id.
    async fn delete(&self, id: &str, kind: &str) -> Result<bool, StoreError>;
}
