//! # Storage Seams
//!
//! The workflows talk to storage through two small traits so tests can
//! swap in recording mocks. The SQLite repositories from `martillo-db`
//! implement both.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use martillo_core::{DocumentState, SaleRecord};
use martillo_db::{SaleRecordRepository, SeriesRepository};

use crate::error::{FiscalError, FiscalResult};

/// Hands out correlative numbers. Must be atomic across terminals.
#[async_trait]
pub trait SequenceAllocator: Send + Sync {
    /// Next number for `series`. Any failure is
    /// [`FiscalError::SequenceUnavailable`]; callers never guess a number.
    async fn next_number(&self, series: &str) -> FiscalResult<i64>;

    /// Moves the counter up to `number` if it is behind.
    async fn raise_floor(&self, series: &str, number: i64) -> FiscalResult<bool>;
}

/// Persists sale records.
#[async_trait]
pub trait SaleRecordStore: Send + Sync {
    async fn insert(&self, record: &SaleRecord) -> FiscalResult<()>;

    async fn get(&self, id: &str) -> FiscalResult<Option<SaleRecord>>;

    async fn list_by_state(&self, state: DocumentState, limit: i64) -> FiscalResult<Vec<SaleRecord>>;

    /// Compare-and-set on the state field: writes only while the stored
    /// state is still `expected`, and returns whether it wrote.
    async fn update_state(
        &self,
        id: &str,
        expected: DocumentState,
        state: DocumentState,
        remote_message: Option<&str>,
        at: DateTime<Utc>,
    ) -> FiscalResult<bool>;
}

#[async_trait]
impl SequenceAllocator for SeriesRepository {
    async fn next_number(&self, series: &str) -> FiscalResult<i64> {
        SeriesRepository::next_number(self, series)
            .await
            .map_err(|e| FiscalError::SequenceUnavailable {
                series: series.to_string(),
                reason: e.to_string(),
            })
    }

    async fn raise_floor(&self, series: &str, number: i64) -> FiscalResult<bool> {
        Ok(SeriesRepository::raise_floor(self, series, number).await?)
    }
}

#[async_trait]
impl SaleRecordStore for SaleRecordRepository {
    async fn insert(&self, record: &SaleRecord) -> FiscalResult<()> {
        Ok(SaleRecordRepository::insert(self, record).await?)
    }

    async fn get(&self, id: &str) -> FiscalResult<Option<SaleRecord>> {
        Ok(self.get_by_id(id).await?)
    }

    async fn list_by_state(&self, state: DocumentState, limit: i64) -> FiscalResult<Vec<SaleRecord>> {
        Ok(SaleRecordRepository::list_by_state(self, state, limit).await?)
    }

    async fn update_state(
        &self,
        id: &str,
        expected: DocumentState,
        state: DocumentState,
        remote_message: Option<&str>,
        at: DateTime<Utc>,
    ) -> FiscalResult<bool> {
        Ok(SaleRecordRepository::update_state(self, id, expected, state, remote_message, at).await?)
    }
}

// =============================================================================
// Test Doubles
// =============================================================================

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory record store that counts calls.
    #[derive(Default)]
    pub struct MemoryStore {
        pub records: Mutex<HashMap<String, SaleRecord>>,
        pub updates: AtomicUsize,
        pub fail_inserts: bool,
    }

    impl MemoryStore {
        pub fn with(record: SaleRecord) -> Self {
            let store = MemoryStore::default();
            store
                .records
                .lock()
                .unwrap()
                .insert(record.id.clone(), record);
            store
        }

        pub fn state_of(&self, id: &str) -> Option<DocumentState> {
            self.records.lock().unwrap().get(id).map(|r| r.state)
        }

        pub fn update_count(&self) -> usize {
            self.updates.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SaleRecordStore for MemoryStore {
        async fn insert(&self, record: &SaleRecord) -> FiscalResult<()> {
            if self.fail_inserts {
                return Err(FiscalError::Database(martillo_db::DbError::ConnectionFailed(
                    "disk I/O error".into(),
                )));
            }
            self.records
                .lock()
                .unwrap()
                .insert(record.id.clone(), record.clone());
            Ok(())
        }

        async fn get(&self, id: &str) -> FiscalResult<Option<SaleRecord>> {
            Ok(self.records.lock().unwrap().get(id).cloned())
        }

        async fn list_by_state(
            &self,
            state: DocumentState,
            limit: i64,
        ) -> FiscalResult<Vec<SaleRecord>> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .values()
                .filter(|r| r.state == state)
                .take(limit as usize)
                .cloned()
                .collect())
        }

        async fn update_state(
            &self,
            id: &str,
            expected: DocumentState,
            state: DocumentState,
            remote_message: Option<&str>,
            at: DateTime<Utc>,
        ) -> FiscalResult<bool> {
            self.updates.fetch_add(1, Ordering::SeqCst);
            let mut records = self.records.lock().unwrap();
            let record = records
                .get_mut(id)
                .ok_or_else(|| FiscalError::DocumentNotFound { id: id.to_string() })?;
            if record.state != expected {
                return Ok(false);
            }
            record.state = state;
            if let Some(message) = remote_message {
                record.remote_message = Some(message.to_string());
            }
            if state == DocumentState::Voided {
                record.voided_at = Some(at);
            }
            record.updated_at = at;
            Ok(true)
        }
    }

    /// Counter that records every floor raise.
    #[derive(Default)]
    pub struct MemoryAllocator {
        pub last: Mutex<HashMap<String, i64>>,
        pub calls: AtomicUsize,
        pub unavailable: bool,
    }

    impl MemoryAllocator {
        pub fn starting_at(series: &str, last: i64) -> Self {
            let allocator = MemoryAllocator::default();
            allocator
                .last
                .lock()
                .unwrap()
                .insert(series.to_string(), last);
            allocator
        }

        pub fn last(&self, series: &str) -> i64 {
            self.last.lock().unwrap().get(series).copied().unwrap_or(0)
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SequenceAllocator for MemoryAllocator {
        async fn next_number(&self, series: &str) -> FiscalResult<i64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.unavailable {
                return Err(FiscalError::SequenceUnavailable {
                    series: series.to_string(),
                    reason: "counter offline".into(),
                });
            }
            let mut last = self.last.lock().unwrap();
            let counter = last.entry(series.to_string()).or_insert(0);
            *counter += 1;
            Ok(*counter)
        }

        async fn raise_floor(&self, series: &str, number: i64) -> FiscalResult<bool> {
            let mut last = self.last.lock().unwrap();
            let counter = last.entry(series.to_string()).or_insert(0);
            if *counter < number {
                *counter = number;
                Ok(true)
            } else {
                Ok(false)
            }
        }
    }
}
