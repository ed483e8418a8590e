use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use crate::domain::action::{ActionRecord, NewActionRecord};
use crate::domain::quota::ModeratorQuota;
use crate::infra::ledger::{LedgerStore, StoreError};

#[derive(Default)]
struct MemoryState {
    quotas: BTreeMap<i64, ModeratorQuota>,
    records: Vec<ActionRecord>,
    next_record_id: i64,
}

impl MemoryState {
    fn push_record(&mut self, record: &NewActionRecord) -> ActionRecord {
        self.next_record_id += 1;
        let stored = record.clone().with_id(self.next_record_id);
        self.records.push(stored.clone());
        stored
    }

    fn write_quota(&mut self, quota: &ModeratorQuota) {
        let mut quota = quota.clone();
        if quota.display_name.is_none() {
            if let Some(existing) = self.quotas.get(&quota.moderator_id) {
                quota.display_name = existing.display_name.clone();
            }
        }
        self.quotas.insert(quota.moderator_id, quota);
    }
}

/// In-process ledger backing the integration tests.
///
/// [`MemoryLedger::set_offline`] makes every call fail with
/// [`StoreError::Offline`] until switched back.
#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<MemoryState>,
    offline: AtomicBool,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Offline);
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn get_quota(&self, moderator_id: i64) -> Result<Option<ModeratorQuota>, StoreError> {
        self.check_online()?;
        Ok(self.state.lock().await.quotas.get(&moderator_id).cloned())
    }

    async fn upsert_quota(&self, quota: &ModeratorQuota) -> Result<(), StoreError> {
        self.check_online()?;
        self.state.lock().await.write_quota(quota);
        Ok(())
    }

    async fn delete_quota(&self, moderator_id: i64) -> Result<bool, StoreError> {
        self.check_online()?;
        Ok(self.state.lock().await.quotas.remove(&moderator_id).is_some())
    }

    async fn list_quotas(&self) -> Result<Vec<ModeratorQuota>, StoreError> {
        self.check_online()?;
        Ok(self.state.lock().await.quotas.values().cloned().collect())
    }

    async fn append_record(&self, record: &NewActionRecord) -> Result<ActionRecord, StoreError> {
        self.check_online()?;
        Ok(self.state.lock().await.push_record(record))
    }

    async fn commit_occurrence(
        &self,
        record: &NewActionRecord,
        quota: &ModeratorQuota,
    ) -> Result<ActionRecord, StoreError> {
        self.check_online()?;
        let mut state = self.state.lock().await;
        let stored = state.push_record(record);
        state.write_quota(quota);
        Ok(stored)
    }

    async fn find_record_between(
        &self,
        moderator_id: i64,
        target_id: i64,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> Result<Option<ActionRecord>, StoreError> {
        self.check_online()?;
        let state = self.state.lock().await;
        let found = state
            .records
            .iter()
            .filter(|record| {
                record.moderator_id == moderator_id
                    && record.target_id == target_id
                    && record.applied_at >= from
                    && record.applied_at <= to
            })
            .max_by_key(|record| (record.applied_at, record.record_id))
            .cloned();
        Ok(found)
    }

    async fn list_records(
        &self,
        moderator_id: Option<i64>,
        limit: i64,
    ) -> Result<Vec<ActionRecord>, StoreError> {
        self.check_online()?;
        let state = self.state.lock().await;
        let mut records: Vec<ActionRecord> = state
            .records
            .iter()
            .filter(|record| moderator_id.map_or(true, |id| record.moderator_id == id))
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            b.applied_at
                .cmp(&a.applied_at)
                .then(b.record_id.cmp(&a.record_id))
        });
        records.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        Ok(records)
    }

    async fn count_records(&self) -> Result<i64, StoreError> {
        self.check_online()?;
        Ok(self.state.lock().await.records.len() as i64)
    }

    async fn purge_record(&self, record_id: i64) -> Result<bool, StoreError> {
        self.check_online()?;
        let mut state = self.state.lock().await;
        let before = state.records.len();
        state.records.retain(|record| record.record_id != record_id);
        Ok(state.records.len() != before)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_online()
    }
}
