use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per moderator id. Every read-modify-write of a quota row
/// happens while holding that moderator's guard.
#[derive(Clone, Default)]
pub struct ModeratorLocks {
    slots: Arc<Mutex<HashMap<i64, Arc<Mutex<()>>>>>,
}

impl ModeratorLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, moderator_id: i64) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().await;
            // Drop slots nobody holds or waits on so the map tracks live contention only.
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            slots.entry(moderator_id).or_default().clone()
        };
        slot.lock_owned().await
    }
}
