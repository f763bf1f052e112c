//! Per-window accumulator state shared by the intake and trigger tasks.
//!
//! The outer map is read-mostly; each window's accumulator sits behind its
//! own lock so different keys buffer and fire fully in parallel while a
//! single key is single-writer. Firing drains and clears the buffer under
//! the per-key lock only (discarding accumulation); classification always
//! happens on the drained batch, outside any lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use super::WindowKey;

/// Outcome of buffering one element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Element buffered into an open window.
    Buffered(WindowKey),
    /// Element's window already closed (zero allowed lateness); dropped.
    Late(WindowKey),
}

/// A drained batch from one trigger firing.
#[derive(Debug)]
pub struct FiredWindow {
    pub key: WindowKey,
    pub elements: Vec<String>,
}

struct Slot {
    buffer: Vec<String>,
    /// Pending trigger deadline (unix ms). Armed when the first element
    /// lands in an empty buffer, cleared on firing, re-armed by the next
    /// element while the window stays open.
    fire_at_ms: Option<i64>,
    /// Set under the slot lock when the slot's final drain has run and
    /// its map entry is gone. An insert holding a stale `Arc` must not
    /// push here: the buffer will never be flushed again.
    closed: bool,
}

/// Windowed accumulator store with a repeating processing-time trigger.
pub struct WindowStore {
    size: Duration,
    trigger_delay_ms: i64,
    slots: RwLock<HashMap<WindowKey, Arc<Mutex<Slot>>>>,
}

impl WindowStore {
    pub fn new(size: Duration, trigger_delay: Duration) -> Self {
        Self {
            size,
            trigger_delay_ms: trigger_delay.as_millis() as i64,
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Buffer an element by its assigned timestamp.
    ///
    /// `ts_ms` determines the window; `now_ms` is the arrival time used
    /// for the lateness check and trigger arming.
    pub async fn insert(&self, text: String, ts_ms: i64, now_ms: i64) -> InsertOutcome {
        let key = WindowKey::for_timestamp(ts_ms, self.size);
        if key.is_expired(self.size, now_ms) {
            debug!(window = %key, "Dropping late element");
            return InsertOutcome::Late(key);
        }

        loop {
            let slot = self.slot_for(key).await;
            let mut slot = slot.lock().await;
            if slot.closed {
                // The slot was drained for the last time and removed from
                // the map between the lookup and this lock; fetch a fresh
                // slot so the element still reaches a flush.
                continue;
            }
            slot.buffer.push(text);
            if slot.fire_at_ms.is_none() {
                slot.fire_at_ms = Some(now_ms + self.trigger_delay_ms);
            }
            return InsertOutcome::Buffered(key);
        }
    }

    /// Drain every window whose trigger deadline elapsed or whose end has
    /// passed. Expired windows get a final drain and their state released.
    pub async fn drain_due(&self, now_ms: i64) -> Vec<FiredWindow> {
        let snapshot: Vec<(WindowKey, Arc<Mutex<Slot>>)> = {
            let slots = self.slots.read().await;
            slots.iter().map(|(k, v)| (*k, v.clone())).collect()
        };

        let mut fired = Vec::new();
        let mut expired = Vec::new();

        for (key, slot) in snapshot {
            let is_expired = key.is_expired(self.size, now_ms);
            let mut slot = slot.lock().await;
            let due = matches!(slot.fire_at_ms, Some(at) if now_ms >= at);
            if due || is_expired {
                slot.fire_at_ms = None;
                if !slot.buffer.is_empty() {
                    let elements = std::mem::take(&mut slot.buffer);
                    fired.push(FiredWindow { key, elements });
                }
            }
            if is_expired {
                expired.push(key);
            }
        }

        if !expired.is_empty() {
            let mut slots = self.slots.write().await;
            for key in expired {
                // An insert may have raced between the drain above and this
                // removal; flush whatever it buffered, then close the slot
                // so a still-racing insert retries against the map instead
                // of pushing into an orphaned buffer.
                if let Some(slot) = slots.remove(&key) {
                    let mut slot = slot.lock().await;
                    slot.closed = true;
                    if !slot.buffer.is_empty() {
                        let elements = std::mem::take(&mut slot.buffer);
                        fired.push(FiredWindow { key, elements });
                    }
                }
                debug!(window = %key, "Released window state");
            }
        }

        fired
    }

    /// Drain everything still buffered, releasing all window state.
    ///
    /// Used for the final flush at shutdown.
    pub async fn drain_all(&self) -> Vec<FiredWindow> {
        let drained: Vec<(WindowKey, Arc<Mutex<Slot>>)> = {
            let mut slots = self.slots.write().await;
            slots.drain().collect()
        };

        let mut fired = Vec::new();
        for (key, slot) in drained {
            let mut slot = slot.lock().await;
            slot.closed = true;
            if !slot.buffer.is_empty() {
                let elements = std::mem::take(&mut slot.buffer);
                fired.push(FiredWindow { key, elements });
            }
        }
        fired
    }

    /// Number of windows currently holding state.
    pub async fn open_windows(&self) -> usize {
        self.slots.read().await.len()
    }

    async fn slot_for(&self, key: WindowKey) -> Arc<Mutex<Slot>> {
        {
            let slots = self.slots.read().await;
            if let Some(slot) = slots.get(&key) {
                return slot.clone();
            }
        }
        let mut slots = self.slots.write().await;
        slots
            .entry(key)
            .or_insert_with(|| {
                Arc::new(Mutex::new(Slot {
                    buffer: Vec::new(),
                    fire_at_ms: None,
                    closed: false,
                }))
            })
            .clone()
    }
}
