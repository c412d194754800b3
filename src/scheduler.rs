//! Named one-shot timers with epoch-based cancellation.
//!
//! Every room owns a `TimerRegistry`. Arming a name replaces any pending
//! timer under that name; cancelling bumps the slot's epoch so a callback
//! that already slept past its deadline observes the stale epoch and
//! becomes a no-op. Callbacks still re-check room phase/membership after
//! reacquiring the room lock, since a cancelling transition can land
//! between the epoch check and the callback body.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::trace;

#[derive(Clone, Default)]
pub struct TimerRegistry {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    slots: HashMap<String, Slot>,
    next_epoch: u64,
}

struct Slot {
    epoch: u64,
    handle: Option<JoinHandle<()>>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) the named timer. The task runs once after `delay`
    /// unless the name is cancelled or re-armed first.
    pub fn arm<F>(&self, name: &str, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let epoch = {
            let mut inner = self.inner.lock().unwrap();
            inner.next_epoch += 1;
            let epoch = inner.next_epoch;
            if let Some(old) = inner.slots.insert(
                name.to_string(),
                Slot {
                    epoch,
                    handle: None,
                },
            ) {
                if let Some(handle) = old.handle {
                    handle.abort();
                }
            }
            epoch
        };

        trace!(timer = %name, delay_ms = delay.as_millis() as u64, "Arming timer");

        let registry = self.clone();
        let slot_name = name.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !registry.fire_if_current(&slot_name, epoch) {
                trace!(timer = %slot_name, "Timer superseded, dropping callback");
                return;
            }
            task.await;
        });

        let mut inner = self.inner.lock().unwrap();
        match inner.slots.get_mut(name) {
            Some(slot) if slot.epoch == epoch => slot.handle = Some(handle),
            // Re-armed or cancelled while spawning.
            _ => handle.abort(),
        }
    }

    /// Remove the slot if it still belongs to `epoch`. Returns whether the
    /// caller owns this firing.
    fn fire_if_current(&self, name: &str, epoch: u64) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.slots.get(name) {
            Some(slot) if slot.epoch == epoch => {
                inner.slots.remove(name);
                true
            }
            _ => false,
        }
    }

    /// Cancel the named timer. Idempotent.
    pub fn cancel(&self, name: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(slot) = inner.slots.remove(name) {
            if let Some(handle) = slot.handle {
                handle.abort();
            }
            trace!(timer = %name, "Timer cancelled");
        }
    }

    /// Cancel every timer whose name starts with `prefix` (bot timer
    /// families, per-socket fire expiries).
    pub fn cancel_prefix(&self, prefix: &str) {
        let mut inner = self.inner.lock().unwrap();
        let names: Vec<String> = inner
            .slots
            .keys()
            .filter(|n| n.starts_with(prefix))
            .cloned()
            .collect();
        for name in names {
            if let Some(slot) = inner.slots.remove(&name) {
                if let Some(handle) = slot.handle {
                    handle.abort();
                }
            }
        }
    }

    /// Cancel everything. Used on room shutdown.
    pub fn cancel_all(&self) {
        let mut inner = self.inner.lock().unwrap();
        for (_, slot) in inner.slots.drain() {
            if let Some(handle) = slot.handle {
                handle.abort();
            }
        }
    }

    /// Whether the named timer is currently armed and unfired.
    pub fn armed(&self, name: &str) -> bool {
        self.inner.lock().unwrap().slots.contains_key(name)
    }

    pub fn armed_count(&self) -> usize {
        self.inner.lock().unwrap().slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn timer_fires_once() {
        let registry = TimerRegistry::new();
        let fired = Arc::new(AtomicU32::new(0));

        let counter = fired.clone();
        registry.arm("t", Duration::from_millis(100), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(registry.armed("t"));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!registry.armed("t"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_fires() {
        let registry = TimerRegistry::new();
        let fired = Arc::new(AtomicU32::new(0));

        let counter = fired.clone();
        registry.arm("t", Duration::from_millis(100), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        registry.cancel("t");

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(!registry.armed("t"));
    }

    #[tokio::test(start_paused = true)]
    async fn rearm_supersedes_previous() {
        let registry = TimerRegistry::new();
        let fired = Arc::new(AtomicU32::new(0));

        for _ in 0..3 {
            let counter = fired.clone();
            registry.arm("t", Duration::from_millis(100), async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prefix_only_hits_family() {
        let registry = TimerRegistry::new();
        let fired = Arc::new(AtomicU32::new(0));

        for name in ["bot:1:move", "bot:1:fill", "buzzer"] {
            let counter = fired.clone();
            registry.arm(name, Duration::from_millis(100), async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        registry.cancel_prefix("bot:1:");

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_clears_registry() {
        let registry = TimerRegistry::new();
        for name in ["a", "b", "c"] {
            registry.arm(name, Duration::from_secs(10), async {});
        }
        assert_eq!(registry.armed_count(), 3);
        registry.cancel_all();
        assert_eq!(registry.armed_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_is_idempotent() {
        let registry = TimerRegistry::new();
        registry.arm("t", Duration::from_secs(1), async {});
        registry.cancel("t");
        registry.cancel("t");
        assert!(!registry.armed("t"));
    }
}
