//! Kill ingestion queue
//!
//! Decouples the host's event callback from kill processing. The producer side
//! never blocks beyond a short mutex hold; the worker swaps the whole buffer out
//! in one step and sleeps on a wake signal when there is nothing to do.

use crate::config::EnforcerConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;

/// A kill as reported by the game server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KillEvent {
    pub killer: String,
    pub victim: String,
    /// Engine weapon code, e.g. `U_M98B`
    pub weapon: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_suicide: bool,
    #[serde(default)]
    pub is_teamkill: bool,
    #[serde(default)]
    pub is_headshot: bool,
}

impl KillEvent {
    pub fn new(
        killer: impl Into<String>,
        victim: impl Into<String>,
        weapon: impl Into<String>,
    ) -> Self {
        Self {
            killer: killer.into(),
            victim: victim.into(),
            weapon: weapon.into(),
            timestamp: Utc::now(),
            is_suicide: false,
            is_teamkill: false,
            is_headshot: false,
        }
    }
}

/// Work handed to the kill processing worker, in arrival order
#[derive(Debug, Clone)]
pub enum QueueItem {
    Kill(KillEvent),
    /// A player left; their tracking state must be dropped
    PlayerLeft(String),
    RoundOver,
    /// Replace the enforcer configurations
    Reconfigure(Vec<EnforcerConfig>),
}

impl From<KillEvent> for QueueItem {
    fn from(event: KillEvent) -> Self {
        Self::Kill(event)
    }
}

/// Unbounded FIFO with a wake signal
#[derive(Debug, Default)]
pub struct KillQueue {
    items: Mutex<Vec<QueueItem>>,
    wake: Notify,
}

impl KillQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the tail and wake the worker
    pub fn enqueue(&self, item: impl Into<QueueItem>) {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(item.into());
        self.wake.notify_one();
    }

    /// Take everything queued so far, oldest first
    pub fn drain_all(&self) -> Vec<QueueItem> {
        std::mem::take(&mut *self.items.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Wait for a wake signal; returns `false` when the timeout elapsed first
    pub async fn wait(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wake.notified())
            .await
            .is_ok()
    }

    /// Wake the worker without queueing anything, used on shutdown
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    /// Drop anything left over from a previous session
    pub fn clear(&self) {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn kill_names(items: &[QueueItem]) -> Vec<String> {
        items
            .iter()
            .filter_map(|item| match item {
                QueueItem::Kill(kill) => Some(kill.victim.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_drain_preserves_order_and_empties() {
        let queue = KillQueue::new();
        queue.enqueue(KillEvent::new("A", "v1", "U_M98B"));
        queue.enqueue(QueueItem::PlayerLeft("B".into()));
        queue.enqueue(KillEvent::new("A", "v2", "U_M98B"));
        assert_eq!(queue.len(), 3);

        let batch = queue.drain_all();
        assert_eq!(kill_names(&batch), vec!["v1", "v2"]);
        assert!(matches!(batch[1], QueueItem::PlayerLeft(ref name) if name == "B"));
        assert!(queue.is_empty());
        assert!(queue.drain_all().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_when_idle() {
        let queue = KillQueue::new();
        assert!(!queue.wait(Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_enqueue_before_wait_is_not_lost() {
        let queue = KillQueue::new();
        queue.enqueue(KillEvent::new("A", "v1", "U_M98B"));
        // The permit stored by enqueue satisfies the next wait immediately
        assert!(queue.wait(Duration::from_secs(5)).await);
        assert_eq!(queue.drain_all().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_producers_lose_nothing() {
        let queue = Arc::new(KillQueue::new());
        let mut producers = Vec::new();
        for producer in 0..4 {
            let queue = Arc::clone(&queue);
            producers.push(tokio::spawn(async move {
                for i in 0..250 {
                    queue.enqueue(KillEvent::new(format!("p{producer}"), format!("v{i}"), "U_M98B"));
                }
            }));
        }
        let mut drained = Vec::new();
        for producer in producers {
            producer.await.unwrap();
            drained.extend(queue.drain_all());
        }
        drained.extend(queue.drain_all());
        assert_eq!(drained.len(), 1000);

        // Per-producer order survives the swaps
        for producer in 0..4 {
            let killer = format!("p{producer}");
            let victims: Vec<String> = drained
                .iter()
                .filter_map(|item| match item {
                    QueueItem::Kill(kill) if kill.killer == killer => Some(kill.victim.clone()),
                    _ => None,
                })
                .collect();
            let expected: Vec<String> = (0..250).map(|i| format!("v{i}")).collect();
            assert_eq!(victims, expected);
        }
    }
}
