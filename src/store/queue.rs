//! Work queue interface with lease-based delivery
//!
//! Both logical queues (intake and escalation) expose long-poll receive with
//! a bounded visibility window and explicit acknowledgment. A message that is
//! received but not acked before its lease lapses becomes visible again, so
//! delivery is at-least-once and every handler must tolerate reprocessing.

use crate::error::AppError;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

/// A message held under a lease
#[derive(Debug, Clone)]
pub struct LeasedMessage {
    pub body: String,
    pub lease_handle: Uuid,
    /// How many times this message has been delivered, this lease included
    pub delivery_count: u32,
}

/// Queue consumed by the stage workers
#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn send(&self, body: String) -> Result<(), AppError>;

    /// Long-poll receive: waits up to `wait` for messages, granting each a
    /// visibility window of `lease`.
    async fn receive(
        &self,
        max_messages: usize,
        wait: Duration,
        lease: Duration,
    ) -> Result<Vec<LeasedMessage>, AppError>;

    /// Acknowledge (delete) a leased message. Acking a lapsed lease is a
    /// no-op; the message has already been made visible again.
    async fn ack(&self, lease_handle: Uuid) -> Result<(), AppError>;
}

struct Slot {
    body: String,
    /// Visible for delivery once this instant passes
    visible_at: Instant,
    /// Handle of the current (latest) lease, if any
    lease_handle: Option<Uuid>,
    delivery_count: u32,
}

/// In-memory queue with real visibility-window semantics
pub struct MemoryQueue {
    slots: Mutex<Vec<Slot>>,
    arrival: Notify,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(Vec::new()),
            arrival: Notify::new(),
        }
    }

    /// Number of messages currently held, leased or not
    pub async fn depth(&self) -> usize {
        self.slots.lock().await.len()
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkQueue for MemoryQueue {
    async fn send(&self, body: String) -> Result<(), AppError> {
        let mut slots = self.slots.lock().await;
        slots.push(Slot {
            body,
            visible_at: Instant::now(),
            lease_handle: None,
            delivery_count: 0,
        });
        drop(slots);
        self.arrival.notify_waiters();
        Ok(())
    }

    async fn receive(
        &self,
        max_messages: usize,
        wait: Duration,
        lease: Duration,
    ) -> Result<Vec<LeasedMessage>, AppError> {
        let deadline = Instant::now() + wait;

        loop {
            {
                let mut slots = self.slots.lock().await;
                let now = Instant::now();
                let mut leased = Vec::new();

                for slot in slots.iter_mut() {
                    if leased.len() >= max_messages {
                        break;
                    }
                    if slot.visible_at <= now {
                        let handle = Uuid::new_v4();
                        slot.visible_at = now + lease;
                        slot.lease_handle = Some(handle);
                        slot.delivery_count += 1;
                        leased.push(LeasedMessage {
                            body: slot.body.clone(),
                            lease_handle: handle,
                            delivery_count: slot.delivery_count,
                        });
                    }
                }

                if !leased.is_empty() {
                    return Ok(leased);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }
            // Wake on arrival, but re-check periodically so lapsed leases
            // become deliverable without a new send.
            let nap = (deadline - now).min(Duration::from_millis(25));
            let _ = tokio::time::timeout(nap, self.arrival.notified()).await;
        }
    }

    async fn ack(&self, lease_handle: Uuid) -> Result<(), AppError> {
        let mut slots = self.slots.lock().await;
        slots.retain(|slot| slot.lease_handle != Some(lease_handle));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_WAIT: Duration = Duration::from_millis(0);

    #[tokio::test]
    async fn test_receive_and_ack_removes_message() {
        let queue = MemoryQueue::new();
        queue.send("one".to_string()).await.unwrap();

        let batch = queue
            .receive(1, NO_WAIT, Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].body, "one");
        assert_eq!(batch[0].delivery_count, 1);

        queue.ack(batch[0].lease_handle).await.unwrap();
        assert_eq!(queue.depth().await, 0);
    }

    #[tokio::test]
    async fn test_leased_message_is_invisible() {
        let queue = MemoryQueue::new();
        queue.send("one".to_string()).await.unwrap();

        let first = queue
            .receive(1, NO_WAIT, Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(first.len(), 1);

        let second = queue
            .receive(1, NO_WAIT, Duration::from_secs(30))
            .await
            .unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_lapsed_lease_redelivers() {
        let queue = MemoryQueue::new();
        queue.send("one".to_string()).await.unwrap();

        let first = queue
            .receive(1, NO_WAIT, Duration::from_millis(20))
            .await
            .unwrap();
        assert_eq!(first.len(), 1);

        // No ack; the lease lapses and the message comes back.
        let second = queue
            .receive(1, Duration::from_millis(200), Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].body, "one");
        assert_eq!(second[0].delivery_count, 2);
        // The old handle no longer acks the redelivered message away.
        queue.ack(first[0].lease_handle).await.unwrap();
        assert_eq!(queue.depth().await, 1);
    }

    #[tokio::test]
    async fn test_empty_receive_times_out() {
        let queue = MemoryQueue::new();
        let batch = queue
            .receive(1, Duration::from_millis(30), Duration::from_secs(30))
            .await
            .unwrap();
        assert!(batch.is_empty());
    }
}
