use std::{collections::HashSet, sync::Arc, time::Duration};

use domain::{DoseEvent, MedicationReminder, ProfileUpdate};
use tokio::sync::Mutex;

use super::{Deliver, Mutation, OutboxEntry, OutboxKind};
use crate::{
    bounded,
    config::EngineConfig,
    error::StoreError,
    store::{self, LocalStore},
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DrainStats {
    pub attempted: usize,
    pub delivered: usize,
    /// Failed this round and kept for the next drain.
    pub retained: usize,
    pub dead_lettered: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DrainOutcome {
    Drained(DrainStats),
    /// Another drain of the same kind is running; nothing was done.
    InFlight,
    /// The queue could not be read or written. Entries stay where they were.
    StoreUnavailable(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueDepth {
    pub kind: OutboxKind,
    pub pending: usize,
    pub dead_letters: usize,
}

#[derive(Debug, Default)]
struct Lane {
    /// Held for the whole drain.
    in_flight: Mutex<()>,
    /// Held around every read-modify-write of the queue key.
    write: Mutex<()>,
}

pub struct Outbox {
    store: Arc<dyn LocalStore>,
    remote_timeout: Duration,
    max_attempts: Option<u32>,
    lanes: [Lane; OutboxKind::ALL.len()],
}

impl Outbox {
    pub fn new(store: Arc<dyn LocalStore>, config: &EngineConfig) -> Self {
        Self {
            store,
            remote_timeout: config.remote_timeout,
            max_attempts: config.max_attempts,
            lanes: std::array::from_fn(|_| Lane::default()),
        }
    }

    fn lane(&self, kind: OutboxKind) -> &Lane {
        &self.lanes[kind.index()]
    }

    pub async fn enqueue(&self, mutation: Mutation) -> Result<OutboxEntry, StoreError> {
        let kind = mutation.kind();
        let entry = OutboxEntry::new(mutation);

        let _guard = self.lane(kind).write.lock().await;
        let mut queue = self.read(&kind.queue_key()).await?;
        queue.push(entry.clone());
        self.write(&kind.queue_key(), &queue).await?;

        tracing::info!(
            kind = %kind,
            entry = %entry.id,
            subject = entry.mutation.subject().unwrap_or("-"),
            depth = queue.len(),
            "Queued write for later delivery"
        );
        Ok(entry)
    }

    pub async fn enqueue_create(
        &self,
        reminder: &MedicationReminder,
    ) -> Result<OutboxEntry, StoreError> {
        self.enqueue(Mutation::CreateReminder {
            reminder: reminder.clone(),
        })
        .await
    }

    pub async fn enqueue_update(
        &self,
        id: &str,
        reminder: &MedicationReminder,
    ) -> Result<OutboxEntry, StoreError> {
        self.enqueue(Mutation::UpdateReminder {
            id: id.to_string(),
            reminder: reminder.clone(),
        })
        .await
    }

    pub async fn enqueue_delete(&self, id: &str) -> Result<OutboxEntry, StoreError> {
        self.enqueue(Mutation::DeleteReminder { id: id.to_string() })
            .await
    }

    pub async fn enqueue_toggle(&self, id: &str, enabled: bool) -> Result<OutboxEntry, StoreError> {
        self.enqueue(Mutation::ToggleReminder {
            id: id.to_string(),
            enabled,
        })
        .await
    }

    pub async fn enqueue_dose(&self, dose: &DoseEvent) -> Result<OutboxEntry, StoreError> {
        self.enqueue(Mutation::RecordDose { dose: dose.clone() })
            .await
    }

    pub async fn enqueue_profile(&self, update: &ProfileUpdate) -> Result<OutboxEntry, StoreError> {
        self.enqueue(Mutation::UpdateProfile {
            update: update.clone(),
        })
        .await
    }

    pub async fn pending(&self, kind: OutboxKind) -> Result<Vec<OutboxEntry>, StoreError> {
        self.read(&kind.queue_key()).await
    }

    pub async fn dead_letters(&self, kind: OutboxKind) -> Result<Vec<OutboxEntry>, StoreError> {
        self.read(&kind.dead_letter_key()).await
    }

    pub async fn depth(&self) -> Result<Vec<QueueDepth>, StoreError> {
        let mut depths = Vec::with_capacity(OutboxKind::ALL.len());
        for kind in OutboxKind::ALL {
            depths.push(QueueDepth {
                kind,
                pending: self.pending(kind).await?.len(),
                dead_letters: self.dead_letters(kind).await?.len(),
            });
        }
        Ok(depths)
    }

    /// Moves every dead letter of `kind` back to the end of its queue with a
    /// fresh attempt count.
    pub async fn requeue_dead_letters(&self, kind: OutboxKind) -> Result<usize, StoreError> {
        let _guard = self.lane(kind).write.lock().await;

        let letters = self.read(&kind.dead_letter_key()).await?;
        if letters.is_empty() {
            return Ok(0);
        }

        let count = letters.len();
        let mut queue = self.read(&kind.queue_key()).await?;
        queue.extend(letters.into_iter().map(|mut entry| {
            entry.attempts = 0;
            entry.last_error = None;
            entry
        }));
        self.write(&kind.queue_key(), &queue).await?;
        self.store.delete(&kind.dead_letter_key()).await?;

        tracing::info!(kind = %kind, count, "Requeued dead letters");
        Ok(count)
    }

    /// Replays every entry of one kind. Delivered entries are removed, failed
    /// ones kept, and entries enqueued while the drain ran are preserved.
    /// Never returns an error: storage trouble is reported in the outcome.
    pub async fn drain<D: Deliver + ?Sized>(&self, kind: OutboxKind, deliver: &D) -> DrainOutcome {
        let Ok(_in_flight) = self.lane(kind).in_flight.try_lock() else {
            tracing::debug!(kind = %kind, "Drain already running, skipping");
            return DrainOutcome::InFlight;
        };

        match self.drain_exclusive(kind, deliver).await {
            Ok(stats) => {
                if stats.attempted > 0 {
                    tracing::info!(
                        kind = %kind,
                        delivered = stats.delivered,
                        retained = stats.retained,
                        dead_lettered = stats.dead_lettered,
                        "Drained outbox"
                    );
                }
                DrainOutcome::Drained(stats)
            }
            Err(e) => {
                tracing::error!(kind = %kind, error = %e, "Outbox drain could not use local storage");
                DrainOutcome::StoreUnavailable(e.to_string())
            }
        }
    }

    async fn drain_exclusive<D: Deliver + ?Sized>(
        &self,
        kind: OutboxKind,
        deliver: &D,
    ) -> Result<DrainStats, StoreError> {
        let key = kind.queue_key();
        let snapshot = {
            let _guard = self.lane(kind).write.lock().await;
            self.read(&key).await?
        };
        if snapshot.is_empty() {
            return Ok(DrainStats::default());
        }

        let seen: HashSet<String> = snapshot.iter().map(|e| e.id.clone()).collect();
        let mut stats = DrainStats::default();
        let mut kept = Vec::new();
        let mut dead = Vec::new();

        for mut entry in snapshot {
            stats.attempted += 1;
            entry.attempts += 1;

            let result = bounded::call(self.remote_timeout, deliver.deliver(&entry.mutation)).await;
            let err = match result {
                Ok(()) => {
                    stats.delivered += 1;
                    tracing::debug!(kind = %kind, entry = %entry.id, "Delivered queued write");
                    continue;
                }
                Err(err) => err,
            };

            entry.last_error = Some(err.to_string());
            if !err.is_retryable() {
                tracing::warn!(kind = %kind, entry = %entry.id, error = %err, "Backend rejected queued write, dead-lettering");
                dead.push(entry);
            } else if self.exhausted(&entry) {
                tracing::warn!(kind = %kind, entry = %entry.id, attempts = entry.attempts, "Retry limit reached, dead-lettering");
                dead.push(entry);
            } else {
                tracing::debug!(kind = %kind, entry = %entry.id, error = %err, "Delivery failed, keeping entry");
                kept.push(entry);
            }
        }

        stats.retained = kept.len();
        stats.dead_lettered = dead.len();

        let _guard = self.lane(kind).write.lock().await;

        // Dead letters land before the queue shrinks, so a failed write
        // leaves each entry in at least one list.
        if !dead.is_empty() {
            let dead_key = kind.dead_letter_key();
            let mut letters = self.read(&dead_key).await?;
            letters.extend(dead);
            self.write(&dead_key, &letters).await?;
        }

        let current = self.read(&key).await?;
        kept.extend(current.into_iter().filter(|e| !seen.contains(&e.id)));
        self.write(&key, &kept).await?;

        Ok(stats)
    }

    fn exhausted(&self, entry: &OutboxEntry) -> bool {
        self.max_attempts.is_some_and(|max| entry.attempts >= max)
    }

    async fn read(&self, key: &str) -> Result<Vec<OutboxEntry>, StoreError> {
        Ok(store::load(self.store.as_ref(), key).await?.unwrap_or_default())
    }

    async fn write(&self, key: &str, entries: &[OutboxEntry]) -> Result<(), StoreError> {
        if entries.is_empty() {
            self.store.delete(key).await
        } else {
            store::save(self.store.as_ref(), key, &entries).await
        }
    }
}
