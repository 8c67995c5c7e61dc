//! Entry points for UI actions and app lifecycle hooks.
//!
//! Every write lands locally first. The backend is then tried once under the
//! remote budget, and the mutation is queued in the outbox if that fails.
//! Alarm problems are logged and reported but never fail a write.

use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone};
use domain::{
    reminders::{Command, ReminderDetails, ReminderInput, TimeOfDay},
    DoseEvent, MedicationReminder, ProfileUpdate,
};
use futures::future::join_all;
use ulid::Ulid;

use crate::{
    bounded,
    clock::Clock,
    config::EngineConfig,
    error::{EngineError, NotifyError, RemoteError, StoreError},
    ledger::{Adherence, DoseLedger, SlotStatus},
    notify::NotificationBackend,
    outbox::{Deliver, DrainOutcome, Mutation, Outbox, OutboxKind},
    reminders::ReminderRepository,
    remote::RemoteApi,
    scheduler::{RefreshReport, ReminderScheduler},
    store::{self, LocalStore},
};

pub const PROFILE_KEY: &str = "profile";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncStatus {
    /// The backend acknowledged the write.
    Synced,
    /// The write is waiting in the outbox.
    Queued,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WriteOutcome<T> {
    pub value: T,
    pub sync: SyncStatus,
    /// False when the alarm backend failed. Writes that do not touch alarms
    /// always report true.
    pub scheduled: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ForegroundReport {
    pub drained: Vec<(OutboxKind, DrainOutcome)>,
    pub missed_recorded: usize,
    pub refresh: RefreshReport,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PullReport {
    pub reminders: usize,
    pub doses: usize,
    pub kept_local_reminders: usize,
    pub kept_local_doses: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClearReport {
    pub reminders: usize,
    pub doses: usize,
}

pub struct MedRemind {
    store: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteApi>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    owner_id: Option<String>,
    reminders: ReminderRepository,
    outbox: Outbox,
    scheduler: ReminderScheduler,
    ledger: DoseLedger,
}

impl MedRemind {
    pub fn new(
        store: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteApi>,
        notifier: Arc<dyn NotificationBackend>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            reminders: ReminderRepository::new(store.clone()),
            outbox: Outbox::new(store.clone(), &config),
            scheduler: ReminderScheduler::new(notifier, clock.clone(), &config),
            ledger: DoseLedger::new(store.clone(), clock.clone()),
            store,
            remote,
            clock,
            config,
            owner_id: None,
        }
    }

    /// Stamps new reminders with the signed-in user.
    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn scheduler(&self) -> &ReminderScheduler {
        &self.scheduler
    }

    pub fn ledger(&self) -> &DoseLedger {
        &self.ledger
    }

    pub async fn create_reminder(
        &self,
        input: ReminderInput,
    ) -> Result<WriteOutcome<MedicationReminder>, EngineError> {
        let details = ReminderDetails::try_from(input)?;
        let id = Ulid::new().to_string();

        let reminder = self
            .reminders
            .execute(
                &id,
                Command::CreateReminder {
                    id: id.clone(),
                    owner_id: self.owner_id.clone(),
                    details,
                },
            )
            .await?;
        tracing::info!(medication = %reminder.id, name = %reminder.name, "Created reminder");

        let scheduled = self.settle_alarms(&reminder.id, self.scheduler.sync(&reminder).await);
        let sync = self
            .push(Mutation::CreateReminder {
                reminder: reminder.clone(),
            })
            .await?;

        Ok(WriteOutcome {
            value: reminder,
            sync,
            scheduled,
        })
    }

    /// Replaces the editable fields. A missing color keeps the current one.
    pub async fn update_reminder(
        &self,
        id: &str,
        mut input: ReminderInput,
    ) -> Result<WriteOutcome<MedicationReminder>, EngineError> {
        if input.color.is_none() {
            if let Some(current) = self.reminders.load(id).await? {
                input.color = Some(current.color);
            }
        }
        let details = ReminderDetails::try_from(input)?;

        let reminder = self
            .reminders
            .execute(id, Command::UpdateReminder { details })
            .await?;
        tracing::info!(medication = %id, "Updated reminder");

        let scheduled = self.settle_alarms(id, self.scheduler.reschedule(&reminder).await);
        let sync = self
            .push(Mutation::UpdateReminder {
                id: id.to_string(),
                reminder: reminder.clone(),
            })
            .await?;

        Ok(WriteOutcome {
            value: reminder,
            sync,
            scheduled,
        })
    }

    pub async fn toggle_reminder(
        &self,
        id: &str,
        enabled: bool,
    ) -> Result<WriteOutcome<MedicationReminder>, EngineError> {
        let reminder = self
            .reminders
            .execute(id, Command::ToggleReminder { enabled })
            .await?;
        tracing::info!(medication = %id, enabled, "Toggled reminder");

        let scheduled = self.settle_alarms(id, self.scheduler.sync(&reminder).await);
        let sync = self
            .push(Mutation::ToggleReminder {
                id: id.to_string(),
                enabled,
            })
            .await?;

        Ok(WriteOutcome {
            value: reminder,
            sync,
            scheduled,
        })
    }

    pub async fn delete_reminder(&self, id: &str) -> Result<WriteOutcome<()>, EngineError> {
        self.reminders.execute(id, Command::DeleteReminder).await?;
        tracing::info!(medication = %id, "Deleted reminder");

        let scheduled = self.settle_alarms(id, self.scheduler.cancel_all(id).await);
        let sync = self
            .push(Mutation::DeleteReminder { id: id.to_string() })
            .await?;

        Ok(WriteOutcome {
            value: (),
            sync,
            scheduled,
        })
    }

    /// Appends a dose stamped with the current time. Nothing checks whether
    /// the slot already has one; see [`DoseLedger::is_dose_taken`].
    pub async fn record_dose(
        &self,
        medication_id: &str,
        taken: bool,
        slot: Option<TimeOfDay>,
    ) -> Result<WriteOutcome<DoseEvent>, EngineError> {
        let dose = self
            .ledger
            .record(medication_id, taken, self.clock.now(), slot)
            .await?;
        let sync = self.push(Mutation::RecordDose { dose: dose.clone() }).await?;

        Ok(WriteOutcome {
            value: dose,
            sync,
            scheduled: true,
        })
    }

    /// Merges `update` into the stored profile and sends only the changed fields.
    pub async fn update_profile(
        &self,
        update: ProfileUpdate,
    ) -> Result<WriteOutcome<ProfileUpdate>, EngineError> {
        if update.is_empty() {
            return Err(domain::Error::Validation {
                message: "Profile update has no fields".to_string(),
            }
            .into());
        }

        let mut profile = self.profile().await?;
        profile.merge(update.clone());
        store::save(self.store.as_ref(), PROFILE_KEY, &profile).await?;

        let sync = self.push(Mutation::UpdateProfile { update }).await?;
        Ok(WriteOutcome {
            value: profile,
            sync,
            scheduled: true,
        })
    }

    pub async fn profile(&self) -> Result<ProfileUpdate, StoreError> {
        Ok(store::load(self.store.as_ref(), PROFILE_KEY)
            .await?
            .unwrap_or_default())
    }

    /// Drains queued creates first, then every other kind concurrently, so
    /// writes about a reminder never reach the backend before the reminder.
    /// Never fails; storage problems show up in the per-kind outcome.
    pub async fn drain_all(&self) -> Vec<(OutboxKind, DrainOutcome)> {
        let replay = Replay { service: self };
        let replay = &replay;

        let created = self.outbox.drain(OutboxKind::Create, replay).await;
        let rest = join_all(
            OutboxKind::ALL
                .into_iter()
                .filter(|kind| *kind != OutboxKind::Create)
                .map(|kind| async move { (kind, self.outbox.drain(kind, replay).await) }),
        )
        .await;

        let mut outcomes = Vec::with_capacity(OutboxKind::ALL.len());
        outcomes.push((OutboxKind::Create, created));
        outcomes.extend(rest);
        outcomes
    }

    /// Lifecycle hook for the app coming to the foreground: flush the
    /// outbox, mark doses missed today, then top up alarms.
    pub async fn on_foreground(&self) -> Result<ForegroundReport, EngineError> {
        let drained = self.drain_all().await;
        let missed_recorded = self.record_missed_doses().await?;

        let reminders = self.reminders.list().await?;
        let refresh = self.scheduler.refresh_all(&reminders).await;

        Ok(ForegroundReport {
            drained,
            missed_recorded,
            refresh,
        })
    }

    /// Records a missed event, stamped at the scheduled time, for every slot
    /// today whose grace period has run out without any event.
    pub async fn record_missed_doses(&self) -> Result<usize, EngineError> {
        let reminders = self.reminders.list().await?;
        let offset = self.clock.offset();
        let slots = self
            .ledger
            .missed_slots(&reminders, self.clock.local_now(), self.config.missed_grace)
            .await?;

        let mut recorded = 0;
        for slot in slots {
            let Some(stamp) = offset.from_local_datetime(&slot.scheduled).single() else {
                continue;
            };
            let dose = self
                .ledger
                .record(&slot.medication_id, false, stamp, Some(slot.slot))
                .await?;
            self.push(Mutation::RecordDose { dose }).await?;
            recorded += 1;
        }

        if recorded > 0 {
            tracing::info!(count = recorded, "Recorded missed doses");
        }
        Ok(recorded)
    }

    /// Replaces local reminders and doses with the backend's copy. Reminders
    /// with a queued create, update or toggle keep their local state, and
    /// reminders with a queued delete stay gone. Local state is left alone
    /// if either fetch fails.
    pub async fn pull_remote(&self) -> Result<PullReport, EngineError> {
        let budget = self.config.remote_timeout;
        let fetched = bounded::call(budget, self.remote.fetch_reminders()).await?;
        let remote_doses = bounded::call(budget, self.remote.fetch_doses()).await?;
        let received = fetched.len();

        let keep_reminders = self
            .queued_subjects(&[OutboxKind::Create, OutboxKind::Update, OutboxKind::Toggle])
            .await?;
        let deleted = self.queued_subjects(&[OutboxKind::Delete]).await?;
        let remote_reminders: Vec<MedicationReminder> = fetched
            .into_iter()
            .filter(|r| !deleted.contains(&r.id))
            .collect();
        let mut keep_doses = HashSet::new();
        for entry in self.outbox.pending(OutboxKind::Dose).await? {
            if let Mutation::RecordDose { dose } = entry.mutation {
                keep_doses.insert(dose.id);
            }
        }

        let before: HashSet<String> = self
            .reminders
            .list()
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect();

        self.reminders
            .replace_with(&remote_reminders, &keep_reminders)
            .await?;
        self.ledger.replace_with(&remote_doses, &keep_doses).await?;

        let reminders = self.reminders.list().await?;
        let after: HashSet<&str> = reminders.iter().map(|r| r.id.as_str()).collect();
        for gone in before.iter().filter(|id| !after.contains(id.as_str())) {
            self.settle_alarms(gone, self.scheduler.cancel_all(gone).await);
        }
        self.scheduler.refresh_all(&reminders).await;

        let report = PullReport {
            reminders: received,
            doses: remote_doses.len(),
            kept_local_reminders: keep_reminders.len(),
            kept_local_doses: keep_doses.len(),
        };
        tracing::info!(?report, "Pulled remote data");
        Ok(report)
    }

    /// Cancels every alarm and deletes all reminders and doses. Queued
    /// outbox entries are left in place.
    pub async fn clear_all_data(&self) -> Result<ClearReport, EngineError> {
        for reminder in self.reminders.list().await? {
            self.settle_alarms(&reminder.id, self.scheduler.cancel_all(&reminder.id).await);
        }

        let reminders = self.reminders.clear_all().await?;
        let doses = self.ledger.clear_all().await?;
        tracing::warn!(reminders, doses, "Cleared all local data");

        Ok(ClearReport { reminders, doses })
    }

    pub async fn reminders(&self) -> Result<Vec<MedicationReminder>, StoreError> {
        self.reminders.list().await
    }

    pub async fn reminder(&self, id: &str) -> Result<Option<MedicationReminder>, StoreError> {
        self.reminders.load(id).await
    }

    pub async fn today_doses(&self) -> Result<Vec<DoseEvent>, StoreError> {
        self.ledger.today().await
    }

    pub async fn slot_statuses(&self, day: NaiveDate) -> Result<Vec<SlotStatus>, StoreError> {
        let reminders = self.reminders.list().await?;
        self.ledger
            .slot_statuses(&reminders, day, self.clock.local_now(), self.config.missed_grace)
            .await
    }

    pub async fn daily_progress(&self) -> Result<f64, StoreError> {
        let reminders = self.reminders.list().await?;
        self.ledger
            .daily_progress(&reminders, self.clock.local_now(), self.config.missed_grace)
            .await
    }

    pub async fn adherence(&self, id: &str) -> Result<Adherence, EngineError> {
        let reminder = self
            .reminders
            .load(id)
            .await?
            .ok_or_else(|| domain::Error::NotFound {
                entity: domain::reminders::AGGREGATE_TYPE.to_string(),
            })?;
        Ok(self.ledger.adherence(&reminder).await?)
    }

    /// Ids of the records touched by queued writes of `kinds`.
    async fn queued_subjects(&self, kinds: &[OutboxKind]) -> Result<HashSet<String>, StoreError> {
        let mut ids = HashSet::new();
        for kind in kinds {
            for entry in self.outbox.pending(*kind).await? {
                if let Some(id) = entry.mutation.subject() {
                    ids.insert(id.to_string());
                }
            }
        }
        Ok(ids)
    }

    async fn push(&self, mutation: Mutation) -> Result<SyncStatus, StoreError> {
        match bounded::call(self.config.remote_timeout, self.remote.deliver(&mutation)).await {
            Ok(()) => Ok(SyncStatus::Synced),
            Err(e) => {
                tracing::warn!(kind = %mutation.kind(), error = %e, "Remote write failed, queueing");
                self.outbox.enqueue(mutation).await?;
                Ok(SyncStatus::Queued)
            }
        }
    }

    fn settle_alarms<T>(&self, medication_id: &str, result: Result<T, NotifyError>) -> bool {
        match result {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(medication = %medication_id, error = %e, "Failed to update alarms");
                false
            }
        }
    }

    /// Puts back a reminder whose queued creation is replayed after the local
    /// copy went missing, unless its deletion is queued too.
    async fn restore_if_missing(&self, reminder: &MedicationReminder) -> Result<(), StoreError> {
        if self.reminders.load(&reminder.id).await?.is_some() {
            return Ok(());
        }
        let deleted = self
            .outbox
            .pending(OutboxKind::Delete)
            .await?
            .iter()
            .any(|e| matches!(&e.mutation, Mutation::DeleteReminder { id } if *id == reminder.id));
        if deleted {
            return Ok(());
        }

        tracing::info!(medication = %reminder.id, "Restoring reminder from queued create");
        self.reminders.save(reminder).await
    }
}

/// Outbox replay. Queued creates also restore the local record and rebuild
/// its alarms from the stored copy once the backend has accepted them.
struct Replay<'a> {
    service: &'a MedRemind,
}

#[async_trait]
impl Deliver for Replay<'_> {
    async fn deliver(&self, mutation: &Mutation) -> Result<(), RemoteError> {
        let Mutation::CreateReminder { reminder } = mutation else {
            return self.service.remote.deliver(mutation).await;
        };

        if let Err(e) = self.service.restore_if_missing(reminder).await {
            tracing::warn!(medication = %reminder.id, error = %e, "Could not restore reminder locally");
        }

        self.service.remote.create_reminder(reminder).await?;

        // The queued snapshot may predate a local update or delete.
        let scheduler = &self.service.scheduler;
        let settled = match self.service.reminders.load(&reminder.id).await {
            Ok(Some(current)) if current.should_fire() => scheduler.reschedule(&current).await,
            Ok(_) => scheduler.cancel_all(&reminder.id).await,
            Err(e) => {
                tracing::warn!(medication = %reminder.id, error = %e, "Could not read reminder after replay");
                return Ok(());
            }
        };
        self.service.settle_alarms(&reminder.id, settled);
        Ok(())
    }
}
