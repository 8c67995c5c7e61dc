//! Append-only record of taken and missed doses, plus the derived queries
//! the scheduler and the today screen rely on.

use std::{collections::HashSet, sync::Arc};

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeDelta};
use domain::{reminders::TimeOfDay, DoseEvent, MedicationReminder};
use serde::Serialize;

use crate::{
    clock::Clock,
    error::StoreError,
    store::{self, LocalStore},
};

pub const DOSE_PREFIX: &str = "dose.";

pub fn dose_key(id: &str) -> String {
    format!("{DOSE_PREFIX}{id}")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DoseStatus {
    Taken,
    Missed,
    Pending,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotStatus {
    pub medication_id: String,
    pub name: String,
    pub slot: TimeOfDay,
    pub status: DoseStatus,
}

/// A slot whose grace period has passed without any recorded event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MissedSlot {
    pub medication_id: String,
    pub slot: TimeOfDay,
    pub scheduled: NaiveDateTime,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Adherence {
    pub taken: u32,
    /// `None` for an ongoing course.
    pub expected: Option<u32>,
}

impl Adherence {
    pub fn rate(&self) -> Option<f64> {
        match self.expected {
            Some(0) | None => None,
            Some(expected) => Some((f64::from(self.taken) / f64::from(expected)).min(1.0)),
        }
    }
}

pub struct DoseLedger {
    store: Arc<dyn LocalStore>,
    clock: Arc<dyn Clock>,
}

impl DoseLedger {
    pub fn new(store: Arc<dyn LocalStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Appends one event. No check is made against existing events or
    /// against the medication.
    pub async fn record(
        &self,
        medication_id: &str,
        taken: bool,
        timestamp: DateTime<FixedOffset>,
        slot: Option<TimeOfDay>,
    ) -> Result<DoseEvent, StoreError> {
        let dose = DoseEvent::new(medication_id.to_string(), taken, timestamp, slot);
        self.append(&dose).await?;
        Ok(dose)
    }

    pub async fn append(&self, dose: &DoseEvent) -> Result<(), StoreError> {
        store::save(self.store.as_ref(), &dose_key(&dose.id), dose).await?;
        tracing::debug!(dose = %dose.id, medication = %dose.medication_id, taken = dose.taken, "Recorded dose");
        Ok(())
    }

    /// Every event, oldest first. Undecodable records are logged and skipped.
    pub async fn all(&self) -> Result<Vec<DoseEvent>, StoreError> {
        let mut doses: Vec<DoseEvent> = store::scan_prefix(self.store.as_ref(), DOSE_PREFIX)
            .await?
            .into_iter()
            .filter_map(|(key, value)| match store::decode(&key, value) {
                Ok(dose) => Some(dose),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Skipping unreadable dose");
                    None
                }
            })
            .collect();
        doses.sort_by_key(|d: &DoseEvent| d.timestamp);
        Ok(doses)
    }

    pub async fn on_day(&self, day: NaiveDate) -> Result<Vec<DoseEvent>, StoreError> {
        let offset = self.clock.offset();
        Ok(self
            .all()
            .await?
            .into_iter()
            .filter(|d| d.local_day(&offset) == day)
            .collect())
    }

    pub async fn today(&self) -> Result<Vec<DoseEvent>, StoreError> {
        self.on_day(self.clock.today()).await
    }

    pub async fn is_dose_taken(
        &self,
        medication_id: &str,
        day: NaiveDate,
        slot: Option<TimeOfDay>,
    ) -> Result<bool, StoreError> {
        let offset = self.clock.offset();
        Ok(self
            .on_day(day)
            .await?
            .iter()
            .any(|d| d.taken && d.covers(medication_id, day, slot, &offset)))
    }

    /// Like [`Self::is_dose_taken`] but also matches missed events.
    pub async fn has_event_for(
        &self,
        medication_id: &str,
        day: NaiveDate,
        slot: Option<TimeOfDay>,
    ) -> Result<bool, StoreError> {
        let offset = self.clock.offset();
        Ok(self
            .on_day(day)
            .await?
            .iter()
            .any(|d| d.covers(medication_id, day, slot, &offset)))
    }

    /// Slots due today whose time plus `grace` is before `now` and which
    /// have no event at all.
    pub async fn missed_slots(
        &self,
        reminders: &[MedicationReminder],
        now: NaiveDateTime,
        grace: TimeDelta,
    ) -> Result<Vec<MissedSlot>, StoreError> {
        let today = now.date();
        let offset = self.clock.offset();
        let events = self.on_day(today).await?;

        let mut missed = Vec::new();
        for reminder in reminders.iter().filter(|r| r.should_fire()) {
            if !reminder.recurrence.is_due_on(today) {
                continue;
            }
            for slot in &reminder.times {
                let scheduled = slot.on(today);
                if !grace_expired(scheduled, grace, now) {
                    continue;
                }
                let recorded = events
                    .iter()
                    .any(|d| d.covers(&reminder.id, today, Some(*slot), &offset));
                if !recorded {
                    missed.push(MissedSlot {
                        medication_id: reminder.id.clone(),
                        slot: *slot,
                        scheduled,
                    });
                }
            }
        }
        Ok(missed)
    }

    /// Status of every slot due on `day`. Past days count untaken slots as
    /// missed; today only once the grace period is over.
    pub async fn slot_statuses(
        &self,
        reminders: &[MedicationReminder],
        day: NaiveDate,
        now: NaiveDateTime,
        grace: TimeDelta,
    ) -> Result<Vec<SlotStatus>, StoreError> {
        let offset = self.clock.offset();
        let events = self.on_day(day).await?;

        let mut statuses = Vec::new();
        for reminder in reminders.iter().filter(|r| !r.deleted) {
            if !reminder.recurrence.is_due_on(day) {
                continue;
            }
            for slot in &reminder.times {
                let matching: Vec<&DoseEvent> = events
                    .iter()
                    .filter(|d| d.covers(&reminder.id, day, Some(*slot), &offset))
                    .collect();

                let status = if matching.iter().any(|d| d.taken) {
                    DoseStatus::Taken
                } else if !matching.is_empty() || grace_expired(slot.on(day), grace, now) {
                    DoseStatus::Missed
                } else {
                    DoseStatus::Pending
                };

                statuses.push(SlotStatus {
                    medication_id: reminder.id.clone(),
                    name: reminder.name.clone(),
                    slot: *slot,
                    status,
                });
            }
        }
        Ok(statuses)
    }

    pub async fn adherence(&self, reminder: &MedicationReminder) -> Result<Adherence, StoreError> {
        let taken = self
            .all()
            .await?
            .iter()
            .filter(|d| d.taken && d.medication_id == reminder.id)
            .count();

        let per_day = u32::try_from(reminder.times.len()).unwrap_or(u32::MAX);
        Ok(Adherence {
            taken: u32::try_from(taken).unwrap_or(u32::MAX),
            expected: reminder
                .recurrence
                .due_days()
                .map(|days| days.saturating_mul(per_day)),
        })
    }

    /// Share of today's enabled slots already taken, in `[0, 1]`.
    pub async fn daily_progress(
        &self,
        reminders: &[MedicationReminder],
        now: NaiveDateTime,
        grace: TimeDelta,
    ) -> Result<f64, StoreError> {
        let enabled: Vec<MedicationReminder> = reminders
            .iter()
            .filter(|r| r.reminder_enabled)
            .cloned()
            .collect();
        let statuses = self.slot_statuses(&enabled, now.date(), now, grace).await?;
        if statuses.is_empty() {
            return Ok(0.0);
        }

        let taken = statuses
            .iter()
            .filter(|s| s.status == DoseStatus::Taken)
            .count();
        Ok((taken as f64 / statuses.len() as f64).clamp(0.0, 1.0))
    }

    /// Replaces the ledger with `doses`, keeping local events whose ids are
    /// in `keep`.
    pub async fn replace_with(
        &self,
        doses: &[DoseEvent],
        keep: &HashSet<String>,
    ) -> Result<(), StoreError> {
        for (key, _) in store::scan_prefix(self.store.as_ref(), DOSE_PREFIX).await? {
            let id = key.trim_start_matches(DOSE_PREFIX);
            if !keep.contains(id) {
                self.store.delete(&key).await?;
            }
        }
        for dose in doses {
            self.append(dose).await?;
        }
        Ok(())
    }

    /// Deletes every event and returns how many there were.
    pub async fn clear_all(&self) -> Result<usize, StoreError> {
        let keys = store::scan_prefix(self.store.as_ref(), DOSE_PREFIX).await?;
        for (key, _) in &keys {
            self.store.delete(key).await?;
        }
        tracing::info!(count = keys.len(), "Cleared dose history");
        Ok(keys.len())
    }
}

/// A grace period that runs past the calendar never expires.
fn grace_expired(scheduled: NaiveDateTime, grace: TimeDelta, now: NaiveDateTime) -> bool {
    scheduled
        .checked_add_signed(grace)
        .is_some_and(|deadline| deadline < now)
}
