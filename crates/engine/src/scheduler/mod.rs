//! Keeps the notification backend's pending alarms in line with each
//! reminder's definition over a short rolling window.
//!
//! Nothing about what was scheduled is persisted here. The backend's pending
//! list is the only record; it is consulted for duplicate suppression and for
//! a reminder's [`ScheduleState`].

use std::{collections::HashSet, sync::Arc};

use chrono::NaiveDateTime;
use domain::MedicationReminder;
use serde::Serialize;

use crate::{
    clock::Clock,
    config::EngineConfig,
    error::NotifyError,
    notify::{AlarmPayload, NotificationBackend},
};

pub mod plan;

pub use plan::{plan, LookaheadWindow};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state")]
pub enum ScheduleState {
    Unscheduled,
    Scheduled { pending: Vec<NaiveDateTime> },
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    /// Reminders that synced cleanly.
    pub synced: usize,
    /// Alarms newly registered across all reminders.
    pub registered: usize,
    /// `(medication id, error)` for each reminder that could not be synced.
    pub failed: Vec<(String, String)>,
}

pub struct ReminderScheduler {
    notifier: Arc<dyn NotificationBackend>,
    clock: Arc<dyn Clock>,
    lookahead_days: u32,
    show_alarm_screen: bool,
}

impl ReminderScheduler {
    pub fn new(
        notifier: Arc<dyn NotificationBackend>,
        clock: Arc<dyn Clock>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            notifier,
            clock,
            lookahead_days: config.lookahead_days,
            show_alarm_screen: config.show_alarm_screen,
        }
    }

    pub fn window(&self) -> LookaheadWindow {
        LookaheadWindow::rolling(self.clock.today(), self.lookahead_days)
    }

    /// Instants `sync` would want pending right now.
    pub fn upcoming(&self, reminder: &MedicationReminder) -> Vec<NaiveDateTime> {
        plan(reminder, &self.window(), self.clock.local_now())
    }

    /// Registers missing alarms for the rolling window and returns how many
    /// were added. Disabled, deleted or lapsed reminders have their alarms
    /// cancelled instead.
    pub async fn sync(&self, reminder: &MedicationReminder) -> Result<usize, NotifyError> {
        if !reminder.should_fire() || reminder.recurrence.has_lapsed(self.clock.today()) {
            let cancelled = self.cancel_all(&reminder.id).await?;
            if cancelled > 0 {
                tracing::info!(medication = %reminder.id, cancelled, "Cancelled alarms for inactive reminder");
            }
            return Ok(0);
        }

        let already: HashSet<NaiveDateTime> = self
            .notifier
            .list_pending()
            .await?
            .into_iter()
            .filter(|alarm| alarm.payload.medication_id == reminder.id)
            .map(|alarm| alarm.instant)
            .collect();

        let mut registered = 0;
        for instant in self.upcoming(reminder) {
            if already.contains(&instant) {
                continue;
            }
            let payload = AlarmPayload::for_reminder(reminder, self.show_alarm_screen);
            self.notifier.schedule_at(instant, payload).await?;
            registered += 1;
        }

        tracing::debug!(medication = %reminder.id, registered, existing = already.len(), "Synced alarms");
        Ok(registered)
    }

    /// Full teardown then rebuild, used after an edit.
    pub async fn reschedule(&self, reminder: &MedicationReminder) -> Result<usize, NotifyError> {
        self.cancel_all(&reminder.id).await?;
        self.sync(reminder).await
    }

    pub async fn cancel_all(&self, medication_id: &str) -> Result<usize, NotifyError> {
        self.notifier.cancel_by_tag(medication_id).await
    }

    pub async fn state_of(&self, medication_id: &str) -> Result<ScheduleState, NotifyError> {
        let mut pending: Vec<NaiveDateTime> = self
            .notifier
            .list_pending()
            .await?
            .into_iter()
            .filter(|alarm| alarm.payload.medication_id == medication_id)
            .map(|alarm| alarm.instant)
            .collect();

        if pending.is_empty() {
            return Ok(ScheduleState::Unscheduled);
        }
        pending.sort();
        Ok(ScheduleState::Scheduled { pending })
    }

    /// Syncs every reminder. A failure for one reminder is logged and
    /// reported without stopping the others.
    pub async fn refresh_all(&self, reminders: &[MedicationReminder]) -> RefreshReport {
        let mut report = RefreshReport::default();

        for reminder in reminders {
            match self.sync(reminder).await {
                Ok(registered) => {
                    report.synced += 1;
                    report.registered += registered;
                }
                Err(e) => {
                    tracing::error!(medication = %reminder.id, error = %e, "Failed to schedule reminder");
                    report.failed.push((reminder.id.clone(), e.to_string()));
                }
            }
        }

        tracing::info!(
            synced = report.synced,
            registered = report.registered,
            failed = report.failed.len(),
            "Refreshed reminder schedules"
        );
        report
    }
}
