//! OS-level alarm registration.
//!
//! Pending alarms are the only record of what has been scheduled; the engine
//! never keeps its own copy, so duplicate suppression and cancellation both
//! go through [`NotificationBackend::list_pending`] and the payload tag.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use domain::reminders::{MealTiming, MedicationReminder};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use ulid::Ulid;

use crate::error::NotifyError;

pub const ALARM_TITLE: &str = "Medication Reminder";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct AlarmHandle(pub String);

/// Everything needed to render the notification and to find it again by medication.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AlarmPayload {
    pub medication_id: String,
    pub title: String,
    pub body: String,
    pub name: String,
    pub dosage: String,
    pub color: String,
    pub meal_timing: Option<MealTiming>,
    pub show_alarm_screen: bool,
}

impl AlarmPayload {
    pub fn for_reminder(reminder: &MedicationReminder, show_alarm_screen: bool) -> Self {
        Self {
            medication_id: reminder.id.clone(),
            title: ALARM_TITLE.to_string(),
            body: format!("Time to take {} ({})", reminder.name, reminder.dosage),
            name: reminder.name.clone(),
            dosage: reminder.dosage.clone(),
            color: reminder.color.clone(),
            meal_timing: reminder.meal_timing,
            show_alarm_screen,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingAlarm {
    pub handle: AlarmHandle,
    pub instant: NaiveDateTime,
    pub payload: AlarmPayload,
}

#[async_trait]
pub trait NotificationBackend: Send + Sync {
    async fn schedule_at(
        &self,
        instant: NaiveDateTime,
        payload: AlarmPayload,
    ) -> Result<AlarmHandle, NotifyError>;

    /// Cancels every pending alarm tagged with `medication_id`, returning how many.
    async fn cancel_by_tag(&self, medication_id: &str) -> Result<usize, NotifyError>;

    async fn list_pending(&self) -> Result<Vec<PendingAlarm>, NotifyError>;
}

/// In-process backend. Optionally caps the number of pending alarms the way
/// mobile platforms do.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    pending: Mutex<Vec<PendingAlarm>>,
    capacity: Option<usize>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pending: Mutex::default(),
            capacity: Some(capacity),
        }
    }

    /// Pending alarms for one medication, soonest first.
    pub async fn pending_for(&self, medication_id: &str) -> Vec<PendingAlarm> {
        let mut alarms: Vec<PendingAlarm> = self
            .pending
            .lock()
            .await
            .iter()
            .filter(|a| a.payload.medication_id == medication_id)
            .cloned()
            .collect();
        alarms.sort_by_key(|a| a.instant);
        alarms
    }
}

#[async_trait]
impl NotificationBackend for MemoryNotifier {
    async fn schedule_at(
        &self,
        instant: NaiveDateTime,
        payload: AlarmPayload,
    ) -> Result<AlarmHandle, NotifyError> {
        let mut pending = self.pending.lock().await;
        if self.capacity.is_some_and(|cap| pending.len() >= cap) {
            return Err(NotifyError::Backend {
                message: format!("pending alarm limit of {} reached", pending.len()),
            });
        }

        let handle = AlarmHandle(Ulid::new().to_string());
        pending.push(PendingAlarm {
            handle: handle.clone(),
            instant,
            payload,
        });
        Ok(handle)
    }

    async fn cancel_by_tag(&self, medication_id: &str) -> Result<usize, NotifyError> {
        let mut pending = self.pending.lock().await;
        let before = pending.len();
        pending.retain(|a| a.payload.medication_id != medication_id);
        Ok(before - pending.len())
    }

    async fn list_pending(&self) -> Result<Vec<PendingAlarm>, NotifyError> {
        Ok(self.pending.lock().await.clone())
    }
}
