use std::{collections::HashSet, sync::Arc};

use cqrs_es::{Aggregate, DomainEvent};
use domain::reminders::{Command, MedicationReminder, Services};

use crate::{
    error::{EngineError, StoreError},
    store::{self, LocalStore},
};

pub const MEDICATION_PREFIX: &str = "medication.";

pub fn medication_key(id: &str) -> String {
    format!("{MEDICATION_PREFIX}{id}")
}

/// Current state of each reminder, one store key per medication.
///
/// Commands run through the aggregate's `handle`/`apply` pair and the
/// resulting state is written back. There is no event log on the device.
pub struct ReminderRepository {
    store: Arc<dyn LocalStore>,
    services: Services,
}

impl ReminderRepository {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self {
            store,
            services: Services::default(),
        }
    }

    pub async fn load(&self, id: &str) -> Result<Option<MedicationReminder>, StoreError> {
        store::load(self.store.as_ref(), &medication_key(id)).await
    }

    /// All stored reminders in key order. Records that no longer decode are
    /// logged and left out rather than failing the whole list.
    pub async fn list(&self) -> Result<Vec<MedicationReminder>, StoreError> {
        Ok(store::scan_prefix(self.store.as_ref(), MEDICATION_PREFIX)
            .await?
            .into_iter()
            .filter_map(
                |(key, value)| match store::decode::<MedicationReminder>(&key, value) {
                    Ok(reminder) => Some(reminder),
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "Skipping unreadable reminder");
                        None
                    }
                },
            )
            .collect())
    }

    pub async fn save(&self, reminder: &MedicationReminder) -> Result<(), StoreError> {
        store::save(self.store.as_ref(), &medication_key(&reminder.id), reminder).await
    }

    pub async fn remove(&self, id: &str) -> Result<(), StoreError> {
        self.store.delete(&medication_key(id)).await
    }

    /// Runs `command` against the reminder stored under `id` (or a blank one)
    /// and persists the outcome. A deleted reminder is removed from the store.
    pub async fn execute(
        &self,
        id: &str,
        command: Command,
    ) -> Result<MedicationReminder, EngineError> {
        let mut reminder = self.load(id).await?.unwrap_or_default();

        let events = reminder.handle(command, &self.services).await?;
        if events.is_empty() {
            return Ok(reminder);
        }
        for event in events {
            tracing::debug!(
                medication = event.reminder_id(),
                event = %event.event_type(),
                "Applying reminder event"
            );
            reminder.apply(event);
        }

        if reminder.deleted {
            self.remove(id).await?;
        } else {
            self.save(&reminder).await?;
        }
        Ok(reminder)
    }

    /// Replaces every stored reminder with `reminders`, keeping local ones
    /// whose ids are in `keep`.
    pub async fn replace_with(
        &self,
        reminders: &[MedicationReminder],
        keep: &HashSet<String>,
    ) -> Result<(), StoreError> {
        for (key, _) in store::scan_prefix(self.store.as_ref(), MEDICATION_PREFIX).await? {
            let id = key.trim_start_matches(MEDICATION_PREFIX);
            if !keep.contains(id) {
                self.store.delete(&key).await?;
            }
        }
        for reminder in reminders.iter().filter(|r| !keep.contains(&r.id)) {
            self.save(reminder).await?;
        }
        Ok(())
    }

    pub async fn clear_all(&self) -> Result<usize, StoreError> {
        let keys = store::scan_prefix(self.store.as_ref(), MEDICATION_PREFIX).await?;
        for (key, _) in &keys {
            self.store.delete(key).await?;
        }
        Ok(keys.len())
    }
}
