//! Backend operations consumed by the engine. Transport lives elsewhere.

use async_trait::async_trait;
use domain::{DoseEvent, MedicationReminder, ProfileUpdate};

use crate::error::RemoteError;

/// Endpoints are expected to be idempotent: the outbox delivers at least once.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn create_reminder(&self, reminder: &MedicationReminder) -> Result<(), RemoteError>;

    async fn update_reminder(
        &self,
        id: &str,
        reminder: &MedicationReminder,
    ) -> Result<(), RemoteError>;

    async fn delete_reminder(&self, id: &str) -> Result<(), RemoteError>;

    async fn toggle_reminder(&self, id: &str, enabled: bool) -> Result<(), RemoteError>;

    async fn record_dose(&self, dose: &DoseEvent) -> Result<(), RemoteError>;

    async fn update_profile(&self, update: &ProfileUpdate) -> Result<(), RemoteError>;

    async fn fetch_reminders(&self) -> Result<Vec<MedicationReminder>, RemoteError>;

    async fn fetch_doses(&self) -> Result<Vec<DoseEvent>, RemoteError>;
}
