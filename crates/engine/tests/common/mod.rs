#![allow(dead_code)]

use std::{
    collections::{BTreeMap, HashSet},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use domain::{reminders::ReminderInput, DoseEvent, MedicationReminder, ProfileUpdate};
use engine::{
    EngineConfig, FixedClock, LocalStore, MedRemind, MemoryNotifier, MemoryStore, RemoteApi,
    RemoteError,
};

/// Backend double whose connectivity, latency and rejections are set by the test.
#[derive(Default)]
pub struct ScriptedRemote {
    offline: AtomicBool,
    strict: AtomicBool,
    latency: Mutex<Option<Duration>>,
    create_latency: Mutex<Option<Duration>>,
    rejected: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
    reminders: Mutex<BTreeMap<String, MedicationReminder>>,
    doses: Mutex<Vec<DoseEvent>>,
    profile: Mutex<ProfileUpdate>,
}

impl ScriptedRemote {
    pub fn set_online(&self, online: bool) {
        self.offline.store(!online, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = Some(latency);
    }

    /// Extra delay on creates only, on top of the shared latency.
    pub fn set_create_latency(&self, latency: Duration) {
        *self.create_latency.lock().unwrap() = Some(latency);
    }

    /// Updates and toggles of reminders the backend has never seen get a 404.
    pub fn require_existing(&self) {
        self.strict.store(true, Ordering::SeqCst);
    }

    /// Every later call about `id` is answered with a 404.
    pub fn reject(&self, id: &str) {
        self.rejected.lock().unwrap().insert(id.to_string());
    }

    pub fn seed(&self, reminder: MedicationReminder) {
        self.reminders
            .lock()
            .unwrap()
            .insert(reminder.id.clone(), reminder);
    }

    pub fn seed_dose(&self, dose: DoseEvent) {
        self.doses.lock().unwrap().push(dose);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn reminder(&self, id: &str) -> Option<MedicationReminder> {
        self.reminders.lock().unwrap().get(id).cloned()
    }

    pub fn doses(&self) -> Vec<DoseEvent> {
        self.doses.lock().unwrap().clone()
    }

    pub fn profile(&self) -> ProfileUpdate {
        self.profile.lock().unwrap().clone()
    }

    async fn gate(&self, call: String, subject: Option<&str>) -> Result<(), RemoteError> {
        self.calls.lock().unwrap().push(call);

        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Network {
                message: "offline".into(),
            });
        }
        if subject.is_some_and(|id| self.rejected.lock().unwrap().contains(id)) {
            return Err(RemoteError::Rejected {
                status: 404,
                message: "not found".into(),
            });
        }
        Ok(())
    }

    fn ensure_known(&self, id: &str) -> Result<(), RemoteError> {
        if self.strict.load(Ordering::SeqCst) && !self.reminders.lock().unwrap().contains_key(id) {
            return Err(RemoteError::Rejected {
                status: 404,
                message: "not found".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteApi for ScriptedRemote {
    async fn create_reminder(&self, reminder: &MedicationReminder) -> Result<(), RemoteError> {
        let delay = *self.create_latency.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.gate(format!("create {}", reminder.id), Some(&reminder.id))
            .await?;
        self.seed(reminder.clone());
        Ok(())
    }

    async fn update_reminder(
        &self,
        id: &str,
        reminder: &MedicationReminder,
    ) -> Result<(), RemoteError> {
        self.gate(format!("update {id}"), Some(id)).await?;
        self.ensure_known(id)?;
        self.seed(reminder.clone());
        Ok(())
    }

    async fn delete_reminder(&self, id: &str) -> Result<(), RemoteError> {
        self.gate(format!("delete {id}"), Some(id)).await?;
        self.reminders.lock().unwrap().remove(id);
        Ok(())
    }

    async fn toggle_reminder(&self, id: &str, enabled: bool) -> Result<(), RemoteError> {
        self.gate(format!("toggle {id} {enabled}"), Some(id)).await?;
        self.ensure_known(id)?;
        if let Some(reminder) = self.reminders.lock().unwrap().get_mut(id) {
            reminder.reminder_enabled = enabled;
        }
        Ok(())
    }

    async fn record_dose(&self, dose: &DoseEvent) -> Result<(), RemoteError> {
        self.gate(format!("dose {}", dose.medication_id), Some(&dose.id))
            .await?;
        let mut doses = self.doses.lock().unwrap();
        if !doses.iter().any(|d| d.id == dose.id) {
            doses.push(dose.clone());
        }
        Ok(())
    }

    async fn update_profile(&self, update: &ProfileUpdate) -> Result<(), RemoteError> {
        self.gate("profile".to_string(), None).await?;
        self.profile.lock().unwrap().merge(update.clone());
        Ok(())
    }

    async fn fetch_reminders(&self) -> Result<Vec<MedicationReminder>, RemoteError> {
        self.gate("fetch reminders".to_string(), None).await?;
        Ok(self.reminders.lock().unwrap().values().cloned().collect())
    }

    async fn fetch_doses(&self) -> Result<Vec<DoseEvent>, RemoteError> {
        self.gate("fetch doses".to_string(), None).await?;
        Ok(self.doses())
    }
}

pub struct Harness {
    pub app: MedRemind,
    pub store: Arc<dyn LocalStore>,
    pub remote: Arc<ScriptedRemote>,
    pub notifier: Arc<MemoryNotifier>,
    pub clock: Arc<FixedClock>,
}

pub fn instant(ts: &str) -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339(ts).unwrap()
}

pub fn harness(now: &str) -> Harness {
    harness_with(Arc::new(MemoryStore::new()), now, EngineConfig::default())
}

pub fn harness_with(store: Arc<dyn LocalStore>, now: &str, config: EngineConfig) -> Harness {
    let remote = Arc::new(ScriptedRemote::default());
    let notifier = Arc::new(MemoryNotifier::new());
    let clock = Arc::new(FixedClock::new(instant(now)));
    let app = MedRemind::new(
        store.clone(),
        remote.clone(),
        notifier.clone(),
        clock.clone(),
        config,
    )
    .with_owner("user-1");

    Harness {
        app,
        store,
        remote,
        notifier,
        clock,
    }
}

pub fn input(name: &str, times: &[&str], duration: &str) -> ReminderInput {
    ReminderInput {
        name: name.to_string(),
        dosage: "1 tablet".to_string(),
        times: times.iter().map(|t| t.to_string()).collect(),
        start_date: "2024-01-01".to_string(),
        duration: duration.to_string(),
        day_frequency: None,
        color: None,
        meal_timing: None,
        reminder_enabled: true,
    }
}
