use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cqrs_es::Aggregate;
use serde::{Deserialize, Serialize};

use crate::errors::Error;

use super::recurrence::{Course, MealTiming, Recurrence, TimeOfDay};
use super::{Command, Event};

/// Editable part of a reminder, already parsed into typed values
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReminderDetails {
    pub name: String,
    pub dosage: String,
    pub times: Vec<TimeOfDay>,
    pub recurrence: Recurrence,
    pub color: String,
    pub meal_timing: Option<MealTiming>,
    pub reminder_enabled: bool,
}

impl ReminderDetails {
    fn validate(&self) -> Result<(), Error> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation {
                message: "Medication name is required".to_string(),
            });
        }
        if self.recurrence.day_frequency == 0 {
            return Err(Error::Validation {
                message: "Day frequency must be at least 1".to_string(),
            });
        }
        if let Course::Days { count: 0 } = self.recurrence.course {
            return Err(Error::InvalidDuration {
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

/// Medication reminder aggregate
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MedicationReminder {
    pub id: String,
    pub owner_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    pub name: String,
    pub dosage: String,
    pub times: Vec<TimeOfDay>,
    pub recurrence: Recurrence,
    pub color: String,
    pub meal_timing: Option<MealTiming>,
    pub reminder_enabled: bool,

    pub deleted: bool,
}

pub const AGGREGATE_TYPE: &str = "MedicationReminder";

#[derive(Clone, Default)]
pub struct Services {}

#[async_trait]
impl Aggregate for MedicationReminder {
    type Command = Command;
    type Event = Event;
    type Error = Error;
    type Services = Services;

    fn aggregate_type() -> String {
        AGGREGATE_TYPE.to_string()
    }

    async fn handle(
        &self,
        command: Self::Command,
        _services: &Self::Services,
    ) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            Command::CreateReminder {
                id,
                owner_id,
                details,
            } => {
                self.validate_new()?;
                if id.is_empty() {
                    return Err(Error::Validation {
                        message: "Reminder id is required".to_string(),
                    });
                }
                details.validate()?;

                Ok(vec![Event::ReminderCreated {
                    id,
                    owner_id,
                    details,
                    created_at: Utc::now(),
                }])
            }

            Command::UpdateReminder { details } => {
                self.validate_existing()?;
                details.validate()?;

                Ok(vec![Event::ReminderUpdated {
                    id: self.id.clone(),
                    details,
                    updated_at: Utc::now(),
                }])
            }

            Command::ToggleReminder { enabled } => {
                self.validate_existing()?;
                if enabled == self.reminder_enabled {
                    return Ok(vec![]);
                }

                Ok(vec![Event::ReminderToggled {
                    id: self.id.clone(),
                    enabled,
                    updated_at: Utc::now(),
                }])
            }

            Command::DeleteReminder => {
                self.validate_existing()?;

                Ok(vec![Event::ReminderDeleted {
                    id: self.id.clone(),
                    updated_at: Utc::now(),
                }])
            }
        }
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            Event::ReminderCreated {
                id,
                owner_id,
                details,
                created_at,
            } => {
                self.id = id;
                self.owner_id = owner_id;
                self.created_at = created_at;
                self.updated_at = created_at;
                self.set_details(details);
            }

            Event::ReminderUpdated {
                details,
                updated_at,
                ..
            } => {
                self.set_details(details);
                self.updated_at = updated_at;
            }

            Event::ReminderToggled {
                enabled,
                updated_at,
                ..
            } => {
                self.reminder_enabled = enabled;
                self.updated_at = updated_at;
            }

            Event::ReminderDeleted { updated_at, .. } => {
                self.deleted = true;
                self.updated_at = updated_at;
            }
        }
    }
}

impl MedicationReminder {
    pub fn details(&self) -> ReminderDetails {
        ReminderDetails {
            name: self.name.clone(),
            dosage: self.dosage.clone(),
            times: self.times.clone(),
            recurrence: self.recurrence,
            color: self.color.clone(),
            meal_timing: self.meal_timing,
            reminder_enabled: self.reminder_enabled,
        }
    }

    /// Whether the scheduler should keep alarms registered for this reminder.
    pub fn should_fire(&self) -> bool {
        self.reminder_enabled && !self.deleted && !self.times.is_empty()
    }

    fn set_details(&mut self, details: ReminderDetails) {
        self.name = details.name;
        self.dosage = details.dosage;
        self.times = details.times;
        self.recurrence = details.recurrence;
        self.color = details.color;
        self.meal_timing = details.meal_timing;
        self.reminder_enabled = details.reminder_enabled;
    }

    fn validate_new(&self) -> Result<(), Error> {
        if !self.id.is_empty() {
            return Err(Error::Uniqueness {
                field: "id".to_string(),
            });
        }
        Ok(())
    }

    fn validate_existing(&self) -> Result<(), Error> {
        if self.id.is_empty() {
            return Err(Error::NotFound {
                entity: AGGREGATE_TYPE.to_string(),
            });
        }
        if self.deleted {
            return Err(Error::Forbidden);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn details() -> ReminderDetails {
        ReminderDetails {
            name: "Metformin".to_string(),
            dosage: "500 mg".to_string(),
            times: vec![TimeOfDay::new(9, 0).unwrap(), TimeOfDay::new(21, 0).unwrap()],
            recurrence: Recurrence::new(
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                Course::Days { count: 3 },
                1,
            )
            .unwrap(),
            color: "#4CAF50".to_string(),
            meal_timing: Some(MealTiming::AfterMeal),
            reminder_enabled: true,
        }
    }

    async fn run(reminder: &mut MedicationReminder, command: Command) -> Result<Vec<Event>, Error> {
        let events = reminder.handle(command, &Services::default()).await?;
        for event in events.clone() {
            reminder.apply(event);
        }
        Ok(events)
    }

    async fn created() -> MedicationReminder {
        let mut reminder = MedicationReminder::default();
        run(
            &mut reminder,
            Command::CreateReminder {
                id: "med-1".to_string(),
                owner_id: Some("user-1".to_string()),
                details: details(),
            },
        )
        .await
        .unwrap();
        reminder
    }

    #[tokio::test]
    async fn create_populates_record() {
        let reminder = created().await;
        assert_eq!(reminder.id, "med-1");
        assert_eq!(reminder.owner_id.as_deref(), Some("user-1"));
        assert_eq!(reminder.details(), details());
        assert!(reminder.should_fire());
    }

    #[tokio::test]
    async fn create_twice_is_a_uniqueness_conflict() {
        let mut reminder = created().await;
        let err = run(
            &mut reminder,
            Command::CreateReminder {
                id: "med-1".to_string(),
                owner_id: None,
                details: details(),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err, Error::Uniqueness { field: "id".to_string() });
    }

    #[tokio::test]
    async fn blank_name_is_rejected() {
        let mut reminder = MedicationReminder::default();
        let mut bad = details();
        bad.name = "  ".to_string();
        let err = run(
            &mut reminder,
            Command::CreateReminder {
                id: "med-1".to_string(),
                owner_id: None,
                details: bad,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[tokio::test]
    async fn commands_on_missing_reminder_are_not_found() {
        let mut reminder = MedicationReminder::default();
        let err = run(&mut reminder, Command::ToggleReminder { enabled: false })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn toggle_to_same_state_emits_nothing() {
        let mut reminder = created().await;
        let events = run(&mut reminder, Command::ToggleReminder { enabled: true })
            .await
            .unwrap();
        assert!(events.is_empty());

        let events = run(&mut reminder, Command::ToggleReminder { enabled: false })
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert!(!reminder.reminder_enabled);
        assert!(!reminder.should_fire());
    }

    #[tokio::test]
    async fn update_replaces_details() {
        let mut reminder = created().await;
        let mut changed = details();
        changed.times = vec![TimeOfDay::new(8, 30).unwrap()];
        changed.dosage = "1000 mg".to_string();
        run(&mut reminder, Command::UpdateReminder { details: changed.clone() })
            .await
            .unwrap();
        assert_eq!(reminder.details(), changed);
        assert_eq!(reminder.id, "med-1");
    }

    #[tokio::test]
    async fn deleted_reminder_rejects_further_commands() {
        let mut reminder = created().await;
        run(&mut reminder, Command::DeleteReminder).await.unwrap();
        assert!(reminder.deleted);

        let err = run(&mut reminder, Command::UpdateReminder { details: details() })
            .await
            .unwrap_err();
        assert_eq!(err, Error::Forbidden);
    }
}
