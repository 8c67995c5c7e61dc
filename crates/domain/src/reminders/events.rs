use chrono::{DateTime, Utc};
use cqrs_es::DomainEvent;
use serde::{Deserialize, Serialize};

use super::aggregate::ReminderDetails;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Event {
    ReminderCreated {
        id: String,
        owner_id: Option<String>,
        details: ReminderDetails,
        created_at: DateTime<Utc>,
    },

    ReminderUpdated {
        id: String,
        details: ReminderDetails,
        updated_at: DateTime<Utc>,
    },

    ReminderToggled {
        id: String,
        enabled: bool,
        updated_at: DateTime<Utc>,
    },

    ReminderDeleted {
        id: String,
        updated_at: DateTime<Utc>,
    },
}

impl Event {
    pub fn reminder_id(&self) -> &str {
        match self {
            Event::ReminderCreated { id, .. }
            | Event::ReminderUpdated { id, .. }
            | Event::ReminderToggled { id, .. }
            | Event::ReminderDeleted { id, .. } => id,
        }
    }
}

impl DomainEvent for Event {
    fn event_type(&self) -> String {
        match self {
            Event::ReminderCreated { .. } => "Reminder:Created".to_string(),
            Event::ReminderUpdated { .. } => "Reminder:Updated".to_string(),
            Event::ReminderToggled { .. } => "Reminder:Toggled".to_string(),
            Event::ReminderDeleted { .. } => "Reminder:Deleted".to_string(),
        }
    }

    fn event_version(&self) -> String {
        "1.0".to_string()
    }
}
