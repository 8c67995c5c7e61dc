use serde::{Deserialize, Serialize};

use super::aggregate::ReminderDetails;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Command {
    /// Register a new reminder under a client-generated id
    CreateReminder {
        id: String,
        owner_id: Option<String>,
        details: ReminderDetails,
    },

    /// Replace every editable field
    UpdateReminder { details: ReminderDetails },

    /// Flip the master reminder switch
    ToggleReminder { enabled: bool },

    /// Remove the reminder
    DeleteReminder,
}
