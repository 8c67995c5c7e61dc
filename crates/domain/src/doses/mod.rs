use chrono::{DateTime, FixedOffset, NaiveDate};
use derive_new::new;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::reminders::TimeOfDay;

/// One "taken" or "missed" mark. Never mutated once written.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, new)]
#[serde(rename_all = "camelCase")]
pub struct DoseEvent {
    #[new(value = "Ulid::new().to_string()")]
    pub id: String,
    /// No referential check; a dose may outlive its medication
    pub medication_id: String,
    pub taken: bool,
    pub timestamp: DateTime<FixedOffset>,
    #[serde(default, rename = "time", skip_serializing_if = "Option::is_none")]
    pub slot: Option<TimeOfDay>,
}

impl DoseEvent {
    /// Calendar day of the event as seen from `offset`.
    pub fn local_day(&self, offset: &FixedOffset) -> NaiveDate {
        self.timestamp.with_timezone(offset).date_naive()
    }

    /// Approximate slot match: `timestamp` is the tap time, not the scheduled time.
    /// An event without a slot matches every slot of its day.
    pub fn covers(
        &self,
        medication_id: &str,
        day: NaiveDate,
        slot: Option<TimeOfDay>,
        offset: &FixedOffset,
    ) -> bool {
        if self.medication_id != medication_id || self.local_day(offset) != day {
            return false;
        }
        match (self.slot, slot) {
            (Some(recorded), Some(wanted)) => recorded == wanted,
            _ => true,
        }
    }
}
