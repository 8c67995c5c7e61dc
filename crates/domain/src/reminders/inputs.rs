use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::errors::Error;

use super::aggregate::ReminderDetails;
use super::recurrence::{Course, MealTiming, Recurrence, TimeOfDay};

const PALETTE: [&str; 5] = ["#4CAF50", "#2196F3", "#FF9800", "#E91E63", "#9C27B0"];

/// Reminder as captured by the add/edit form, before parsing
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderInput {
    pub name: String,
    pub dosage: String,
    pub times: Vec<String>,
    /// `2024-01-01` or a full RFC 3339 timestamp
    pub start_date: String,
    /// Free text: `"7 วัน"`, `"30 days"`, `"ongoing"`
    pub duration: String,
    #[serde(default)]
    pub day_frequency: Option<u32>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub meal_timing: Option<MealTiming>,
    #[serde(default = "enabled_by_default")]
    pub reminder_enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl TryFrom<ReminderInput> for ReminderDetails {
    type Error = Error;

    fn try_from(input: ReminderInput) -> Result<Self, Self::Error> {
        let mut times = input
            .times
            .iter()
            .map(|t| TimeOfDay::parse(t))
            .collect::<Result<Vec<_>, _>>()?;
        times.sort();
        times.dedup();

        let recurrence = Recurrence::new(
            parse_start_date(&input.start_date)?,
            Course::parse(&input.duration)?,
            input.day_frequency.unwrap_or(1),
        )?;

        Ok(ReminderDetails {
            name: input.name.trim().to_string(),
            dosage: input.dosage.trim().to_string(),
            times,
            recurrence,
            color: input.color.unwrap_or_else(pick_color),
            meal_timing: input.meal_timing,
            reminder_enabled: input.reminder_enabled,
        })
    }
}

/// Plain dates are taken as-is; timestamps keep the calendar day of their own offset.
pub fn parse_start_date(value: &str) -> Result<NaiveDate, Error> {
    let value = value.trim();
    value
        .parse::<NaiveDate>()
        .or_else(|_| DateTime::parse_from_rfc3339(value).map(|dt| dt.date_naive()))
        .map_err(|_| Error::Validation {
            message: format!("Invalid start date: {value}"),
        })
}

fn pick_color() -> String {
    let index = (Ulid::new().random() % PALETTE.len() as u128) as usize;
    PALETTE[index].to_string()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn input() -> ReminderInput {
        ReminderInput {
            name: " Amoxicillin ".to_string(),
            dosage: "1 เม็ด".to_string(),
            times: vec!["21:00".to_string(), "09:00".to_string(), "09:00".to_string()],
            start_date: "2024-01-01T00:00:00+07:00".to_string(),
            duration: "3 วัน".to_string(),
            day_frequency: Some(2),
            color: None,
            meal_timing: Some(MealTiming::BeforeMeal),
            reminder_enabled: true,
        }
    }

    #[test]
    fn parses_form_input_once() {
        let details = ReminderDetails::try_from(input()).unwrap();
        assert_eq!(details.name, "Amoxicillin");
        assert_eq!(
            details.times,
            vec![TimeOfDay::new(9, 0).unwrap(), TimeOfDay::new(21, 0).unwrap()]
        );
        assert_eq!(
            details.recurrence,
            Recurrence {
                start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                course: Course::Days { count: 3 },
                day_frequency: 2,
            }
        );
        assert!(PALETTE.contains(&details.color.as_str()));
    }

    #[test]
    fn rejects_bad_slot_time() {
        let mut bad = input();
        bad.times.push("25:00".to_string());
        assert!(matches!(
            ReminderDetails::try_from(bad),
            Err(Error::InvalidTime { .. })
        ));
    }

    #[test]
    fn rejects_unparseable_duration() {
        let mut bad = input();
        bad.duration = "a while".to_string();
        assert!(matches!(
            ReminderDetails::try_from(bad),
            Err(Error::InvalidDuration { .. })
        ));
    }

    #[test]
    fn accepts_plain_start_date() {
        assert_eq!(
            parse_start_date("2024-03-05").unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
        );
        assert!(parse_start_date("05/03/2024").is_err());
    }
}
