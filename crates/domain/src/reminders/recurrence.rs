use std::{fmt, str::FromStr, sync::LazyLock};

use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::Error;

static ONGOING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(ongoing|ต่อเนื่อง)").expect("static pattern"));

static DAY_COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d+").expect("static pattern"));

/// Local wall-clock slot, serialized as `"HH:MM"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(NaiveTime);

impl TimeOfDay {
    pub fn new(hour: u32, minute: u32) -> Result<Self, Error> {
        NaiveTime::from_hms_opt(hour, minute, 0)
            .map(Self)
            .ok_or_else(|| Error::InvalidTime {
                value: format!("{hour:02}:{minute:02}"),
            })
    }

    pub fn parse(value: &str) -> Result<Self, Error> {
        let invalid = || Error::InvalidTime {
            value: value.to_string(),
        };

        let (hour, minute) = value.trim().split_once(':').ok_or_else(invalid)?;
        let component = |part: &str| -> Result<u32, Error> {
            if part.is_empty() || part.len() > 2 || !part.chars().all(|c| c.is_ascii_digit()) {
                return Err(invalid());
            }
            part.parse().map_err(|_| invalid())
        };

        Self::new(component(hour)?, component(minute)?).map_err(|_| invalid())
    }

    pub fn hour(&self) -> u32 {
        self.0.hour()
    }

    pub fn minute(&self) -> u32 {
        self.0.minute()
    }

    pub fn as_naive(&self) -> NaiveTime {
        self.0
    }

    /// The wall-clock instant of this slot on `date`.
    pub fn on(&self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(self.0)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl FromStr for TimeOfDay {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// How long a medication course runs.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Course {
    Days { count: u32 },
    Ongoing,
}

impl Course {
    /// Parses the free-text duration captured by the add/edit form
    /// (`"7 วัน"`, `"30 days"`, `"ongoing"`, `"ต่อเนื่อง"`).
    pub fn parse(value: &str) -> Result<Self, Error> {
        if ONGOING.is_match(value) {
            return Ok(Course::Ongoing);
        }

        let invalid = || Error::InvalidDuration {
            value: value.to_string(),
        };

        let found = DAY_COUNT.find(value).ok_or_else(invalid)?;
        let count: i64 = found.as_str().parse().map_err(|_| invalid())?;

        match count {
            // the form stores -1 for "no end"
            n if n < 0 => Ok(Course::Ongoing),
            0 => Err(invalid()),
            n => u32::try_from(n)
                .map(|count| Course::Days { count })
                .map_err(|_| invalid()),
        }
    }

    pub fn is_ongoing(&self) -> bool {
        matches!(self, Course::Ongoing)
    }
}

/// Every `day_frequency` days from `start_date` for the length of the course.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Recurrence {
    pub start_date: NaiveDate,
    pub course: Course,
    pub day_frequency: u32,
}

impl Default for Recurrence {
    fn default() -> Self {
        Self {
            start_date: NaiveDate::default(),
            course: Course::Ongoing,
            day_frequency: 1,
        }
    }
}

impl Recurrence {
    pub fn new(start_date: NaiveDate, course: Course, day_frequency: u32) -> Result<Self, Error> {
        if day_frequency == 0 {
            return Err(Error::Validation {
                message: "day frequency must be at least 1".to_string(),
            });
        }
        if let Course::Days { count: 0 } = course {
            return Err(Error::InvalidDuration {
                value: "0".to_string(),
            });
        }

        Ok(Self {
            start_date,
            course,
            day_frequency,
        })
    }

    /// Last active day, inclusive. `None` for an ongoing course.
    pub fn last_day(&self) -> Option<NaiveDate> {
        match self.course {
            Course::Ongoing => None,
            Course::Days { count } => self
                .start_date
                .checked_add_days(Days::new(u64::from(count.saturating_sub(1)))),
        }
    }

    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        if date < self.start_date {
            return false;
        }
        self.last_day().map_or(true, |last| date <= last)
    }

    pub fn is_due_on(&self, date: NaiveDate) -> bool {
        if !self.is_active_on(date) {
            return false;
        }
        let offset = (date - self.start_date).num_days();
        offset % i64::from(self.day_frequency.max(1)) == 0
    }

    /// True once `today` is past the last active day.
    pub fn has_lapsed(&self, today: NaiveDate) -> bool {
        self.last_day().is_some_and(|last| today > last)
    }

    /// Number of days on which a dose falls due, `None` when ongoing.
    pub fn due_days(&self) -> Option<u32> {
        match self.course {
            Course::Ongoing => None,
            Course::Days { count } => {
                let frequency = self.day_frequency.max(1);
                Some(count.div_ceil(frequency))
            }
        }
    }
}

/// Whether a dose goes before or after a meal. Display only.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MealTiming {
    BeforeMeal,
    AfterMeal,
}
