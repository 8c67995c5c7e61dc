use std::{env, time::Duration};

use chrono::TimeDelta;

/// Tunables for reconciliation and scheduling.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Budget for each remote call, immediate or replayed.
    pub remote_timeout: Duration,
    /// Attempts before an entry is dead-lettered. `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Days of fire instants registered ahead, today included.
    pub lookahead_days: u32,
    /// Time past a slot after which an unrecorded dose counts as missed.
    pub missed_grace: TimeDelta,
    pub show_alarm_screen: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            remote_timeout: Duration::from_secs(3),
            max_attempts: Some(12),
            lookahead_days: 2,
            missed_grace: TimeDelta::minutes(60),
            show_alarm_screen: true,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let remote_timeout = lookup("MEDREMIND_REMOTE_TIMEOUT_MS")
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.remote_timeout);

        let max_attempts = match lookup("MEDREMIND_MAX_ATTEMPTS") {
            Some(v) if v.eq_ignore_ascii_case("unbounded") => None,
            Some(v) => match v.parse::<u32>() {
                Ok(0) => None,
                Ok(n) => Some(n),
                Err(_) => defaults.max_attempts,
            },
            None => defaults.max_attempts,
        };

        let lookahead_days = lookup("MEDREMIND_LOOKAHEAD_DAYS")
            .and_then(|v| v.parse().ok())
            .filter(|days: &u32| *days > 0)
            .unwrap_or(defaults.lookahead_days);

        let missed_grace = lookup("MEDREMIND_MISSED_GRACE_MIN")
            .and_then(|v| v.parse().ok())
            .and_then(TimeDelta::try_minutes)
            .unwrap_or(defaults.missed_grace);

        let show_alarm_screen = lookup("MEDREMIND_SHOW_ALARM_SCREEN")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.show_alarm_screen);

        Self {
            remote_timeout,
            max_attempts,
            lookahead_days,
            missed_grace,
            show_alarm_screen,
        }
    }
}
