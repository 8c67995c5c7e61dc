//! Durable queues of writes the backend has not acknowledged yet.
//!
//! One queue per mutation kind, each under its own store key. Entries are
//! replayed independently: delivered entries are dropped, failed ones stay
//! for the next drain, and entries that can never succeed end up in the
//! kind's dead-letter list.

use std::{fmt, str::FromStr};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use derive_new::new;
use domain::{DoseEvent, MedicationReminder, ProfileUpdate};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::{error::RemoteError, remote::RemoteApi};

pub mod manager;

pub use manager::{DrainOutcome, DrainStats, Outbox, QueueDepth};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutboxKind {
    #[serde(rename = "notificationCreate")]
    Create,
    Update,
    Delete,
    Toggle,
    Dose,
    Profile,
}

impl OutboxKind {
    pub const ALL: [OutboxKind; 6] = [
        OutboxKind::Create,
        OutboxKind::Update,
        OutboxKind::Delete,
        OutboxKind::Toggle,
        OutboxKind::Dose,
        OutboxKind::Profile,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxKind::Create => "notificationCreate",
            OutboxKind::Update => "update",
            OutboxKind::Delete => "delete",
            OutboxKind::Toggle => "toggle",
            OutboxKind::Dose => "dose",
            OutboxKind::Profile => "profile",
        }
    }

    pub fn queue_key(&self) -> String {
        format!("outbox.{}", self.as_str())
    }

    pub fn dead_letter_key(&self) -> String {
        format!("deadletter.{}", self.as_str())
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            OutboxKind::Create => 0,
            OutboxKind::Update => 1,
            OutboxKind::Delete => 2,
            OutboxKind::Toggle => 3,
            OutboxKind::Dose => 4,
            OutboxKind::Profile => 5,
        }
    }
}

impl fmt::Display for OutboxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutboxKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OutboxKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .or(match s.to_ascii_lowercase().as_str() {
                "create" => Some(OutboxKind::Create),
                _ => None,
            })
            .ok_or_else(|| format!("unknown outbox kind: {s}"))
    }
}

/// The data needed to replay one write against the backend.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Mutation {
    CreateReminder { reminder: MedicationReminder },
    UpdateReminder { id: String, reminder: MedicationReminder },
    DeleteReminder { id: String },
    ToggleReminder { id: String, enabled: bool },
    RecordDose { dose: DoseEvent },
    UpdateProfile { update: ProfileUpdate },
}

impl Mutation {
    pub fn kind(&self) -> OutboxKind {
        match self {
            Mutation::CreateReminder { .. } => OutboxKind::Create,
            Mutation::UpdateReminder { .. } => OutboxKind::Update,
            Mutation::DeleteReminder { .. } => OutboxKind::Delete,
            Mutation::ToggleReminder { .. } => OutboxKind::Toggle,
            Mutation::RecordDose { .. } => OutboxKind::Dose,
            Mutation::UpdateProfile { .. } => OutboxKind::Profile,
        }
    }

    /// Id of the record the write concerns.
    pub fn subject(&self) -> Option<&str> {
        match self {
            Mutation::CreateReminder { reminder } => Some(&reminder.id),
            Mutation::UpdateReminder { id, .. }
            | Mutation::DeleteReminder { id }
            | Mutation::ToggleReminder { id, .. } => Some(id),
            Mutation::RecordDose { dose } => Some(&dose.id),
            Mutation::UpdateProfile { .. } => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, new)]
pub struct OutboxEntry {
    #[new(value = "Ulid::new().to_string()")]
    pub id: String,
    pub mutation: Mutation,
    #[new(default)]
    #[serde(default)]
    pub attempts: u32,
    #[new(value = "Utc::now()")]
    pub enqueued_at: DateTime<Utc>,
    #[new(default)]
    #[serde(default)]
    pub last_error: Option<String>,
}

/// Replays one queued mutation.
#[async_trait]
pub trait Deliver: Send + Sync {
    async fn deliver(&self, mutation: &Mutation) -> Result<(), RemoteError>;
}

#[async_trait]
impl<R: RemoteApi + ?Sized> Deliver for R {
    async fn deliver(&self, mutation: &Mutation) -> Result<(), RemoteError> {
        match mutation {
            Mutation::CreateReminder { reminder } => self.create_reminder(reminder).await,
            Mutation::UpdateReminder { id, reminder } => self.update_reminder(id, reminder).await,
            Mutation::DeleteReminder { id } => self.delete_reminder(id).await,
            Mutation::ToggleReminder { id, enabled } => self.toggle_reminder(id, *enabled).await,
            Mutation::RecordDose { dose } => self.record_dose(dose).await,
            Mutation::UpdateProfile { update } => self.update_profile(update).await,
        }
    }
}
