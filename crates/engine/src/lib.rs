//! Offline-first reminder engine: outbox replay, alarm scheduling and the
//! dose ledger, wired together by [`MedRemind`].

/// Remote calls under a time budget
pub mod bounded;

/// Device clock
pub mod clock;

/// Engine tunables
pub mod config;

/// Engine errors
pub mod error;

/// Dose ledger
pub mod ledger;

/// Alarm backend
pub mod notify;

/// Offline write queues
pub mod outbox;

/// Reminder repository
pub mod reminders;

/// Backend API
pub mod remote;

/// Alarm scheduling
pub mod scheduler;

/// App-facing facade
pub mod service;

/// Local key/value storage
pub mod store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::EngineConfig;
pub use error::{EngineError, NotifyError, RemoteError, StoreError};
pub use ledger::DoseLedger;
pub use notify::{MemoryNotifier, NotificationBackend};
pub use outbox::{DrainOutcome, Outbox, OutboxKind};
pub use remote::RemoteApi;
pub use scheduler::ReminderScheduler;
pub use service::{MedRemind, SyncStatus, WriteOutcome};
pub use store::{JsonFileStore, LocalStore, MemoryStore};
