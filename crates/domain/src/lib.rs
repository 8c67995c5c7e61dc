//! Medication reminder domain models

/// Reminder aggregate
pub mod reminders;

/// Dose events
pub mod doses;

/// Profile edits
pub mod profile;

/// Domain errors
pub mod errors;

pub use doses::DoseEvent;
pub use errors::Error;
pub use profile::ProfileUpdate;
pub use reminders::MedicationReminder;
