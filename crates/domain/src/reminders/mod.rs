/// Reminder aggregate
pub mod aggregate;

/// Commands
pub mod commands;

/// Events
pub mod events;

/// Input DTOs
pub mod inputs;

/// Typed recurrence
pub mod recurrence;

pub use aggregate::{MedicationReminder, ReminderDetails, Services, AGGREGATE_TYPE};
pub use commands::Command;
pub use events::Event;
pub use inputs::ReminderInput;
pub use recurrence::{Course, MealTiming, Recurrence, TimeOfDay};
