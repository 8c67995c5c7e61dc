use std::{env, path::PathBuf, sync::Arc};

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use domain::MedicationReminder;
use engine::{
    ledger::DoseLedger,
    notify::MemoryNotifier,
    outbox::{Outbox, OutboxKind},
    reminders::ReminderRepository,
    scheduler::ReminderScheduler,
    Clock, EngineConfig, JsonFileStore, LocalStore, SystemClock,
};

/// Looks inside a device store: queued writes, upcoming alarms, today's doses.
#[derive(Parser)]
#[command(name = "inspect", version)]
struct Cli {
    /// Store file. Falls back to MEDREMIND_STORE_PATH, then ./medremind.json
    #[arg(long, short)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pending entries and dead letters per outbox kind
    Outbox {
        /// Also print each dead letter's last error
        #[arg(long)]
        verbose: bool,
    },
    /// Fire instants inside the lookahead window
    Upcoming,
    /// Slot statuses and progress for a day
    Today {
        /// Day to report instead of today (YYYY-MM-DD)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Move a kind's dead letters back into its queue
    Requeue { kind: OutboxKind },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let level = env::var("MEDREMIND_LOG")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .without_time()
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::from_env();

    let path = cli.store.unwrap_or_else(|| {
        PathBuf::from(
            env::var("MEDREMIND_STORE_PATH").unwrap_or_else(|_| "medremind.json".to_string()),
        )
    });
    let store: Arc<dyn LocalStore> = Arc::new(
        JsonFileStore::open(&path)
            .await
            .with_context(|| format!("opening store {}", path.display()))?,
    );
    tracing::debug!(path = %path.display(), "Inspecting store");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    match cli.command {
        Commands::Outbox { verbose } => show_outbox(store, &config, verbose).await,
        Commands::Upcoming => show_upcoming(store, clock, &config).await,
        Commands::Today { date } => show_day(store, clock, &config, date).await,
        Commands::Requeue { kind } => {
            let outbox = Outbox::new(store, &config);
            let moved = outbox.requeue_dead_letters(kind).await?;
            println!("requeued {moved} {kind} entries");
            Ok(())
        }
    }
}

async fn show_outbox(
    store: Arc<dyn LocalStore>,
    config: &EngineConfig,
    verbose: bool,
) -> anyhow::Result<()> {
    let outbox = Outbox::new(store, config);

    println!("{:<20} {:>8} {:>8}", "kind", "pending", "dead");
    for depth in outbox.depth().await? {
        println!(
            "{:<20} {:>8} {:>8}",
            depth.kind.as_str(),
            depth.pending,
            depth.dead_letters
        );
    }

    if verbose {
        for kind in OutboxKind::ALL {
            for entry in outbox.dead_letters(kind).await? {
                println!(
                    "{kind} {} attempts={} subject={} error={}",
                    entry.id,
                    entry.attempts,
                    entry.mutation.subject().unwrap_or("-"),
                    entry.last_error.as_deref().unwrap_or("-"),
                );
            }
        }
    }
    Ok(())
}

async fn show_upcoming(
    store: Arc<dyn LocalStore>,
    clock: Arc<dyn Clock>,
    config: &EngineConfig,
) -> anyhow::Result<()> {
    let reminders = ReminderRepository::new(store).list().await?;
    let scheduler = ReminderScheduler::new(Arc::new(MemoryNotifier::new()), clock, config);
    let window = scheduler.window();

    println!("window {} .. {}", window.start, window.end);
    for reminder in &reminders {
        let instants = scheduler.upcoming(reminder);
        if instants.is_empty() {
            println!("{} -", label(reminder));
            continue;
        }
        for instant in instants {
            println!("{} {}", label(reminder), instant.format("%Y-%m-%d %H:%M"));
        }
    }
    Ok(())
}

async fn show_day(
    store: Arc<dyn LocalStore>,
    clock: Arc<dyn Clock>,
    config: &EngineConfig,
    date: Option<NaiveDate>,
) -> anyhow::Result<()> {
    let reminders = ReminderRepository::new(store.clone()).list().await?;
    let ledger = DoseLedger::new(store, clock.clone());
    let day = date.unwrap_or_else(|| clock.today());

    let statuses = ledger
        .slot_statuses(&reminders, day, clock.local_now(), config.missed_grace)
        .await?;
    for status in &statuses {
        println!("{} {} {:?}", status.slot, status.name, status.status);
    }

    if day == clock.today() {
        let progress = ledger
            .daily_progress(&reminders, clock.local_now(), config.missed_grace)
            .await?;
        println!("progress {:.0}%", progress * 100.0);
    }
    Ok(())
}

fn label(reminder: &MedicationReminder) -> String {
    let state = if reminder.reminder_enabled { "" } else { " (off)" };
    format!("{} [{}]{}", reminder.name, reminder.dosage, state)
}
