mod common;

use common::{harness, input, instant};
use domain::reminders::TimeOfDay;
use engine::{
    ledger::{Adherence, DoseStatus},
    scheduler::ScheduleState,
    Clock, SyncStatus,
};
use pretty_assertions::assert_eq;

fn nine() -> TimeOfDay {
    TimeOfDay::new(9, 0).unwrap()
}

#[tokio::test]
async fn foreground_marks_overdue_slots_as_missed() {
    let h = harness("2024-01-01T07:00:00+07:00");
    let id = h
        .app
        .create_reminder(input("Metformin", &["09:00", "13:00"], "5 days"))
        .await
        .unwrap()
        .value
        .id;

    h.clock.set(instant("2024-01-01T13:30:00+07:00"));
    let report = h.app.on_foreground().await.unwrap();
    assert_eq!(report.missed_recorded, 1);

    let today = h.app.today_doses().await.unwrap();
    assert_eq!(today.len(), 1);
    assert!(!today[0].taken);
    assert_eq!(today[0].slot, Some(nine()));
    assert_eq!(today[0].timestamp, instant("2024-01-01T09:00:00+07:00"));
    assert_eq!(h.remote.doses().len(), 1);

    // a second foreground does not record the same slot twice
    let again = h.app.on_foreground().await.unwrap();
    assert_eq!(again.missed_recorded, 0);
    let day = today[0].local_day(&h.clock.offset());
    assert!(!h.app.ledger().is_dose_taken(&id, day, Some(nine())).await.unwrap());
}

#[tokio::test]
async fn taking_a_dose_updates_today() {
    let h = harness("2024-01-01T09:05:00+07:00");
    let id = h
        .app
        .create_reminder(input("Metformin", &["09:00", "21:00"], "5 days"))
        .await
        .unwrap()
        .value
        .id;

    let taken = h.app.record_dose(&id, true, Some(nine())).await.unwrap();
    assert_eq!(taken.sync, SyncStatus::Synced);
    assert_eq!(taken.value.timestamp, instant("2024-01-01T09:05:00+07:00"));

    let statuses: Vec<(TimeOfDay, DoseStatus)> = h
        .app
        .slot_statuses(h.clock.today())
        .await
        .unwrap()
        .into_iter()
        .map(|s| (s.slot, s.status))
        .collect();
    assert_eq!(
        statuses,
        vec![
            (nine(), DoseStatus::Taken),
            (TimeOfDay::new(21, 0).unwrap(), DoseStatus::Pending)
        ]
    );
    assert_eq!(h.app.daily_progress().await.unwrap(), 0.5);

    assert_eq!(
        h.app.adherence(&id).await.unwrap(),
        Adherence {
            taken: 1,
            expected: Some(10)
        }
    );
}

#[tokio::test]
async fn alarms_roll_forward_day_by_day() {
    let h = harness("2024-01-01T08:00:00+07:00");
    let id = h
        .app
        .create_reminder(input("Metformin", &["09:00"], "3 วัน"))
        .await
        .unwrap()
        .value
        .id;
    assert_eq!(h.notifier.pending_for(&id).await.len(), 2);

    h.clock.set(instant("2024-01-02T08:00:00+07:00"));
    h.app.on_foreground().await.unwrap();
    assert_eq!(h.notifier.pending_for(&id).await.len(), 3);

    // course ends on the 3rd
    h.clock.set(instant("2024-01-03T08:00:00+07:00"));
    h.app.on_foreground().await.unwrap();
    assert_eq!(h.notifier.pending_for(&id).await.len(), 3);

    h.clock.set(instant("2024-01-04T08:00:00+07:00"));
    h.app.on_foreground().await.unwrap();
    assert_eq!(
        h.app.scheduler().state_of(&id).await.unwrap(),
        ScheduleState::Unscheduled
    );
}

#[tokio::test]
async fn clear_all_data_removes_everything_local() {
    let h = harness("2024-01-01T08:00:00+07:00");
    let id = h
        .app
        .create_reminder(input("Metformin", &["09:00"], "ongoing"))
        .await
        .unwrap()
        .value
        .id;
    h.app.record_dose(&id, true, None).await.unwrap();

    let cleared = h.app.clear_all_data().await.unwrap();
    assert_eq!(cleared.reminders, 1);
    assert_eq!(cleared.doses, 1);

    assert!(h.app.reminders().await.unwrap().is_empty());
    assert!(h.app.ledger().all().await.unwrap().is_empty());
    assert!(h.notifier.pending_for(&id).await.is_empty());
}

#[tokio::test]
async fn invalid_input_stores_nothing() {
    let h = harness("2024-01-01T08:00:00+07:00");

    let bad_time = h
        .app
        .create_reminder(input("Metformin", &["25:00"], "ongoing"))
        .await;
    assert!(bad_time.is_err());

    let bad_duration = h
        .app
        .create_reminder(input("Metformin", &["09:00"], "someday"))
        .await;
    assert!(bad_duration.is_err());

    assert!(h.app.reminders().await.unwrap().is_empty());
    assert!(h.remote.calls().is_empty());
}
