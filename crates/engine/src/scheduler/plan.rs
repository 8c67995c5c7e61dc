use chrono::{Days, NaiveDate, NaiveDateTime};
use domain::MedicationReminder;
use serde::Serialize;

/// Inclusive range of local calendar days for which alarms are registered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct LookaheadWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl LookaheadWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// `days` days starting today. Zero is treated as one.
    pub fn rolling(today: NaiveDate, days: u32) -> Self {
        let span = u64::from(days.max(1) - 1);
        let end = today.checked_add_days(Days::new(span)).unwrap_or(NaiveDate::MAX);
        Self { start: today, end }
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start.iter_days().take_while(|day| *day <= self.end)
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }
}

/// Fire instants for `reminder` inside `window`, soonest first.
///
/// Days outside the course or off the `day_frequency` cadence are skipped, as
/// is anything strictly before `now`. A disabled or deleted reminder plans
/// nothing.
pub fn plan(
    reminder: &MedicationReminder,
    window: &LookaheadWindow,
    now: NaiveDateTime,
) -> Vec<NaiveDateTime> {
    if !reminder.should_fire() {
        return Vec::new();
    }

    let recurrence = &reminder.recurrence;
    let mut instants: Vec<NaiveDateTime> = window
        .days()
        .filter(|day| recurrence.is_due_on(*day))
        .flat_map(|day| reminder.times.iter().map(move |time| time.on(day)))
        .filter(|instant| *instant >= now)
        .collect();

    instants.sort();
    instants.dedup();
    instants
}

#[cfg(test)]
mod tests {
    use domain::reminders::{Course, Recurrence, TimeOfDay};
    use pretty_assertions::assert_eq;

    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        date(day).and_hms_opt(hour, 0, 0).unwrap()
    }

    fn reminder(course: Course, day_frequency: u32) -> MedicationReminder {
        MedicationReminder {
            id: "med-1".to_string(),
            name: "Amoxicillin".to_string(),
            dosage: "500 mg".to_string(),
            times: vec![TimeOfDay::new(9, 0).unwrap(), TimeOfDay::new(21, 0).unwrap()],
            recurrence: Recurrence::new(date(1), course, day_frequency).unwrap(),
            reminder_enabled: true,
            ..Default::default()
        }
    }

    fn first_five_days() -> LookaheadWindow {
        LookaheadWindow::new(date(1), date(5))
    }

    #[test]
    fn three_day_course_fires_twice_daily_for_three_days() {
        let course = Course::parse("3 วัน").unwrap();
        let instants = plan(&reminder(course, 1), &first_five_days(), at(1, 0));
        assert_eq!(
            instants,
            vec![at(1, 9), at(1, 21), at(2, 9), at(2, 21), at(3, 9), at(3, 21)]
        );
    }

    #[test]
    fn every_other_day_skips_off_days() {
        let instants = plan(
            &reminder(Course::Days { count: 3 }, 2),
            &first_five_days(),
            at(1, 0),
        );
        assert_eq!(instants, vec![at(1, 9), at(1, 21), at(3, 9), at(3, 21)]);
    }

    #[test]
    fn ongoing_course_has_no_cutoff() {
        let far = LookaheadWindow::rolling(NaiveDate::from_ymd_opt(2030, 6, 1).unwrap(), 2);
        let now = NaiveDate::from_ymd_opt(2030, 6, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let instants = plan(&reminder(Course::parse("ongoing").unwrap(), 1), &far, now);
        assert_eq!(instants.len(), 4);
        assert!(instants.iter().all(|i| far.contains(i.date())));
    }

    #[test]
    fn past_instants_are_dropped() {
        let instants = plan(
            &reminder(Course::Days { count: 1 }, 1),
            &first_five_days(),
            at(1, 10),
        );
        assert_eq!(instants, vec![at(1, 21)]);
    }

    #[test]
    fn instant_equal_to_now_is_kept() {
        let instants = plan(
            &reminder(Course::Days { count: 1 }, 1),
            &first_five_days(),
            at(1, 9),
        );
        assert_eq!(instants, vec![at(1, 9), at(1, 21)]);
    }

    #[test]
    fn disabled_reminder_plans_nothing() {
        let mut disabled = reminder(Course::Ongoing, 1);
        disabled.reminder_enabled = false;
        assert!(plan(&disabled, &first_five_days(), at(1, 0)).is_empty());
    }

    #[test]
    fn course_starting_after_window_plans_nothing() {
        let mut later = reminder(Course::Ongoing, 1);
        later.recurrence.start_date = date(10);
        assert!(plan(&later, &first_five_days(), at(1, 0)).is_empty());
    }

    #[test]
    fn rolling_window_covers_today_and_tomorrow() {
        let window = LookaheadWindow::rolling(date(1), 2);
        assert_eq!(window.days().collect::<Vec<_>>(), vec![date(1), date(2)]);
        assert_eq!(LookaheadWindow::rolling(date(1), 0).days().count(), 1);
    }
}
