//! Integration tests for streak queries over a persisted completion log.
//!
//! Records go through the SQLite store, come back out, and feed the
//! calculator the same way the CLI does.

use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;
use streakwise_core::{
    Clock, CompletionRecord, Database, FixedClock, Habit, HabitCategory, HabitStore,
    StreakCalculator,
};

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 9, 1).unwrap()
}

fn setup() -> (Database, Habit, StreakCalculator) {
    let db = Database::open_memory().unwrap();
    let habit = Habit::new("Piano", HabitCategory::Creativity);
    db.insert_habit(&habit).unwrap();
    let calc = StreakCalculator::new(Arc::new(FixedClock::at(today(), 10)));
    (db, habit, calc)
}

fn log_days(db: &Database, habit: &Habit, days_ago: impl IntoIterator<Item = i64>) {
    for d in days_ago {
        db.insert_completion(&CompletionRecord::completed_on(habit, today() - Duration::days(d)))
            .unwrap();
    }
}

#[test]
fn test_empty_log_defaults() {
    let (db, habit, calc) = setup();
    let records = db.completions(&habit.id).unwrap();

    let analytics = calc.streak_analytics(&records);
    assert_eq!(analytics.current_streak, 0);
    assert_eq!(analytics.longest_streak, 0);
    assert!(analytics.current_milestone.is_none());
    assert_eq!(analytics.next_milestone.threshold, 3);
    assert_eq!(calc.streak_at_risk(&records), None);
}

#[test]
fn test_gap_breaks_current_but_not_longest() {
    let (db, habit, calc) = setup();
    // 5-day run two weeks ago, then today and two days ago
    log_days(&db, &habit, 14..19);
    log_days(&db, &habit, [0, 2]);
    let records = db.completions(&habit.id).unwrap();

    assert_eq!(calc.current_streak(&records), 1);
    assert_eq!(calc.longest_streak(&records), 5);
}

#[test]
fn test_duplicate_same_day_records_count_once() {
    let (db, habit, calc) = setup();
    log_days(&db, &habit, [0, 0, 1, 1, 1]);
    let records = db.completions(&habit.id).unwrap();

    assert_eq!(records.len(), 5);
    assert_eq!(calc.current_streak(&records), 2);
    assert_eq!(calc.longest_streak(&records), 2);
}

#[test]
fn test_milestone_triggers_once_across_days() {
    let (db, habit, _) = setup();
    let clock = Arc::new(FixedClock::at(today() - Duration::days(2), 10));
    let calc = StreakCalculator::new(clock.clone());

    let mut previous = 0;
    let mut triggered = Vec::new();
    for day in 0..5 {
        db.insert_completion(&CompletionRecord::completed_on(&habit, clock.today()))
            .unwrap();
        let records = db.completions(&habit.id).unwrap();
        if let Some(m) = calc.check_for_new_milestone(&records, previous) {
            triggered.push((day, m.title.clone()));
        }
        previous = calc.current_streak(&records);
        clock.advance(Duration::days(1));
    }

    assert_eq!(triggered, vec![(2, "Getting Started".to_string())]);
}

#[test]
fn test_day_data_window() {
    let (db, habit, calc) = setup();
    log_days(&db, &habit, [0, 3]);
    let records = db.completions(&habit.id).unwrap();

    let days = calc.streak_day_data(&records, 7);
    assert_eq!(days.len(), 8);
    assert_eq!(days[0].date, today() - Duration::days(7));
    assert!(days[7].completed);
    assert!(days[4].completed);
    assert_eq!(days.iter().filter(|d| d.intensity == 1.0).count(), 2);
}

#[test]
fn test_deleting_habit_cascades_records() {
    let (db, habit, calc) = setup();
    log_days(&db, &habit, 0..4);
    assert!(db.delete_habit(&habit.id).unwrap());

    let records = db.completions(&habit.id).unwrap();
    assert!(records.is_empty());
    assert_eq!(calc.current_streak(&records), 0);
}

proptest! {
    #[test]
    fn prop_current_never_exceeds_longest(days in proptest::collection::vec(0i64..60, 0..40)) {
        let habit = Habit::new("Any", HabitCategory::Other);
        let records: Vec<_> = days
            .iter()
            .map(|d| CompletionRecord::completed_on(&habit, today() - Duration::days(*d)))
            .collect();
        let calc = StreakCalculator::new(Arc::new(FixedClock::at(today(), 10)));
        let analytics = calc.streak_analytics(&records);
        prop_assert!(analytics.current_streak <= analytics.longest_streak);
        prop_assert!((0.0..=1.0).contains(&analytics.progress_to_next));
        prop_assert!((0.0..=1.0).contains(&analytics.percentile));
    }
}
