//! Integration tests for the adaptive notification engine.
//!
//! Covers the concurrency rules (per-habit serialized adaptation, skipped
//! overlapping batch runs) and the channel dispatcher hand-off.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use chrono::{Duration, NaiveDate};
use streakwise_core::notifications::{
    DispatchRequest, InteractionLogEntry, LearningConfig, NotificationPreference,
    ScheduledNotification,
};
use streakwise_core::{
    AdaptiveScheduler, ChannelDispatcher, CompletionRecord, Database, FixedClock, Habit,
    HabitCategory, HabitStore, Interaction, InteractionKind, MemoryStore, NotificationKind,
    SchedulerConfig, StoreError,
};

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 11, 4).unwrap()
}

/// Store whose first `habits()` call parks until the test lets it go.
struct GatedStore {
    inner: MemoryStore,
    armed: AtomicBool,
    gate: Barrier,
}

impl GatedStore {
    fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            armed: AtomicBool::new(true),
            gate: Barrier::new(2),
        }
    }
}

impl HabitStore for GatedStore {
    fn insert_habit(&self, habit: &Habit) -> Result<(), StoreError> {
        self.inner.insert_habit(habit)
    }

    fn habit(&self, id: &str) -> Result<Option<Habit>, StoreError> {
        self.inner.habit(id)
    }

    fn habits(&self) -> Result<Vec<Habit>, StoreError> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.gate.wait();
            self.gate.wait();
        }
        self.inner.habits()
    }

    fn delete_habit(&self, id: &str) -> Result<bool, StoreError> {
        self.inner.delete_habit(id)
    }

    fn insert_completion(&self, record: &CompletionRecord) -> Result<(), StoreError> {
        self.inner.insert_completion(record)
    }

    fn completions(&self, habit_id: &str) -> Result<Vec<CompletionRecord>, StoreError> {
        self.inner.completions(habit_id)
    }

    fn all_completions(&self) -> Result<Vec<CompletionRecord>, StoreError> {
        self.inner.all_completions()
    }

    fn preference(&self, habit_id: &str) -> Result<Option<NotificationPreference>, StoreError> {
        self.inner.preference(habit_id)
    }

    fn save_preference(&self, preference: &NotificationPreference) -> Result<(), StoreError> {
        self.inner.save_preference(preference)
    }

    fn append_interaction(&self, entry: &InteractionLogEntry) -> Result<(), StoreError> {
        self.inner.append_interaction(entry)
    }

    fn interactions(&self, habit_id: &str) -> Result<Vec<InteractionLogEntry>, StoreError> {
        self.inner.interactions(habit_id)
    }

    fn schedules(&self, habit_id: &str) -> Result<Vec<ScheduledNotification>, StoreError> {
        self.inner.schedules(habit_id)
    }

    fn all_schedules(&self) -> Result<Vec<ScheduledNotification>, StoreError> {
        self.inner.all_schedules()
    }

    fn save_schedule(&self, notification: &ScheduledNotification) -> Result<(), StoreError> {
        self.inner.save_schedule(notification)
    }

    fn delete_schedule(&self, habit_id: &str, kind: NotificationKind) -> Result<bool, StoreError> {
        self.inner.delete_schedule(habit_id, kind)
    }

    fn clear_schedules(&self) -> Result<usize, StoreError> {
        self.inner.clear_schedules()
    }
}

/// Store whose first `failing_saves` preference saves report a locked
/// database. Uses the trait's default adaptation write.
struct FlakyStore {
    inner: MemoryStore,
    failing_saves: AtomicUsize,
}

impl HabitStore for FlakyStore {
    fn insert_habit(&self, habit: &Habit) -> Result<(), StoreError> {
        self.inner.insert_habit(habit)
    }

    fn habit(&self, id: &str) -> Result<Option<Habit>, StoreError> {
        self.inner.habit(id)
    }

    fn habits(&self) -> Result<Vec<Habit>, StoreError> {
        self.inner.habits()
    }

    fn delete_habit(&self, id: &str) -> Result<bool, StoreError> {
        self.inner.delete_habit(id)
    }

    fn insert_completion(&self, record: &CompletionRecord) -> Result<(), StoreError> {
        self.inner.insert_completion(record)
    }

    fn completions(&self, habit_id: &str) -> Result<Vec<CompletionRecord>, StoreError> {
        self.inner.completions(habit_id)
    }

    fn all_completions(&self) -> Result<Vec<CompletionRecord>, StoreError> {
        self.inner.all_completions()
    }

    fn preference(&self, habit_id: &str) -> Result<Option<NotificationPreference>, StoreError> {
        self.inner.preference(habit_id)
    }

    fn save_preference(&self, preference: &NotificationPreference) -> Result<(), StoreError> {
        let failing = self
            .failing_saves
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Locked);
        }
        self.inner.save_preference(preference)
    }

    fn append_interaction(&self, entry: &InteractionLogEntry) -> Result<(), StoreError> {
        self.inner.append_interaction(entry)
    }

    fn interactions(&self, habit_id: &str) -> Result<Vec<InteractionLogEntry>, StoreError> {
        self.inner.interactions(habit_id)
    }

    fn schedules(&self, habit_id: &str) -> Result<Vec<ScheduledNotification>, StoreError> {
        self.inner.schedules(habit_id)
    }

    fn all_schedules(&self) -> Result<Vec<ScheduledNotification>, StoreError> {
        self.inner.all_schedules()
    }

    fn save_schedule(&self, notification: &ScheduledNotification) -> Result<(), StoreError> {
        self.inner.save_schedule(notification)
    }

    fn delete_schedule(&self, habit_id: &str, kind: NotificationKind) -> Result<bool, StoreError> {
        self.inner.delete_schedule(habit_id, kind)
    }

    fn clear_schedules(&self) -> Result<usize, StoreError> {
        self.inner.clear_schedules()
    }
}

#[test]
fn test_concurrent_interactions_are_not_lost() {
    let store = Arc::new(Database::open_memory().unwrap());
    let a = Habit::new("Water", HabitCategory::Health).with_id("water");
    let b = Habit::new("Walk", HabitCategory::Fitness).with_id("walk");
    store.insert_habit(&a).unwrap();
    store.insert_habit(&b).unwrap();

    let (dispatcher, _rx) = ChannelDispatcher::channel();
    let scheduler = Arc::new(AdaptiveScheduler::new(
        store.clone(),
        Arc::new(FixedClock::at(today(), 9)),
        Arc::new(dispatcher),
        LearningConfig::default(),
        SchedulerConfig::default(),
    ));

    let threads = 8;
    let per_thread = 10;
    let handles: Vec<_> = (0..threads)
        .map(|i| {
            let scheduler = scheduler.clone();
            let habit_id = if i % 2 == 0 { "water" } else { "walk" };
            thread::spawn(move || {
                for _ in 0..per_thread {
                    scheduler
                        .adapt_to_user_behavior(habit_id, &Interaction::new(InteractionKind::Completed, 9))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let config = LearningConfig::default();
    let mut expected = config.initial_confidence;
    for _ in 0..(threads / 2 * per_thread) {
        expected += config.completed_rate * (1.0 - expected);
    }

    for habit_id in ["water", "walk"] {
        assert_eq!(store.interactions(habit_id).unwrap().len(), threads / 2 * per_thread);
        let pref = store.preference(habit_id).unwrap().unwrap();
        assert!((pref.confidence - expected).abs() < 1e-9);
        assert!(pref.confidence <= 1.0);
    }
}

#[test]
fn test_overlapping_optimization_is_skipped() {
    let store = Arc::new(GatedStore::new());
    store
        .insert_habit(&Habit::new("Water", HabitCategory::Health).with_id("water"))
        .unwrap();
    let (dispatcher, _rx) = ChannelDispatcher::channel();
    let scheduler = Arc::new(AdaptiveScheduler::new(
        store.clone(),
        Arc::new(FixedClock::at(today(), 9)),
        Arc::new(dispatcher),
        LearningConfig::default(),
        SchedulerConfig::default(),
    ));

    let background = {
        let scheduler = scheduler.clone();
        thread::spawn(move || scheduler.optimize_notification_frequency())
    };

    // first run is now parked inside habits()
    store.gate.wait();
    assert!(scheduler.optimize_notification_frequency().is_none());
    // sweeps are guarded separately
    assert!(scheduler.run_contextual_sweep().is_some());
    store.gate.wait();

    let summary = background.join().unwrap().unwrap();
    assert_eq!(summary.examined, 1);
    assert!(scheduler.optimize_notification_frequency().is_some());
}

#[test]
fn test_overlapping_sweep_is_skipped() {
    let store = Arc::new(GatedStore::new());
    let habit = Habit::new("Water", HabitCategory::Health).with_id("water");
    store.insert_habit(&habit).unwrap();
    for d in 1..=3 {
        store
            .insert_completion(&CompletionRecord::completed_on(&habit, today() - Duration::days(d)))
            .unwrap();
    }
    let (dispatcher, _rx) = ChannelDispatcher::channel();
    let scheduler = Arc::new(AdaptiveScheduler::new(
        store.clone(),
        Arc::new(FixedClock::at(today(), 9)),
        Arc::new(dispatcher),
        LearningConfig::default(),
        SchedulerConfig::default(),
    ));

    let background = {
        let scheduler = scheduler.clone();
        thread::spawn(move || scheduler.run_contextual_sweep())
    };

    // first sweep is now parked inside habits()
    store.gate.wait();
    assert!(scheduler.run_contextual_sweep().is_none());
    assert!(scheduler.optimize_notification_frequency().is_some());
    store.gate.wait();

    let scheduled = background.join().unwrap().unwrap();
    assert_eq!(scheduled.len(), 1);
    assert_eq!(scheduled[0].kind, NotificationKind::StreakRecovery);
    assert!(scheduler.run_contextual_sweep().is_some());
}

#[test]
fn test_retry_after_failed_save_applies_interaction() {
    let store = Arc::new(FlakyStore {
        inner: MemoryStore::new(),
        failing_saves: AtomicUsize::new(1),
    });
    store
        .insert_habit(&Habit::new("Read", HabitCategory::Learning).with_id("read"))
        .unwrap();
    let (dispatcher, _rx) = ChannelDispatcher::channel();
    let scheduler = AdaptiveScheduler::new(
        store.clone(),
        Arc::new(FixedClock::at(today(), 9)),
        Arc::new(dispatcher),
        LearningConfig::default(),
        SchedulerConfig::default(),
    );

    let interaction = Interaction::new(InteractionKind::Completed, 9).with_id("evt-1");
    assert!(scheduler.adapt_to_user_behavior("read", &interaction).is_err());
    assert!(store.interactions("read").unwrap().is_empty());
    assert!(store.preference("read").unwrap().is_none());

    let retry = scheduler.adapt_to_user_behavior("read", &interaction).unwrap();
    assert!(!retry.replayed);
    assert!((retry.preference.confidence - 0.6).abs() < 1e-9);
    assert!((store.preference("read").unwrap().unwrap().confidence - 0.6).abs() < 1e-9);
    assert_eq!(store.interactions("read").unwrap().len(), 1);

    let replay = scheduler.adapt_to_user_behavior("read", &interaction).unwrap();
    assert!(replay.replayed);
    assert!((replay.preference.confidence - 0.6).abs() < 1e-9);
}

#[test]
fn test_channel_dispatch_round_trip() {
    let store = Arc::new(MemoryStore::new());
    let habit = Habit::new("Guitar", HabitCategory::Creativity).with_id("guitar");
    store.insert_habit(&habit).unwrap();
    for d in 1..=6 {
        store
            .insert_completion(&CompletionRecord::completed_on(&habit, today() - Duration::days(d)))
            .unwrap();
    }

    let (dispatcher, mut rx) = ChannelDispatcher::channel();
    let scheduler = AdaptiveScheduler::new(
        store.clone(),
        Arc::new(FixedClock::at(today(), 7)),
        Arc::new(dispatcher),
        LearningConfig::default(),
        SchedulerConfig::default(),
    );

    let scheduled = scheduler.run_contextual_sweep().unwrap();
    assert_eq!(scheduled.len(), 2);
    assert_eq!(scheduler.cancel_notifications("guitar"), 2);
    assert_eq!(scheduler.cancel_notifications("guitar"), 0);

    let mut requests = Vec::new();
    while let Ok(request) = rx.try_recv() {
        requests.push(request);
    }
    assert_eq!(requests.len(), 4);
    match &requests[0] {
        DispatchRequest::Schedule { hour, payload, .. } => {
            assert_eq!(*hour, 20);
            assert_eq!(payload.kind, NotificationKind::StreakRecovery);
        }
        other => panic!("expected schedule, got {other:?}"),
    }
    match &requests[1] {
        DispatchRequest::Schedule { payload, .. } => {
            assert_eq!(payload.kind, NotificationKind::MilestoneApproaching);
        }
        other => panic!("expected schedule, got {other:?}"),
    }
    assert!(requests[2..]
        .iter()
        .all(|r| matches!(r, DispatchRequest::Cancel { .. })));
}

#[test]
fn test_closed_channel_does_not_fail_scheduling_calls() {
    let store = Arc::new(MemoryStore::new());
    let habit = Habit::new("Guitar", HabitCategory::Creativity).with_id("guitar");
    store.insert_habit(&habit).unwrap();

    let (dispatcher, rx) = ChannelDispatcher::channel();
    drop(rx);
    let scheduler = AdaptiveScheduler::new(
        store,
        Arc::new(FixedClock::at(today(), 7)),
        Arc::new(dispatcher),
        LearningConfig::default(),
        SchedulerConfig::default(),
    );

    assert!(scheduler.schedule_optimal_notification(&habit).is_none());
    assert_eq!(scheduler.cancel_all_notifications(), 0);
}

#[test]
fn test_deleting_habit_drops_learned_state() {
    let db = Database::open_memory().unwrap();
    let habit = Habit::new("Water", HabitCategory::Health).with_id("water");
    db.insert_habit(&habit).unwrap();
    let db = Arc::new(db);

    let (dispatcher, _rx) = ChannelDispatcher::channel();
    let scheduler = AdaptiveScheduler::new(
        db.clone(),
        Arc::new(FixedClock::at(today(), 9)),
        Arc::new(dispatcher),
        LearningConfig::default(),
        SchedulerConfig::default(),
    );
    scheduler
        .adapt_to_user_behavior("water", &Interaction::new(InteractionKind::Snoozed, 9))
        .unwrap();
    assert!(db.preference("water").unwrap().is_some());

    assert!(db.delete_habit("water").unwrap());
    assert!(db.preference("water").unwrap().is_none());
    assert!(db.interactions("water").unwrap().is_empty());

    // a habit recreated under the same id starts from scratch
    db.insert_habit(&habit).unwrap();
    let outcome = scheduler
        .adapt_to_user_behavior("water", &Interaction::new(InteractionKind::Completed, 9))
        .unwrap();
    assert!((outcome.preference.confidence - 0.6).abs() < 1e-9);
    assert_eq!(db.interactions("water").unwrap().len(), 1);
}
