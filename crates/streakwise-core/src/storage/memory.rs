//! In-process [`HabitStore`].

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::HabitStore;
use crate::error::StoreError;
use crate::habit::{CompletionRecord, Habit};
use crate::notifications::{
    InteractionLogEntry, NotificationKind, NotificationPreference, ScheduledNotification,
};

#[derive(Default)]
struct Tables {
    habits: Vec<Habit>,
    completions: Vec<CompletionRecord>,
    preferences: HashMap<String, NotificationPreference>,
    interactions: Vec<InteractionLogEntry>,
    schedules: Vec<ScheduledNotification>,
}

impl Tables {
    fn require_habit(&self, habit_id: &str) -> Result<(), StoreError> {
        if self.habits.iter().any(|h| h.id == habit_id) {
            Ok(())
        } else {
            Err(StoreError::UnknownHabit(habit_id.to_string()))
        }
    }
}

/// Store backed by plain collections behind a `RwLock`.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl HabitStore for MemoryStore {
    fn insert_habit(&self, habit: &Habit) -> Result<(), StoreError> {
        let mut tables = self.write();
        match tables.habits.iter_mut().find(|h| h.id == habit.id) {
            Some(existing) => *existing = habit.clone(),
            None => tables.habits.push(habit.clone()),
        }
        Ok(())
    }

    fn habit(&self, id: &str) -> Result<Option<Habit>, StoreError> {
        Ok(self.read().habits.iter().find(|h| h.id == id).cloned())
    }

    fn habits(&self) -> Result<Vec<Habit>, StoreError> {
        Ok(self.read().habits.clone())
    }

    fn delete_habit(&self, id: &str) -> Result<bool, StoreError> {
        let mut tables = self.write();
        let before = tables.habits.len();
        tables.habits.retain(|h| h.id != id);
        if tables.habits.len() == before {
            return Ok(false);
        }
        tables.completions.retain(|r| r.habit_id != id);
        tables.preferences.remove(id);
        tables.interactions.retain(|e| e.habit_id != id);
        tables.schedules.retain(|n| n.habit_id != id);
        Ok(true)
    }

    fn insert_completion(&self, record: &CompletionRecord) -> Result<(), StoreError> {
        let mut tables = self.write();
        tables.require_habit(&record.habit_id)?;
        tables.completions.push(record.clone());
        Ok(())
    }

    fn completions(&self, habit_id: &str) -> Result<Vec<CompletionRecord>, StoreError> {
        Ok(self
            .read()
            .completions
            .iter()
            .filter(|r| r.habit_id == habit_id)
            .cloned()
            .collect())
    }

    fn all_completions(&self) -> Result<Vec<CompletionRecord>, StoreError> {
        Ok(self.read().completions.clone())
    }

    fn completions_where(
        &self,
        predicate: &dyn Fn(&CompletionRecord) -> bool,
    ) -> Result<Vec<CompletionRecord>, StoreError> {
        Ok(self
            .read()
            .completions
            .iter()
            .filter(|r| predicate(r))
            .cloned()
            .collect())
    }

    fn preference(&self, habit_id: &str) -> Result<Option<NotificationPreference>, StoreError> {
        Ok(self.read().preferences.get(habit_id).cloned())
    }

    fn save_preference(&self, preference: &NotificationPreference) -> Result<(), StoreError> {
        let mut tables = self.write();
        tables.require_habit(&preference.habit_id)?;
        tables
            .preferences
            .insert(preference.habit_id.clone(), preference.clone());
        Ok(())
    }

    fn append_interaction(&self, entry: &InteractionLogEntry) -> Result<(), StoreError> {
        let mut tables = self.write();
        tables.require_habit(&entry.habit_id)?;
        tables.interactions.push(entry.clone());
        Ok(())
    }

    fn record_adaptation(
        &self,
        preference: &NotificationPreference,
        entry: &InteractionLogEntry,
    ) -> Result<(), StoreError> {
        let mut tables = self.write();
        tables.require_habit(&preference.habit_id)?;
        tables.require_habit(&entry.habit_id)?;
        tables
            .preferences
            .insert(preference.habit_id.clone(), preference.clone());
        tables.interactions.push(entry.clone());
        Ok(())
    }

    fn interactions(&self, habit_id: &str) -> Result<Vec<InteractionLogEntry>, StoreError> {
        Ok(self
            .read()
            .interactions
            .iter()
            .filter(|e| e.habit_id == habit_id)
            .cloned()
            .collect())
    }

    fn schedules(&self, habit_id: &str) -> Result<Vec<ScheduledNotification>, StoreError> {
        Ok(self
            .read()
            .schedules
            .iter()
            .filter(|n| n.habit_id == habit_id)
            .cloned()
            .collect())
    }

    fn all_schedules(&self) -> Result<Vec<ScheduledNotification>, StoreError> {
        Ok(self.read().schedules.clone())
    }

    fn save_schedule(&self, notification: &ScheduledNotification) -> Result<(), StoreError> {
        let mut tables = self.write();
        tables.require_habit(&notification.habit_id)?;
        match tables
            .schedules
            .iter_mut()
            .find(|n| n.habit_id == notification.habit_id && n.kind == notification.kind)
        {
            Some(existing) => *existing = notification.clone(),
            None => tables.schedules.push(notification.clone()),
        }
        Ok(())
    }

    fn delete_schedule(&self, habit_id: &str, kind: NotificationKind) -> Result<bool, StoreError> {
        let mut tables = self.write();
        let before = tables.schedules.len();
        tables
            .schedules
            .retain(|n| !(n.habit_id == habit_id && n.kind == kind));
        Ok(tables.schedules.len() < before)
    }

    fn clear_schedules(&self) -> Result<usize, StoreError> {
        let mut tables = self.write();
        let count = tables.schedules.len();
        tables.schedules.clear();
        Ok(count)
    }
}
