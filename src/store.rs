//! In-memory habit collection observed by the UI.
//!
//! The store never talks to persistence. It is mutated by the tracker after a
//! write is confirmed, or reconciled wholesale from a persistence snapshot.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use crate::core::habit::{Habit, HabitId};

pub type SharedStore = Arc<Mutex<HabitStore>>;

pub struct HabitStore {
    habits: HashMap<HabitId, Habit>,
    notify: watch::Sender<Vec<Habit>>,
}

impl Default for HabitStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HabitStore {
    pub fn new() -> Self {
        let (notify, _) = watch::channel(Vec::new());
        Self {
            habits: HashMap::new(),
            notify,
        }
    }

    pub fn shared() -> SharedStore {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Receive the ordered habit list after every effective change.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Habit>> {
        self.notify.subscribe()
    }

    pub fn len(&self) -> usize {
        self.habits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.habits.is_empty()
    }

    pub fn get(&self, id: HabitId) -> Option<&Habit> {
        self.habits.get(&id)
    }

    pub fn contains(&self, id: HabitId) -> bool {
        self.habits.contains_key(&id)
    }

    /// Display order: category, then creation date, then id for a stable tiebreak.
    pub fn all(&self) -> Vec<Habit> {
        let mut habits: Vec<Habit> = self.habits.values().cloned().collect();
        habits.sort_by(|a, b| {
            a.category
                .cmp(&b.category)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        habits
    }

    /// Insert a habit, or overwrite one with the same id. Returns whether anything changed.
    pub fn add(&mut self, habit: Habit) -> bool {
        if self.habits.get(&habit.id) == Some(&habit) {
            return false;
        }
        self.habits.insert(habit.id, habit);
        self.publish();
        true
    }

    pub fn remove(&mut self, id: HabitId) -> Option<Habit> {
        let removed = self.habits.remove(&id);
        if removed.is_some() {
            self.publish();
        }
        removed
    }

    /// Replace an existing habit. Unknown ids and identical data are no-ops.
    pub fn replace(&mut self, id: HabitId, updated: Habit) -> bool {
        match self.habits.get_mut(&id) {
            Some(current) if *current != updated => {
                *current = updated;
                self.publish();
                true
            }
            Some(_) => false,
            None => {
                log::debug!("Ignoring replace for unknown habit {}", id);
                false
            }
        }
    }

    /// Bring the store in line with an authoritative snapshot. Returns whether anything changed.
    pub fn reconcile(&mut self, snapshot: Vec<Habit>) -> bool {
        let incoming: HashMap<HabitId, Habit> = snapshot.into_iter().map(|h| (h.id, h)).collect();
        if incoming == self.habits {
            return false;
        }

        let removed = self.habits.keys().filter(|id| !incoming.contains_key(id)).count();
        log::debug!(
            "Reconciling store: {} habits in snapshot, {} removed",
            incoming.len(),
            removed
        );
        self.habits = incoming;
        self.publish();
        true
    }

    fn publish(&self) {
        self.notify.send_replace(self.all());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::habit::{Category, Repetition};
    use chrono::NaiveDate;

    fn habit(name: &str, category: Category, day: u32) -> Habit {
        let mut h = Habit::new(name, Repetition::Daily, NaiveDate::from_ymd_opt(2024, 1, day).unwrap());
        h.category = category;
        h
    }

    fn names(habits: &[Habit]) -> Vec<&str> {
        habits.iter().map(|h| h.name.as_str()).collect()
    }

    #[test]
    fn all_groups_by_category_then_creation() {
        let mut store = HabitStore::new();
        store.add(habit("bake", Category::Cooking, 1));
        store.add(habit("pills late", Category::Medicine, 9));
        store.add(habit("run", Category::Exercise, 3));
        store.add(habit("pills", Category::Medicine, 2));
        assert_eq!(names(&store.all()), vec!["pills", "pills late", "run", "bake"]);
    }

    #[test]
    fn replace_is_idempotent() {
        let mut store = HabitStore::new();
        let mut h = habit("walk", Category::Walk, 1);
        store.add(h.clone());
        h.streak = 3;
        assert!(store.replace(h.id, h.clone()));
        assert!(!store.replace(h.id, h.clone()));
        assert_eq!(store.get(h.id).unwrap().streak, 3);
    }

    #[test]
    fn replace_unknown_is_noop() {
        let mut store = HabitStore::new();
        let h = habit("walk", Category::Walk, 1);
        assert!(!store.replace(h.id, h.clone()));
        assert!(store.is_empty());
    }

    #[test]
    fn remove_is_idempotent() {
        let mut store = HabitStore::new();
        let h = habit("walk", Category::Walk, 1);
        store.add(h.clone());
        assert!(store.remove(h.id).is_some());
        assert!(store.remove(h.id).is_none());
    }

    #[test]
    fn reconcile_applies_snapshot_by_id() {
        let mut store = HabitStore::new();
        let keep = habit("keep", Category::Walk, 1);
        let drop = habit("drop", Category::Walk, 2);
        store.add(keep.clone());
        store.add(drop.clone());

        let mut updated = keep.clone();
        updated.streak = 7;
        let fresh = habit("fresh", Category::Custom, 3);

        assert!(store.reconcile(vec![updated.clone(), fresh.clone()]));
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(keep.id).unwrap().streak, 7);
        assert!(!store.contains(drop.id));
        assert!(store.contains(fresh.id));

        assert!(!store.reconcile(vec![fresh, updated]));
    }

    #[test]
    fn subscribers_see_changes_only() {
        let mut store = HabitStore::new();
        let mut rx = store.subscribe();
        let h = habit("walk", Category::Walk, 1);

        store.add(h.clone());
        assert!(rx.has_changed().unwrap());
        assert_eq!(names(&rx.borrow_and_update()), vec!["walk"]);

        store.replace(h.id, h.clone());
        assert!(!rx.has_changed().unwrap());

        store.remove(h.id);
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_empty());
    }
}
