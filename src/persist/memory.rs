use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDate;
use tokio::sync::watch;

use super::{CompletionMarker, HabitFeed, HabitPersistence, PersistError, PersistResult};
use crate::core::habit::{Habit, HabitId, UserId};

struct UserData {
    habits: BTreeMap<HabitId, Habit>,
    markers: BTreeSet<CompletionMarker>,
    feed: watch::Sender<Vec<Habit>>,
}

impl UserData {
    fn new() -> Self {
        let (feed, _) = watch::channel(Vec::new());
        Self {
            habits: BTreeMap::new(),
            markers: BTreeSet::new(),
            feed,
        }
    }

    fn publish(&self) {
        self.feed.send_replace(self.habits.values().cloned().collect());
    }
}

/// Process-local backend. Useful offline and as a test double; `set_failing`
/// makes every call fail with `PersistError::Unavailable`.
#[derive(Default)]
pub struct MemoryPersistence {
    users: Mutex<HashMap<UserId, UserData>>,
    failing: AtomicBool,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn lock(&self) -> PersistResult<MutexGuard<'_, HashMap<UserId, UserData>>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PersistError::Unavailable);
        }
        self.users.lock().map_err(|_| PersistError::Unavailable)
    }

    fn with_user<T>(&self, user: &UserId, f: impl FnOnce(&mut UserData) -> PersistResult<T>) -> PersistResult<T> {
        let mut users = self.lock()?;
        let data = users.entry(user.clone()).or_insert_with(UserData::new);
        f(data)
    }
}

impl HabitPersistence for MemoryPersistence {
    async fn load_all(&self, user: &UserId) -> PersistResult<HabitFeed> {
        self.with_user(user, |data| {
            let rx = data.feed.subscribe();
            data.publish();
            Ok(HabitFeed::new(rx))
        })
    }

    async fn save(&self, user: &UserId, habit: &Habit) -> PersistResult<()> {
        self.with_user(user, |data| {
            data.habits.insert(habit.id, habit.clone());
            data.publish();
            Ok(())
        })
    }

    async fn delete(&self, user: &UserId, id: HabitId) -> PersistResult<()> {
        self.with_user(user, |data| {
            data.markers.retain(|m| m.habit_id != id);
            if data.habits.remove(&id).is_some() {
                data.publish();
            }
            Ok(())
        })
    }

    async fn append_completion_marker(&self, user: &UserId, id: HabitId, date: NaiveDate) -> PersistResult<()> {
        self.with_user(user, |data| {
            if !data.habits.contains_key(&id) {
                return Err(PersistError::UnknownHabit(id));
            }
            data.markers.insert(CompletionMarker { habit_id: id, date });
            Ok(())
        })
    }

    async fn remove_completion_marker(&self, user: &UserId, id: HabitId, date: NaiveDate) -> PersistResult<()> {
        self.with_user(user, |data| {
            data.markers.remove(&CompletionMarker { habit_id: id, date });
            Ok(())
        })
    }

    async fn find_latest_completion_before(
        &self,
        user: &UserId,
        id: HabitId,
        date: NaiveDate,
    ) -> PersistResult<Option<NaiveDate>> {
        self.with_user(user, |data| {
            Ok(data
                .markers
                .iter()
                .filter(|m| m.habit_id == id && m.date < date)
                .map(|m| m.date)
                .max())
        })
    }

    async fn completions(&self, user: &UserId, id: HabitId) -> PersistResult<Vec<NaiveDate>> {
        self.with_user(user, |data| {
            Ok(data
                .markers
                .iter()
                .filter(|m| m.habit_id == id)
                .map(|m| m.date)
                .collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::habit::Repetition;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn latest_completion_is_strictly_before() {
        let store = MemoryPersistence::new();
        let user = UserId::new("u1");
        let habit = Habit::new("Walk", Repetition::Daily, date(2024, 1, 1));
        store.save(&user, &habit).await.unwrap();
        for d in [3, 5, 9] {
            store.append_completion_marker(&user, habit.id, date(2024, 1, d)).await.unwrap();
        }

        let latest = store.find_latest_completion_before(&user, habit.id, date(2024, 1, 9)).await.unwrap();
        assert_eq!(latest, Some(date(2024, 1, 5)));
        let none = store.find_latest_completion_before(&user, habit.id, date(2024, 1, 3)).await.unwrap();
        assert_eq!(none, None);
    }

    #[tokio::test]
    async fn delete_cascades_markers() {
        let store = MemoryPersistence::new();
        let user = UserId::new("u1");
        let habit = Habit::new("Walk", Repetition::Daily, date(2024, 1, 1));
        store.save(&user, &habit).await.unwrap();
        store.append_completion_marker(&user, habit.id, date(2024, 1, 2)).await.unwrap();

        store.delete(&user, habit.id).await.unwrap();
        assert!(store.completions(&user, habit.id).await.unwrap().is_empty());
        let err = store.append_completion_marker(&user, habit.id, date(2024, 1, 3)).await.unwrap_err();
        assert!(matches!(err, PersistError::UnknownHabit(id) if id == habit.id));
    }

    #[tokio::test]
    async fn users_are_isolated() {
        let store = MemoryPersistence::new();
        let habit = Habit::new("Walk", Repetition::Daily, date(2024, 1, 1));
        store.save(&UserId::new("a"), &habit).await.unwrap();

        let mut feed = store.load_all(&UserId::new("b")).await.unwrap();
        assert!(feed.current().is_empty());
    }

    #[tokio::test]
    async fn feed_pushes_updates() {
        let store = MemoryPersistence::new();
        let user = UserId::new("u1");
        let mut feed = store.load_all(&user).await.unwrap();
        assert!(feed.current().is_empty());

        let habit = Habit::new("Walk", Repetition::Daily, date(2024, 1, 1));
        store.save(&user, &habit).await.unwrap();
        let snapshot = feed.next().await.unwrap();
        assert_eq!(snapshot, vec![habit]);
    }

    #[tokio::test]
    async fn failing_mode_rejects_calls() {
        let store = MemoryPersistence::new();
        let user = UserId::new("u1");
        let habit = Habit::new("Walk", Repetition::Daily, date(2024, 1, 1));
        store.set_failing(true);
        assert!(matches!(store.save(&user, &habit).await, Err(PersistError::Unavailable)));
        store.set_failing(false);
        store.save(&user, &habit).await.unwrap();
    }
}
