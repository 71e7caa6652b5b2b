use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::NaiveDate;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use uuid::Uuid;

use super::{CompletionMarker, HabitFeed, HabitPersistence, PersistError, PersistResult};
use crate::core::habit::{Habit, HabitId, UserId};

const HABITS_FILE: &str = "habits.json";
const COMPLETIONS_FILE: &str = "completions.json";

/// JSON documents on disk, one directory per user:
///
/// ```text
/// <root>/<user>/habits.json       [Habit, ...]
/// <root>/<user>/completions.json  [CompletionMarker, ...]
/// ```
///
/// `<user>` is the UUIDv5 of the user id, so distinct ids never share a directory.
pub struct FilePersistence {
    root: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
    feeds: Mutex<HashMap<UserId, watch::Sender<Vec<Habit>>>>,
}

impl FilePersistence {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: tokio::sync::Mutex::new(()),
            feeds: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn user_dir(&self, user: &UserId) -> PathBuf {
        let name = Uuid::new_v5(&Uuid::NAMESPACE_OID, user.as_str().as_bytes());
        self.root.join(name.to_string())
    }

    async fn read_habits(&self, user: &UserId) -> PersistResult<Vec<Habit>> {
        read_json(&self.user_dir(user).join(HABITS_FILE)).await
    }

    async fn read_markers(&self, user: &UserId) -> PersistResult<Vec<CompletionMarker>> {
        read_json(&self.user_dir(user).join(COMPLETIONS_FILE)).await
    }

    async fn write_habits(&self, user: &UserId, habits: &[Habit]) -> PersistResult<()> {
        write_json(&self.user_dir(user), HABITS_FILE, habits).await?;
        self.publish(user, habits.to_vec());
        Ok(())
    }

    async fn write_markers(&self, user: &UserId, markers: &[CompletionMarker]) -> PersistResult<()> {
        write_json(&self.user_dir(user), COMPLETIONS_FILE, markers).await
    }

    fn feed_sender(&self, user: &UserId) -> PersistResult<watch::Sender<Vec<Habit>>> {
        let mut feeds = self.feeds.lock().map_err(|_| PersistError::Unavailable)?;
        Ok(feeds
            .entry(user.clone())
            .or_insert_with(|| watch::channel(Vec::new()).0)
            .clone())
    }

    fn publish(&self, user: &UserId, habits: Vec<Habit>) {
        match self.feed_sender(user) {
            Ok(tx) => {
                tx.send_replace(habits);
            }
            Err(e) => log::warn!("Could not publish habit snapshot for {}: {}", user, e),
        }
    }
}

async fn read_json<T: DeserializeOwned + Default>(path: &Path) -> PersistResult<T> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) if content.trim().is_empty() => Ok(T::default()),
        Ok(content) => Ok(serde_json::from_str(&content)?),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(e.into()),
    }
}

/// Write through a temporary file so a crash never leaves a half-written document.
async fn write_json<T: Serialize + ?Sized>(dir: &Path, filename: &str, value: &T) -> PersistResult<()> {
    tokio::fs::create_dir_all(dir).await?;
    let json = serde_json::to_string_pretty(value)?;
    let tmp = dir.join(format!("{}.tmp", filename));
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, dir.join(filename)).await?;
    Ok(())
}

impl HabitPersistence for FilePersistence {
    async fn load_all(&self, user: &UserId) -> PersistResult<HabitFeed> {
        let habits = self.read_habits(user).await?;
        let tx = self.feed_sender(user)?;
        let rx = tx.subscribe();
        tx.send_replace(habits);
        Ok(HabitFeed::new(rx))
    }

    async fn save(&self, user: &UserId, habit: &Habit) -> PersistResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut habits = self.read_habits(user).await?;
        match habits.iter_mut().find(|h| h.id == habit.id) {
            Some(existing) => *existing = habit.clone(),
            None => habits.push(habit.clone()),
        }
        self.write_habits(user, &habits).await?;
        log::debug!("Saved habit {} for {}", habit.id, user);
        Ok(())
    }

    async fn delete(&self, user: &UserId, id: HabitId) -> PersistResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut markers = self.read_markers(user).await?;
        let before = markers.len();
        markers.retain(|m| m.habit_id != id);
        if markers.len() != before {
            self.write_markers(user, &markers).await?;
        }

        let mut habits = self.read_habits(user).await?;
        let before = habits.len();
        habits.retain(|h| h.id != id);
        if habits.len() != before {
            self.write_habits(user, &habits).await?;
        }
        Ok(())
    }

    async fn append_completion_marker(&self, user: &UserId, id: HabitId, date: NaiveDate) -> PersistResult<()> {
        let _guard = self.write_lock.lock().await;
        if !self.read_habits(user).await?.iter().any(|h| h.id == id) {
            return Err(PersistError::UnknownHabit(id));
        }
        let mut markers = self.read_markers(user).await?;
        let marker = CompletionMarker { habit_id: id, date };
        if !markers.contains(&marker) {
            markers.push(marker);
            markers.sort();
            self.write_markers(user, &markers).await?;
        }
        Ok(())
    }

    async fn remove_completion_marker(&self, user: &UserId, id: HabitId, date: NaiveDate) -> PersistResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut markers = self.read_markers(user).await?;
        let before = markers.len();
        markers.retain(|m| !(m.habit_id == id && m.date == date));
        if markers.len() != before {
            self.write_markers(user, &markers).await?;
        }
        Ok(())
    }

    async fn find_latest_completion_before(
        &self,
        user: &UserId,
        id: HabitId,
        date: NaiveDate,
    ) -> PersistResult<Option<NaiveDate>> {
        Ok(self
            .read_markers(user)
            .await?
            .into_iter()
            .filter(|m| m.habit_id == id && m.date < date)
            .map(|m| m.date)
            .max())
    }

    async fn completions(&self, user: &UserId, id: HabitId) -> PersistResult<Vec<NaiveDate>> {
        let mut dates: Vec<NaiveDate> = self
            .read_markers(user)
            .await?
            .into_iter()
            .filter(|m| m.habit_id == id)
            .map(|m| m.date)
            .collect();
        dates.sort();
        Ok(dates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::habit::{Category, Repetition};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn habits_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let user = UserId::new("user@example.com");
        let mut habit = Habit::new("Meditate", Repetition::Weekly, date(2024, 1, 2));
        habit.category = Category::Meditation;

        {
            let store = FilePersistence::new(dir.path());
            store.save(&user, &habit).await.unwrap();
            store.append_completion_marker(&user, habit.id, date(2024, 1, 9)).await.unwrap();
        }

        let store = FilePersistence::new(dir.path());
        let mut feed = store.load_all(&user).await.unwrap();
        assert_eq!(feed.current(), vec![habit.clone()]);
        assert_eq!(store.completions(&user, habit.id).await.unwrap(), vec![date(2024, 1, 9)]);
        assert!(store.user_dir(&user).join(HABITS_FILE).exists());
        assert!(store.user_dir(&user).starts_with(dir.path()));
    }

    #[tokio::test]
    async fn save_updates_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePersistence::new(dir.path());
        let user = UserId::new("u1");
        let mut habit = Habit::new("Walk", Repetition::Daily, date(2024, 1, 1));
        store.save(&user, &habit).await.unwrap();
        habit.streak = 4;
        store.save(&user, &habit).await.unwrap();

        let habits = store.read_habits(&user).await.unwrap();
        assert_eq!(habits.len(), 1);
        assert_eq!(habits[0].streak, 4);
    }

    #[tokio::test]
    async fn markers_query_and_cascade() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePersistence::new(dir.path());
        let user = UserId::new("u1");
        let habit = Habit::new("Walk", Repetition::Daily, date(2024, 1, 1));
        store.save(&user, &habit).await.unwrap();
        for d in [4, 2, 8] {
            store.append_completion_marker(&user, habit.id, date(2024, 1, d)).await.unwrap();
        }
        store.remove_completion_marker(&user, habit.id, date(2024, 1, 8)).await.unwrap();

        let latest = store.find_latest_completion_before(&user, habit.id, date(2024, 1, 9)).await.unwrap();
        assert_eq!(latest, Some(date(2024, 1, 4)));

        store.delete(&user, habit.id).await.unwrap();
        assert!(store.completions(&user, habit.id).await.unwrap().is_empty());
        assert!(store.read_habits(&user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let user = UserId::new("u1");
        let store = FilePersistence::new(dir.path());
        let user_dir = store.user_dir(&user);
        std::fs::create_dir_all(&user_dir).unwrap();
        std::fs::write(user_dir.join(HABITS_FILE), "{not json").unwrap();

        assert!(matches!(store.load_all(&user).await, Err(PersistError::Serde(_))));
    }

    #[tokio::test]
    async fn users_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePersistence::new(dir.path());
        let users = ["a@b", "a_b", "a.b", "A@B"].map(UserId::new);
        let today = date(2024, 5, 6);

        let mut habits = Vec::new();
        for user in &users {
            let habit = Habit::new(format!("Habit of {}", user), Repetition::Daily, date(2024, 5, 1));
            store.save(user, &habit).await.unwrap();
            store.append_completion_marker(user, habit.id, today).await.unwrap();
            habits.push(habit);
        }

        for (user, habit) in users.iter().zip(&habits) {
            let mut feed = store.load_all(user).await.unwrap();
            assert_eq!(feed.current(), vec![habit.clone()]);
        }
        assert!(store.completions(&users[1], habits[0].id).await.unwrap().is_empty());

        store.delete(&users[0], habits[0].id).await.unwrap();
        assert_eq!(store.read_habits(&users[1]).await.unwrap(), vec![habits[1].clone()]);
        assert_eq!(store.completions(&users[2], habits[2].id).await.unwrap(), vec![today]);
    }
}
