use chrono::{Duration, NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HabitId(Uuid);

impl HabitId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for HabitId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for HabitId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl fmt::Display for HabitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Identifier of the authenticated user owning a habit collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How often a habit recurs. The creation date anchors weekly and monthly cadences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Repetition {
    Daily,
    Weekly,
    Monthly,
}

impl Repetition {
    pub const ALL: [Repetition; 3] = [Self::Daily, Self::Weekly, Self::Monthly];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Daily => "Every day",
            Self::Weekly => "Every week",
            Self::Monthly => "Every month",
        }
    }
}

/// Grouping tag for the habit list. Declaration order is display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    Medicine,
    Walk,
    Exercise,
    Meditation,
    Cooking,
    Custom,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Self::Medicine,
        Self::Walk,
        Self::Exercise,
        Self::Meditation,
        Self::Cooking,
        Self::Custom,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Medicine => "Medicine",
            Self::Walk => "Walk",
            Self::Exercise => "Training",
            Self::Meditation => "Meditation",
            Self::Cooking => "Cooking",
            Self::Custom => "Custom",
        }
    }

    pub fn from_label(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.label().eq_ignore_ascii_case(s))
    }

    /// Named accent colour used by the list and calendar views.
    pub fn color(&self) -> &'static str {
        match self {
            Self::Medicine => "blue",
            Self::Walk => "yellow",
            Self::Exercise => "red",
            Self::Meditation => "green",
            Self::Cooking => "cyan",
            Self::Custom => "gray",
        }
    }
}

impl Default for Category {
    fn default() -> Self {
        Self::Custom
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReminderKind {
    None,
    OneHourBefore,
    OneDayBefore,
    OneWeekBefore,
    Custom,
}

/// Reminder settings. Only read by the reminder/calendar integration, never by streak logic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    pub kind: ReminderKind,
    /// Time of day for `ReminderKind::Custom`.
    pub custom_time: Option<NaiveTime>,
    /// Days of week for `ReminderKind::Custom`.
    pub days: Vec<Weekday>,
}

impl Reminder {
    pub fn new(kind: ReminderKind) -> Self {
        Self {
            kind,
            custom_time: None,
            days: Vec::new(),
        }
    }

    pub fn custom(time: NaiveTime, days: Vec<Weekday>) -> Self {
        Self {
            kind: ReminderKind::Custom,
            custom_time: Some(time),
            days,
        }
    }

    /// How far ahead of the occurrence the reminder fires, for the fixed presets.
    pub fn lead_time(&self) -> Option<Duration> {
        match self.kind {
            ReminderKind::OneHourBefore => Some(Duration::hours(1)),
            ReminderKind::OneDayBefore => Some(Duration::days(1)),
            ReminderKind::OneWeekBefore => Some(Duration::weeks(1)),
            ReminderKind::None | ReminderKind::Custom => None,
        }
    }

    /// Toggle a weekday in the custom day selection.
    pub fn toggle_day(&mut self, day: Weekday) {
        if let Some(pos) = self.days.iter().position(|d| *d == day) {
            self.days.remove(pos);
        } else {
            self.days.push(day);
        }
    }
}

/// User input for creating a habit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHabit {
    pub name: String,
    pub repetition: Repetition,
    pub category: Category,
    pub reminder: Option<Reminder>,
    pub notes: String,
}

impl NewHabit {
    pub fn new(name: impl Into<String>, repetition: Repetition) -> Self {
        Self {
            name: name.into(),
            repetition,
            category: Category::default(),
            reminder: None,
            notes: String::new(),
        }
    }

    pub fn category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    pub fn reminder(mut self, reminder: Reminder) -> Self {
        self.reminder = Some(reminder);
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Habit {
    pub id: HabitId,
    pub name: String,
    #[serde(default)]
    pub notes: String,
    pub created_at: NaiveDate,
    pub repetition: Repetition,
    pub streak: u32,
    #[serde(default)]
    pub best_streak: u32,
    pub last_completed: Option<NaiveDate>,
    pub is_completed_today: bool,
    #[serde(default)]
    pub category: Category,
    pub reminder: Option<Reminder>,
}

impl Habit {
    pub fn new(name: impl Into<String>, repetition: Repetition, created_at: NaiveDate) -> Self {
        Self {
            id: HabitId::new(),
            name: name.into(),
            notes: String::new(),
            created_at,
            repetition,
            streak: 0,
            best_streak: 0,
            last_completed: None,
            is_completed_today: false,
            category: Category::default(),
            reminder: None,
        }
    }

    pub fn from_input(input: NewHabit, created_at: NaiveDate) -> Self {
        Self {
            notes: input.notes,
            category: input.category,
            reminder: input.reminder,
            ..Self::new(input.name, input.repetition, created_at)
        }
    }
}
