use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{LessonId, UserId};

//
// ─── PERCENT ──────────────────────────────────────────────────────────────────
//

/// Completion percentage, always within `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(from = "f64", into = "u8")]
pub struct Percent(u8);

impl Percent {
    pub const ZERO: Self = Self(0);
    pub const COMPLETE: Self = Self(100);

    /// Clamp an arbitrary reported value into range. `NaN` maps to zero.
    ///
    /// Only a value of at least 100 yields [`Percent::COMPLETE`]; anything
    /// below rounds to at most 99.
    #[must_use]
    pub fn clamped(value: f64) -> Self {
        if value.is_nan() {
            return Self::ZERO;
        }
        if value >= 100.0 {
            return Self::COMPLETE;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let rounded = value.max(0.0).round() as u8;
        Self(rounded.min(99))
    }

    /// Ratio of `part` over `whole`, rounded. A zero `whole` yields zero.
    #[must_use]
    pub fn ratio(part: usize, whole: usize) -> Self {
        if whole == 0 {
            return Self::ZERO;
        }
        #[allow(clippy::cast_precision_loss)]
        let share = part as f64 * 100.0 / whole as f64;
        Self::clamped(share)
    }

    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }

    #[must_use]
    pub fn is_complete(self) -> bool {
        self.0 >= 100
    }
}

impl From<f64> for Percent {
    fn from(value: f64) -> Self {
        Self::clamped(value)
    }
}

impl From<Percent> for u8 {
    fn from(value: Percent) -> Self {
        value.0
    }
}

//
// ─── PROGRESS RECORD ──────────────────────────────────────────────────────────
//

/// Per-(user, lesson) completion and time tracking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    pub lesson_id: LessonId,
    progress: Percent,
    completed: bool,
    #[serde(alias = "lastStudyTime")]
    pub last_accessed: DateTime<Utc>,
    /// Cumulative seconds spent on the lesson.
    #[serde(default)]
    pub time_spent: u64,
}

impl ProgressRecord {
    /// Lazily created record for a lesson first touched at `now`.
    #[must_use]
    pub fn new(user_id: Option<UserId>, lesson_id: LessonId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            lesson_id,
            progress: Percent::ZERO,
            completed: false,
            last_accessed: now,
            time_spent: 0,
        }
    }

    #[must_use]
    pub fn progress(&self) -> Percent {
        self.progress
    }

    #[must_use]
    pub fn completed(&self) -> bool {
        self.completed
    }

    /// Apply a progress report. Returns `true` if the percentage changed.
    ///
    /// The last-accessed timestamp is bumped either way.
    pub fn report(&mut self, percent: Percent, now: DateTime<Utc>) -> bool {
        self.last_accessed = now;
        if self.progress == percent && self.completed == percent.is_complete() {
            return false;
        }
        self.progress = percent;
        self.completed = percent.is_complete();
        true
    }

    pub fn add_time(&mut self, secs: u64, now: DateTime<Utc>) {
        self.time_spent = self.time_spent.saturating_add(secs);
        self.last_accessed = now;
    }

    /// Re-establish `completed == (progress == 100)` after deserialization.
    ///
    /// A server that reports `completed: true` with a lower percentage is
    /// treated as complete.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.completed {
            self.progress = Percent::COMPLETE;
        }
        self.completed = self.progress.is_complete();
        self
    }
}

//
// ─── QUIZ / STUDY HISTORY ─────────────────────────────────────────────────────
//

/// A submitted quiz result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizScore {
    pub quiz_id: String,
    pub lesson_id: LessonId,
    pub score: f64,
    #[serde(default)]
    pub total: Option<f64>,
    #[serde(default)]
    pub answers: Vec<serde_json::Value>,
    pub completed_at: DateTime<Utc>,
}

impl QuizScore {
    /// Quiz ids are derived from the lesson they belong to.
    #[must_use]
    pub fn quiz_id_for(lesson_id: &LessonId) -> String {
        format!("{lesson_id}-quiz")
    }
}

/// One recorded study interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyEntry {
    pub lesson_id: LessonId,
    pub duration_secs: u64,
    pub studied_at: DateTime<Utc>,
}
