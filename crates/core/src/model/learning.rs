use serde::{Deserialize, Serialize};

use crate::model::ids::{LessonId, ModuleId};
use crate::model::progress::Percent;

/// Difficulty tier shared by modules and learning preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

/// Difficulty of a single exercise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExerciseDifficulty {
    #[default]
    Easy,
    Medium,
    Hard,
}

/// Position of a lesson inside its module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonOutline {
    pub id: LessonId,
    #[serde(default)]
    pub title: String,
}

//
// ─── MODULE ───────────────────────────────────────────────────────────────────
//

/// A learning module: an ordered run of lessons with aggregate progress.
///
/// `progress == 100` holds exactly when `completed` is set; every way of
/// building a module (including deserialization) goes through that rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ModuleWire", into = "ModuleWire")]
pub struct LearningModule {
    id: ModuleId,
    title: String,
    description: String,
    difficulty: Difficulty,
    lessons: Vec<LessonOutline>,
    progress: Percent,
    completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModuleWire {
    id: ModuleId,
    #[serde(alias = "name")]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    difficulty: Difficulty,
    #[serde(default)]
    lessons: Vec<LessonOutline>,
    #[serde(default)]
    progress: Percent,
    #[serde(default)]
    completed: bool,
}

impl From<ModuleWire> for LearningModule {
    fn from(wire: ModuleWire) -> Self {
        let progress = if wire.completed {
            Percent::COMPLETE
        } else {
            wire.progress
        };
        let mut module = Self::new(wire.id, wire.title, wire.difficulty, wire.lessons);
        module.description = wire.description;
        module.set_progress(progress);
        module
    }
}

impl From<LearningModule> for ModuleWire {
    fn from(module: LearningModule) -> Self {
        Self {
            id: module.id,
            title: module.title,
            description: module.description,
            difficulty: module.difficulty,
            lessons: module.lessons,
            progress: module.progress,
            completed: module.completed,
        }
    }
}

impl LearningModule {
    #[must_use]
    pub fn new(
        id: ModuleId,
        title: impl Into<String>,
        difficulty: Difficulty,
        lessons: Vec<LessonOutline>,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            description: String::new(),
            difficulty,
            lessons,
            progress: Percent::ZERO,
            completed: false,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn id(&self) -> &ModuleId {
        &self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    #[must_use]
    pub fn lessons(&self) -> &[LessonOutline] {
        &self.lessons
    }

    #[must_use]
    pub fn contains_lesson(&self, lesson_id: &LessonId) -> bool {
        self.lessons.iter().any(|l| &l.id == lesson_id)
    }

    #[must_use]
    pub fn progress(&self) -> Percent {
        self.progress
    }

    #[must_use]
    pub fn completed(&self) -> bool {
        self.completed
    }

    pub fn set_progress(&mut self, progress: Percent) {
        self.progress = progress;
        self.completed = progress.is_complete();
    }

    /// Recompute progress from how many of this module's lessons are done.
    ///
    /// Modules without lesson outlines keep the server-reported progress.
    pub fn recompute(&mut self, completed_lessons: usize) {
        if self.lessons.is_empty() {
            return;
        }
        self.set_progress(Percent::ratio(completed_lessons, self.lessons.len()));
    }
}

//
// ─── LESSON ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeExample {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub java_code: String,
    pub python_code: String,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub input: String,
    pub expected_output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exercise {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub java_template: String,
    #[serde(default)]
    pub python_template: String,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
    #[serde(default)]
    pub difficulty: ExerciseDifficulty,
    #[serde(default)]
    pub hints: Vec<String>,
}

/// A lesson with its content. `module_id` is a back-reference only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub id: LessonId,
    pub module_id: ModuleId,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub code_examples: Vec<CodeExample>,
    #[serde(default)]
    pub exercises: Vec<Exercise>,
    #[serde(default)]
    pub order: u32,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub progress: Percent,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outline(id: &str) -> LessonOutline {
        LessonOutline {
            id: id.into(),
            title: id.to_uppercase(),
        }
    }

    #[test]
    fn deserialization_enforces_completion_invariant() {
        let module: LearningModule = serde_json::from_str(
            r#"{"id":"oop","name":"OOP","difficulty":"intermediate","progress":100,"completed":false}"#,
        )
        .unwrap();
        assert!(module.completed());

        let module: LearningModule =
            serde_json::from_str(r#"{"id":"oop","title":"OOP","completed":true,"progress":10}"#)
                .unwrap();
        assert_eq!(module.progress(), Percent::COMPLETE);
    }

    #[test]
    fn recompute_tracks_completed_lessons() {
        let mut module = LearningModule::new(
            "basic".into(),
            "Basics",
            Difficulty::Beginner,
            vec![outline("a"), outline("b"), outline("c"), outline("d")],
        );
        module.recompute(1);
        assert_eq!(module.progress().value(), 25);
        assert!(!module.completed());
        module.recompute(4);
        assert!(module.completed());
        assert!(module.contains_lesson(&"c".into()));
    }

    #[test]
    fn serialize_round_trip_keeps_shape() {
        let mut module = LearningModule::new("m".into(), "M", Difficulty::Advanced, vec![outline("x")])
            .with_description("deep end");
        module.recompute(1);
        let json = serde_json::to_value(&module).unwrap();
        assert_eq!(json["completed"], true);
        assert_eq!(json["progress"], 100);
        let back: LearningModule = serde_json::from_value(json).unwrap();
        assert_eq!(back, module);
    }
}
