pub mod conversion;
mod ids;
pub mod learning;
pub mod progress;
pub mod session;
pub mod settings;
pub mod user;

pub use ids::{HistoryId, LessonId, ModuleId, ParseIdError, UserId};

pub use conversion::{
    ConversionHistoryEntry, ConversionOptions, ConversionStats, ConversionTag, OptionsPatch,
    Provenance, RecentConversion, extract_tags,
};
pub use learning::{
    CodeExample, Difficulty, Exercise, ExerciseDifficulty, LearningModule, Lesson, LessonOutline,
    TestCase,
};
pub use progress::{Percent, ProgressRecord, QuizScore, StudyEntry};
pub use session::{Credentials, REFRESH_SKEW_SECS, Session, SessionState};
pub use settings::{
    AppearanceSettings, InterfaceLanguage, LearningSettings, NotificationSettings,
    PrivacySettings, SettingsPatch, Theme, UserSettings,
};
pub use user::{ProfilePatch, UserProfile, UserStatus};
