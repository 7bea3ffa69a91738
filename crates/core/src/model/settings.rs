use serde::{Deserialize, Serialize};

use crate::model::learning::Difficulty;

/// Per-user preferences, grouped into independent sections.
///
/// Every section carries `#[serde(default)]` so a persisted blob written by an
/// older client still loads, with missing options falling back to defaults.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    pub notifications: NotificationSettings,
    pub learning: LearningSettings,
    pub appearance: AppearanceSettings,
    pub privacy: PrivacySettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NotificationSettings {
    pub email_notifications: bool,
    pub course_reminders: bool,
    pub achievement_alerts: bool,
    pub system_updates: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            email_notifications: true,
            course_reminders: true,
            achievement_alerts: true,
            system_updates: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InterfaceLanguage {
    #[default]
    #[serde(rename = "zh-CN")]
    ZhCn,
    #[serde(rename = "en-US")]
    EnUs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LearningSettings {
    pub default_language: InterfaceLanguage,
    /// Seconds between editor auto-saves.
    pub auto_save_interval: u32,
    pub show_hints: bool,
    pub enable_voice: bool,
    pub difficulty_level: Difficulty,
}

impl Default for LearningSettings {
    fn default() -> Self {
        Self {
            default_language: InterfaceLanguage::ZhCn,
            auto_save_interval: 30,
            show_hints: true,
            enable_voice: false,
            difficulty_level: Difficulty::Beginner,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    Auto,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppearanceSettings {
    pub theme: Theme,
    pub code_theme: String,
    pub font_size: u8,
    pub line_height: f32,
}

impl Default for AppearanceSettings {
    fn default() -> Self {
        Self {
            theme: Theme::Auto,
            code_theme: "github".to_string(),
            font_size: 14,
            line_height: 1.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PrivacySettings {
    pub show_profile: bool,
    pub show_progress: bool,
    pub allow_data_collection: bool,
    pub auto_delete_data: bool,
}

impl Default for PrivacySettings {
    fn default() -> Self {
        Self {
            show_profile: true,
            show_progress: true,
            allow_data_collection: false,
            auto_delete_data: false,
        }
    }
}

/// Section-level partial update. A present section replaces the current one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsPatch {
    pub notifications: Option<NotificationSettings>,
    pub learning: Option<LearningSettings>,
    pub appearance: Option<AppearanceSettings>,
    pub privacy: Option<PrivacySettings>,
}

impl UserSettings {
    /// Shallow merge: sections present in `patch` replace ours wholesale.
    pub fn merge(&mut self, patch: SettingsPatch) {
        if let Some(section) = patch.notifications {
            self.notifications = section;
        }
        if let Some(section) = patch.learning {
            self.learning = section;
        }
        if let Some(section) = patch.appearance {
            self.appearance = section;
        }
        if let Some(section) = patch.privacy {
            self.privacy = section;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_replaces_only_given_sections() {
        let mut settings = UserSettings::default();
        settings.merge(SettingsPatch {
            appearance: Some(AppearanceSettings {
                theme: Theme::Dark,
                ..AppearanceSettings::default()
            }),
            ..SettingsPatch::default()
        });
        assert_eq!(settings.appearance.theme, Theme::Dark);
        assert_eq!(settings.notifications, NotificationSettings::default());
    }

    #[test]
    fn partial_blob_falls_back_to_defaults() {
        let settings: UserSettings =
            serde_json::from_str(r#"{"appearance":{"fontSize":18}}"#).unwrap();
        assert_eq!(settings.appearance.font_size, 18);
        assert_eq!(settings.appearance.code_theme, "github");
        assert_eq!(settings.learning.auto_save_interval, 30);
        assert_eq!(settings.learning.default_language, InterfaceLanguage::ZhCn);
    }

    #[test]
    fn language_uses_locale_tags_on_the_wire() {
        let json = serde_json::to_string(&LearningSettings::default()).unwrap();
        assert!(json.contains("\"defaultLanguage\":\"zh-CN\""));
        assert!(json.contains("\"difficultyLevel\":\"beginner\""));
    }
}
