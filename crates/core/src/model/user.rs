use serde::{Deserialize, Serialize};

use crate::model::ids::UserId;

/// Account status reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    #[default]
    Active,
    Inactive,
    Banned,
}

/// Identity attributes of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default)]
    pub status: UserStatus,
}

/// Partial profile update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

impl ProfilePatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.email.is_none() && self.avatar.is_none() && self.bio.is_none()
    }
}

impl UserProfile {
    /// Shallow-merge a patch into the profile.
    pub fn apply(&mut self, patch: &ProfilePatch) {
        if let Some(username) = &patch.username {
            self.username.clone_from(username);
        }
        if let Some(email) = &patch.email {
            self.email.clone_from(email);
        }
        if let Some(avatar) = &patch.avatar {
            self.avatar = Some(avatar.clone());
        }
        if let Some(bio) = &patch.bio {
            self.bio = Some(bio.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> UserProfile {
        UserProfile {
            id: UserId::new(7),
            username: "ada".into(),
            email: "ada@example.com".into(),
            avatar: None,
            bio: None,
            status: UserStatus::Active,
        }
    }

    #[test]
    fn apply_only_touches_present_fields() {
        let mut user = profile();
        user.apply(&ProfilePatch {
            bio: Some("likes engines".into()),
            ..ProfilePatch::default()
        });
        assert_eq!(user.username, "ada");
        assert_eq!(user.bio.as_deref(), Some("likes engines"));
    }

    #[test]
    fn deserializes_server_shape_without_optional_fields() {
        let user: UserProfile =
            serde_json::from_str(r#"{"id":3,"username":"bob","email":"b@x.io"}"#).unwrap();
        assert_eq!(user.id, UserId::new(3));
        assert_eq!(user.status, UserStatus::Active);
        assert!(user.avatar.is_none());
    }
}
