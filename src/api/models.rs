use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Row columns arrive as `null` when unset; read those as the default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A profile row. Auth payloads only carry `id` and `email`, so everything
/// else defaults.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_student: bool,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub graduation_year: Option<i32>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub clubs: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub video_games: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub hobbies: Vec<String>,
    #[serde(default)]
    pub school: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub career_aspirations: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub classes: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub pets: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sports: Vec<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl User {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self { id: id.into(), email: email.into(), ..Self::default() }
    }

    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.email)
    }

    /// "Jane Smith" -> "JS", "cher" -> "CH".
    pub fn initials(&self) -> String {
        let name = self.display_name.as_deref().unwrap_or("").trim();
        let words: Vec<&str> = name.split_whitespace().collect();
        if words.len() >= 2 {
            words
                .iter()
                .take(2)
                .filter_map(|w| w.chars().next())
                .flat_map(char::to_uppercase)
                .collect()
        } else {
            name.chars().take(2).flat_map(char::to_uppercase).collect()
        }
    }

    /// Interest lists keyed by category name.
    pub fn interest_categories(&self) -> [(&'static str, &[String]); 7] {
        [
            ("clubs", self.clubs.as_slice()),
            ("video_games", self.video_games.as_slice()),
            ("hobbies", self.hobbies.as_slice()),
            ("career_aspirations", self.career_aspirations.as_slice()),
            ("classes", self.classes.as_slice()),
            ("pets", self.pets.as_slice()),
            ("sports", self.sports.as_slice()),
        ]
    }
}

/// Partial profile update; `None` fields are left untouched on the backend.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_student: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graduation_year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clubs: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_games: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hobbies: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub school: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub career_aspirations: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pets: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sports: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl ProfileUpdate {
    pub fn apply_to(&self, user: &mut User) {
        fn set<T: Clone>(dst: &mut T, src: &Option<T>) {
            if let Some(v) = src {
                *dst = v.clone();
            }
        }
        fn set_opt<T: Clone>(dst: &mut Option<T>, src: &Option<T>) {
            if src.is_some() {
                *dst = src.clone();
            }
        }
        set_opt(&mut user.phone_number, &self.phone_number);
        set_opt(&mut user.date_of_birth, &self.date_of_birth);
        set(&mut user.is_student, &self.is_student);
        set_opt(&mut user.display_name, &self.display_name);
        set_opt(&mut user.graduation_year, &self.graduation_year);
        set(&mut user.clubs, &self.clubs);
        set(&mut user.video_games, &self.video_games);
        set(&mut user.hobbies, &self.hobbies);
        set_opt(&mut user.school, &self.school);
        set(&mut user.career_aspirations, &self.career_aspirations);
        set(&mut user.classes, &self.classes);
        set(&mut user.pets, &self.pets);
        set(&mut user.sports, &self.sports);
        set_opt(&mut user.avatar_url, &self.avatar_url);
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Group {
    pub id: String,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    pub creator_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub members: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub interests: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Group {
    pub fn has_member(&self, user_id: &str) -> bool {
        self.members.iter().any(|m| m == user_id)
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GroupMember {
    pub group_id: String,
    pub user_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub content: String,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(alias = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Denormalized view over a group chat; never persisted.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Conversation {
    pub id: String,
    pub participants: Vec<User>,
    pub last_message: Option<Message>,
}

impl Conversation {
    pub fn other_participant(&self, my_id: &str) -> Option<&User> {
        self.participants
            .iter()
            .find(|u| u.id != my_id)
            .or_else(|| self.participants.first())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

/// Result of a sign-in or sign-up. `tokens` is `None` when the backend
/// requires e-mail confirmation before issuing a session.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthResponse {
    pub user: User,
    pub tokens: Option<AuthTokens>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_payload_decodes_into_user() {
        let user: User = serde_json::from_str(r#"{"id":"u1","email":"a@b.c","aud":"authenticated"}"#).unwrap();
        assert_eq!(user.id, "u1");
        assert!(user.clubs.is_empty());
        assert_eq!(user.display_name(), "a@b.c");
    }

    #[test]
    fn null_columns_read_as_defaults() {
        let user: User = serde_json::from_str(
            r#"{"id":"u1","email":"a@b.c","is_student":null,"display_name":null,"clubs":null,
                "video_games":null,"hobbies":["Chess"],"school":null,"career_aspirations":null,
                "classes":null,"pets":null,"sports":null,"avatar_url":null}"#,
        )
        .unwrap();
        assert!(!user.is_student);
        assert!(user.clubs.is_empty());
        assert_eq!(user.hobbies, vec!["Chess".to_string()]);

        let group: Group = serde_json::from_str(
            r#"{"id":"g1","name":"Chess","description":null,"creator_id":"u1",
                "members":null,"interests":null,"created_at":"2024-05-01T10:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(group.description, "");
        assert_eq!(group.member_count(), 0);
        assert!(group.interests.is_empty());
    }

    #[test]
    fn initials_from_display_name() {
        let mut user = User::new("1", "x@y.z");
        user.display_name = Some("jane smith".into());
        assert_eq!(user.initials(), "JS");
        user.display_name = Some("cher".into());
        assert_eq!(user.initials(), "CH");
        user.display_name = None;
        assert_eq!(user.initials(), "");
    }

    #[test]
    fn message_accepts_timestamp_alias() {
        let msg: Message = serde_json::from_str(
            r#"{"id":"m","sender_id":"u","content":"hi","timestamp":"2024-05-01T10:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(msg.group_id, None);
        assert_eq!(msg.created_at.to_rfc3339(), "2024-05-01T10:00:00+00:00");
    }

    #[test]
    fn profile_update_skips_unset_fields() {
        let update = ProfileUpdate { display_name: Some("Sam".into()), ..Default::default() };
        assert_eq!(serde_json::to_value(&update).unwrap(), serde_json::json!({"display_name": "Sam"}));

        let mut user = User::new("1", "s@x.y");
        user.hobbies = vec!["Reading".into()];
        update.apply_to(&mut user);
        assert_eq!(user.display_name.as_deref(), Some("Sam"));
        assert_eq!(user.hobbies, vec!["Reading".to_string()]);
    }

    #[test]
    fn other_participant_prefers_someone_else() {
        let convo = Conversation {
            id: "c".into(),
            participants: vec![User::new("me", ""), User::new("you", "")],
            last_message: None,
        };
        assert_eq!(convo.other_participant("me").unwrap().id, "you");
        let solo = Conversation { id: "c".into(), participants: vec![User::new("me", "")], last_message: None };
        assert_eq!(solo.other_participant("me").unwrap().id, "me");
    }
}
