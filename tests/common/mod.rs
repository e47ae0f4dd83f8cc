#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use roundup::api::events::Subscription;
use roundup::api::models::{AuthTokens, Group, GroupMember, Message, ProfileUpdate, User};
use roundup::api::Backend;
use roundup::config::AppSettings;
use roundup::{Error, Result, RoundUp};
use tokio::sync::mpsc;

#[derive(Default)]
pub struct MockState {
    pub accounts: HashMap<String, (String, User)>,
    pub profiles: HashMap<String, User>,
    pub groups: Vec<Group>,
    pub group_members: Vec<GroupMember>,
    pub messages: Vec<Message>,
    pub tokens: Option<AuthTokens>,
    pub calls: Vec<String>,
    pub fail_sign_out: bool,
    pub offline: bool,
    pub message_feeds: Vec<(String, mpsc::Sender<Message>)>,
    pub group_feeds: Vec<(String, mpsc::Sender<Group>)>,
}

/// In-memory backend recording every call by name.
#[derive(Default)]
pub struct MockBackend {
    pub state: Mutex<MockState>,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_account(self: Arc<Self>, email: &str, password: &str, user: User) -> Arc<Self> {
        {
            let mut st = self.state.lock().unwrap();
            st.profiles.insert(user.id.clone(), user.clone());
            st.accounts.insert(email.to_string(), (password.to_string(), user));
        }
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn called(&self, name: &str) -> bool {
        self.calls().iter().any(|c| c == name)
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn add_group(&self, group: Group) {
        self.state.lock().unwrap().groups.push(group);
    }

    pub fn add_profile(&self, user: User) {
        self.state.lock().unwrap().profiles.insert(user.id.clone(), user);
    }

    pub fn add_message(&self, message: Message) {
        self.state.lock().unwrap().messages.push(message);
    }

    pub fn stored_group(&self, id: &str) -> Option<Group> {
        self.state.lock().unwrap().groups.iter().find(|g| g.id == id).cloned()
    }

    pub fn set_fail_sign_out(&self, fail: bool) {
        self.state.lock().unwrap().fail_sign_out = fail;
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.lock().unwrap().offline = offline;
    }

    /// Pushes a row into every open message feed for its group.
    pub async fn push_message(&self, message: Message) {
        let group_id = message.group_id.clone().unwrap_or_default();
        let feeds: Vec<mpsc::Sender<Message>> = {
            let st = self.state.lock().unwrap();
            st.message_feeds.iter().filter(|(g, _)| *g == group_id).map(|(_, tx)| tx.clone()).collect()
        };
        for tx in feeds {
            let _ = tx.send(message.clone()).await;
        }
    }

    pub async fn push_group(&self, group: Group) {
        let feeds: Vec<mpsc::Sender<Group>> = {
            let st = self.state.lock().unwrap();
            st.group_feeds.iter().filter(|(g, _)| *g == group.id).map(|(_, tx)| tx.clone()).collect()
        };
        for tx in feeds {
            let _ = tx.send(group.clone()).await;
        }
    }

    fn record(&self, name: &str) {
        self.state.lock().unwrap().calls.push(name.to_string());
    }

    fn authenticate(&self, email: &str, password: &str) -> Result<User> {
        let mut st = self.state.lock().unwrap();
        match st.accounts.get(email) {
            Some((pw, user)) if pw == password => {
                let user = user.clone();
                st.tokens = Some(AuthTokens { access_token: format!("token-{}", user.id), refresh_token: None });
                Ok(user)
            }
            _ => Err(Error::Rejected { status: 400, message: "Invalid login credentials".into() }),
        }
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn sign_up(&self, email: &str, password: &str) -> Result<User> {
        self.record("sign_up");
        {
            let mut st = self.state.lock().unwrap();
            if st.accounts.contains_key(email) {
                return Err(Error::Rejected { status: 422, message: "User already registered".into() });
            }
            let user = User::new(format!("user-{}", st.accounts.len() + 1), email);
            st.profiles.insert(user.id.clone(), user.clone());
            st.accounts.insert(email.to_string(), (password.to_string(), user));
        }
        self.authenticate(email, password)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<User> {
        self.record("sign_in");
        self.authenticate(email, password)
    }

    async fn sign_out(&self) -> Result<()> {
        self.record("sign_out");
        let mut st = self.state.lock().unwrap();
        st.tokens = None;
        if st.fail_sign_out {
            return Err(Error::Network("connection reset".into()));
        }
        Ok(())
    }

    async fn reset_password(&self, email: &str) -> Result<()> {
        self.record("reset_password");
        if self.state.lock().unwrap().accounts.contains_key(email) {
            Ok(())
        } else {
            Err(Error::UserNotFound)
        }
    }

    async fn session_user(&self) -> Result<User> {
        self.record("session_user");
        let st = self.state.lock().unwrap();
        if st.offline {
            return Err(Error::Network("connection refused".into()));
        }
        let token = st.tokens.as_ref().ok_or(Error::UserNotFound)?;
        st.accounts
            .values()
            .map(|(_, u)| u)
            .find(|u| token.access_token == format!("token-{}", u.id))
            .cloned()
            .ok_or(Error::UserNotFound)
    }

    fn tokens(&self) -> Option<AuthTokens> {
        self.state.lock().unwrap().tokens.clone()
    }

    fn restore_tokens(&self, tokens: Option<AuthTokens>) {
        self.state.lock().unwrap().tokens = tokens;
    }

    async fn get_profile(&self, user_id: &str) -> Result<User> {
        self.record("get_profile");
        self.state.lock().unwrap().profiles.get(user_id).cloned().ok_or(Error::UserNotFound)
    }

    async fn update_profile(&self, user_id: &str, update: &ProfileUpdate) -> Result<()> {
        self.record("update_profile");
        let mut st = self.state.lock().unwrap();
        let profile = st.profiles.get_mut(user_id).ok_or(Error::UserNotFound)?;
        update.apply_to(profile);
        Ok(())
    }

    async fn list_profiles(&self) -> Result<Vec<User>> {
        self.record("list_profiles");
        let mut profiles: Vec<User> = self.state.lock().unwrap().profiles.values().cloned().collect();
        profiles.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(profiles)
    }

    async fn insert_group(&self, group: &Group) -> Result<()> {
        self.record("insert_group");
        self.state.lock().unwrap().groups.push(group.clone());
        Ok(())
    }

    async fn get_group(&self, group_id: &str) -> Result<Group> {
        self.record("get_group");
        self.stored_group(group_id)
            .ok_or_else(|| Error::InvalidResponse(format!("group {group_id} not found")))
    }

    async fn list_groups(&self) -> Result<Vec<Group>> {
        self.record("list_groups");
        Ok(self.state.lock().unwrap().groups.clone())
    }

    async fn groups_for_member(&self, user_id: &str) -> Result<Vec<Group>> {
        self.record("groups_for_member");
        let st = self.state.lock().unwrap();
        Ok(st
            .groups
            .iter()
            .filter(|g| st.group_members.iter().any(|m| m.group_id == g.id && m.user_id == user_id))
            .cloned()
            .collect())
    }

    async fn update_group_members(&self, group_id: &str, members: &[String]) -> Result<()> {
        self.record("update_group_members");
        let mut st = self.state.lock().unwrap();
        let group = st
            .groups
            .iter_mut()
            .find(|g| g.id == group_id)
            .ok_or_else(|| Error::InvalidResponse(format!("group {group_id} not found")))?;
        group.members = members.to_vec();
        Ok(())
    }

    async fn insert_group_member(&self, member: &GroupMember) -> Result<()> {
        self.record("insert_group_member");
        self.state.lock().unwrap().group_members.push(member.clone());
        Ok(())
    }

    async fn insert_message(&self, message: &Message) -> Result<()> {
        self.record("insert_message");
        self.state.lock().unwrap().messages.push(message.clone());
        Ok(())
    }

    async fn messages_for_group(&self, group_id: &str) -> Result<Vec<Message>> {
        self.record("messages_for_group");
        let st = self.state.lock().unwrap();
        Ok(st.messages.iter().filter(|m| m.group_id.as_deref() == Some(group_id)).cloned().collect())
    }

    async fn subscribe_messages(&self, group_id: &str) -> Result<Subscription<Message>> {
        self.record("subscribe_messages");
        let (tx, sub) = Subscription::channel(format!("realtime:messages:{group_id}"));
        self.state.lock().unwrap().message_feeds.push((group_id.to_string(), tx));
        Ok(sub)
    }

    async fn subscribe_group_updates(&self, group_id: &str) -> Result<Subscription<Group>> {
        self.record("subscribe_group_updates");
        let (tx, sub) = Subscription::channel(format!("realtime:groups:{group_id}"));
        self.state.lock().unwrap().group_feeds.push((group_id.to_string(), tx));
        Ok(sub)
    }
}

pub const EMAIL: &str = "sam@example.com";
pub const PASSWORD: &str = "correct horse";

pub fn sam() -> User {
    let mut u = User::new("sam", EMAIL);
    u.display_name = Some("Sam Rivera".into());
    u.school = Some("Central High".into());
    u.clubs = vec!["Math Club".into()];
    u.video_games = vec!["Minecraft".into()];
    u
}

pub fn person(id: &str, name: &str) -> User {
    let mut u = User::new(id, format!("{id}@example.com"));
    u.display_name = Some(name.into());
    u
}

pub fn group(id: &str, name: &str, members: &[&str]) -> Group {
    Group {
        id: id.into(),
        name: name.into(),
        description: format!("{name} description"),
        creator_id: members.first().copied().unwrap_or("nobody").into(),
        members: members.iter().map(|m| m.to_string()).collect(),
        interests: vec![],
        created_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
    }
}

pub fn message(id: &str, group_id: &str, sender: &str, content: &str, minute: i64) -> Message {
    Message {
        id: id.into(),
        sender_id: sender.into(),
        content: content.into(),
        group_id: Some(group_id.into()),
        created_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap() + Duration::minutes(minute),
    }
}

pub fn app(backend: &Arc<MockBackend>) -> RoundUp<MockBackend> {
    RoundUp::new(backend.clone(), AppSettings::default())
}

/// An app whose session is already signed in as [`sam`].
pub async fn signed_in() -> (Arc<MockBackend>, RoundUp<MockBackend>) {
    let backend = MockBackend::new().with_account(EMAIL, PASSWORD, sam());
    let app = app(&backend);
    app.session().sign_in(EMAIL, PASSWORD).await.unwrap();
    backend.clear_calls();
    (backend, app)
}
