use async_trait::async_trait;

use crate::api::events::Subscription;
use crate::api::models::{AuthTokens, Group, GroupMember, Message, ProfileUpdate, User};
use crate::error::Result;

/// Everything the client needs from the managed backend: authentication,
/// row storage for `profiles`, `groups`, `group_members` and `messages`,
/// and realtime change feeds.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> Result<User>;
    async fn sign_in(&self, email: &str, password: &str) -> Result<User>;
    async fn sign_out(&self) -> Result<()>;
    async fn reset_password(&self, email: &str) -> Result<()>;
    /// Resolves the user behind the current session, if any.
    async fn session_user(&self) -> Result<User>;

    fn tokens(&self) -> Option<AuthTokens>;
    fn restore_tokens(&self, tokens: Option<AuthTokens>);

    async fn get_profile(&self, user_id: &str) -> Result<User>;
    async fn update_profile(&self, user_id: &str, update: &ProfileUpdate) -> Result<()>;
    async fn list_profiles(&self) -> Result<Vec<User>>;

    async fn insert_group(&self, group: &Group) -> Result<()>;
    async fn get_group(&self, group_id: &str) -> Result<Group>;
    async fn list_groups(&self) -> Result<Vec<Group>>;
    async fn groups_for_member(&self, user_id: &str) -> Result<Vec<Group>>;
    /// Overwrites the whole member list of a group.
    async fn update_group_members(&self, group_id: &str, members: &[String]) -> Result<()>;
    async fn insert_group_member(&self, member: &GroupMember) -> Result<()>;

    async fn insert_message(&self, message: &Message) -> Result<()>;
    async fn messages_for_group(&self, group_id: &str) -> Result<Vec<Message>>;

    async fn subscribe_messages(&self, group_id: &str) -> Result<Subscription<Message>>;
    async fn subscribe_group_updates(&self, group_id: &str) -> Result<Subscription<Group>>;
}
