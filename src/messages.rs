use chrono::Utc;
use uuid::Uuid;

use crate::api::events::Subscription;
use crate::api::models::{Conversation, Message};
use crate::api::Backend;
use crate::app::RoundUp;
use crate::error::{Error, Result};
use crate::utils::contains_ignore_case;

impl<B: Backend> RoundUp<B> {
    /// Posts `content` to a group as the signed-in user. Blank or oversized
    /// messages are rejected before anything is sent.
    pub async fn send_message(&self, group_id: &str, content: &str) -> Result<Message> {
        let user = self.session.require_user()?;
        if content.trim().is_empty() {
            return Err(Error::EmptyMessage);
        }
        let max = self.settings.max_message_length;
        if content.chars().count() > max {
            return Err(Error::MessageTooLong { max });
        }

        let message = Message {
            id: Uuid::new_v4().to_string(),
            sender_id: user.id,
            content: content.to_string(),
            group_id: Some(group_id.to_string()),
            created_at: Utc::now(),
        };
        self.backend().insert_message(&message).await?;
        Ok(message)
    }

    /// Messages of a group, oldest first.
    pub async fn group_messages(&self, group_id: &str) -> Result<Vec<Message>> {
        let mut messages = self.backend().messages_for_group(group_id).await?;
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    pub async fn watch_messages(&self, group_id: &str) -> Result<Subscription<Message>> {
        self.backend().subscribe_messages(group_id).await
    }

    /// One conversation per group the user belongs to, with member profiles
    /// as participants and the newest message, if any.
    pub async fn conversations(&self) -> Result<Vec<Conversation>> {
        let groups = self.my_groups().await?;
        if groups.is_empty() {
            return Ok(Vec::new());
        }
        let profiles = self.backend().list_profiles().await?;

        let mut out = Vec::with_capacity(groups.len());
        for group in groups {
            let last_message = self.group_messages(&group.id).await?.pop();
            let participants = profiles
                .iter()
                .filter(|p| group.has_member(&p.id))
                .cloned()
                .collect();
            out.push(Conversation { id: group.id, participants, last_message });
        }
        Ok(out)
    }
}

/// Conversations with a participant whose display name contains `query`.
/// An empty query matches nothing.
pub fn search_conversations<'a>(conversations: &'a [Conversation], query: &str) -> Vec<&'a Conversation> {
    let query = query.trim();
    if query.is_empty() {
        return Vec::new();
    }
    conversations
        .iter()
        .filter(|c| {
            c.participants
                .iter()
                .any(|u| u.display_name.as_deref().is_some_and(|n| contains_ignore_case(n, query)))
        })
        .collect()
}
