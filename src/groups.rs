use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::api::events::Subscription;
use crate::api::models::{Group, GroupMember};
use crate::api::Backend;
use crate::app::RoundUp;
use crate::error::{Error, Result};
use crate::utils::contains_ignore_case;

impl<B: Backend> RoundUp<B> {
    /// Creates a group owned by the signed-in user, who is its only member.
    pub async fn create_group(&self, name: &str, description: &str, interests: Vec<String>) -> Result<Group> {
        let user = self.session.require_user()?;
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::EmptyGroupName);
        }

        let group = Group {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: description.to_string(),
            creator_id: user.id.clone(),
            members: vec![user.id.clone()],
            interests,
            created_at: Utc::now(),
        };
        self.backend().insert_group(&group).await?;
        self.backend()
            .insert_group_member(&GroupMember { group_id: group.id.clone(), user_id: user.id })
            .await?;
        log::info!("created group {} ({})", group.name, group.id);
        self.remember(std::slice::from_ref(&group));
        Ok(group)
    }

    /// Joins `group` as seen locally. The membership check runs against this
    /// copy only, so two concurrent joins can overwrite each other's member
    /// list (last write wins). Returns the updated copy.
    pub async fn join_group(&self, group: &Group) -> Result<Group> {
        let user = self.session.require_user()?;
        if group.has_member(&user.id) {
            return Err(Error::AlreadyMember);
        }
        let max = self.settings.max_group_size;
        if group.member_count() >= max {
            return Err(Error::GroupFull { max });
        }

        let mut updated = group.clone();
        updated.members.push(user.id.clone());
        self.backend().update_group_members(&updated.id, &updated.members).await?;
        self.backend()
            .insert_group_member(&GroupMember { group_id: updated.id.clone(), user_id: user.id })
            .await?;
        self.remember(std::slice::from_ref(&updated));
        Ok(updated)
    }

    pub async fn my_groups(&self) -> Result<Vec<Group>> {
        let user = self.session.require_user()?;
        self.backend().groups_for_member(&user.id).await
    }

    pub async fn group(&self, group_id: &str) -> Result<Group> {
        self.backend().get_group(group_id).await
    }

    /// Every group on the backend, newest first; mirrored into the local cache.
    pub async fn discover_groups(&self) -> Result<Vec<Group>> {
        let groups = self.backend().list_groups().await?;
        self.remember(&groups);
        Ok(groups)
    }

    /// Last known groups from the local cache, empty without one.
    pub fn cached_groups(&self) -> Result<Vec<Group>> {
        match &self.cache {
            Some(cache) => match cache.lock() {
                Ok(cache) => cache.get_groups(None),
                Err(_) => Err(Error::Unknown("group cache lock poisoned".into())),
            },
            None => Ok(Vec::new()),
        }
    }

    /// When the cache last mirrored a group list.
    pub fn cache_synced_at(&self) -> Result<Option<DateTime<Utc>>> {
        let Some(cache) = &self.cache else { return Ok(None) };
        let secs = match cache.lock() {
            Ok(cache) => cache.last_synced_at()?,
            Err(_) => return Err(Error::Unknown("group cache lock poisoned".into())),
        };
        Ok(secs.and_then(|s| DateTime::from_timestamp(s, 0)))
    }

    pub async fn watch_group(&self, group_id: &str) -> Result<Subscription<Group>> {
        self.backend().subscribe_group_updates(group_id).await
    }

    fn remember(&self, groups: &[Group]) {
        if !self.settings.cache_enabled {
            return;
        }
        let Some(cache) = &self.cache else { return };
        let result = match cache.lock() {
            Ok(mut cache) => cache.upsert_groups(groups),
            Err(_) => return,
        };
        if let Err(e) = result {
            log::warn!("failed to cache groups: {e}");
        }
    }
}

/// Groups whose name, description or any interest contains `query`,
/// ignoring case. An empty query keeps everything.
pub fn filter_groups<'a>(groups: &'a [Group], query: &str) -> Vec<&'a Group> {
    let query = query.trim();
    if query.is_empty() {
        return groups.iter().collect();
    }
    groups
        .iter()
        .filter(|g| {
            contains_ignore_case(&g.name, query)
                || contains_ignore_case(&g.description, query)
                || g.interests.iter().any(|i| contains_ignore_case(i, query))
        })
        .collect()
}
