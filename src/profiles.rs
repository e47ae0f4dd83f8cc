use crate::api::models::{ProfileUpdate, User};
use crate::api::Backend;
use crate::app::RoundUp;
use crate::error::Result;

impl<B: Backend> RoundUp<B> {
    pub async fn profile(&self, user_id: &str) -> Result<User> {
        self.backend().get_profile(user_id).await
    }

    pub async fn my_profile(&self) -> Result<User> {
        let user = self.session.require_user()?;
        self.backend().get_profile(&user.id).await
    }

    /// Saves the changed fields, then re-reads the row and mirrors it into
    /// the session so observers see the new profile.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User> {
        let user = self.session.require_user()?;
        self.backend().update_profile(&user.id, update).await?;
        let mut profile = self.backend().get_profile(&user.id).await?;
        if profile.email.is_empty() {
            profile.email = user.email;
        }
        self.session.set_current_user(profile.clone());
        Ok(profile)
    }
}
