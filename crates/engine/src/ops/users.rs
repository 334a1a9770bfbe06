use sea_orm::{ActiveValue, prelude::*};

use crate::{EngineError, ResultEngine, users, util::normalize_required_name};

use super::Engine;

impl Engine {
    /// Register a user. `username` is the owner key of every other record.
    pub async fn new_user(&self, username: &str, email: &str) -> ResultEngine<()> {
        let username = normalize_required_name(username, "user")?;
        let email = email.trim();
        if !email.contains('@') {
            return Err(EngineError::Validation(format!(
                "invalid email address: {email}"
            )));
        }

        if users::Entity::find_by_id(username.clone())
            .one(&self.database)
            .await?
            .is_some()
        {
            return Err(EngineError::ExistingKey(username));
        }

        users::ActiveModel {
            username: ActiveValue::Set(username),
            email: ActiveValue::Set(email.to_string()),
            created_at: ActiveValue::Set(self.clock.now()),
        }
        .insert(&self.database)
        .await?;
        Ok(())
    }
}
