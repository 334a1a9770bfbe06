use std::sync::Arc;

use sea_orm::{
    ActiveValue, DatabaseConnection, QueryFilter, QueryOrder, prelude::*, sea_query::Expr,
};
use tracing::warn;
use uuid::Uuid;

use crate::{
    Clock, DispatchError, EmailDispatcher, EmailRequest, Notification, NotificationKind,
    ResultEngine, notifications, users,
};

use super::Engine;

/// Writes notification rows and requests their email.
///
/// Shared by the engine and the budget subscriber; it only ever runs after
/// the financial write committed.
pub(crate) struct Notifier {
    database: DatabaseConnection,
    clock: Arc<dyn Clock>,
    email: Arc<dyn EmailDispatcher>,
}

impl Notifier {
    pub(crate) fn new(
        database: DatabaseConnection,
        clock: Arc<dyn Clock>,
        email: Arc<dyn EmailDispatcher>,
    ) -> Self {
        Self {
            database,
            clock,
            email,
        }
    }

    /// Persist a notification, then request its email.
    ///
    /// Failures are logged and swallowed: they never reach the caller of the
    /// originating mutation.
    pub(crate) async fn notify(
        &self,
        user_id: &str,
        kind: NotificationKind,
        message: String,
        related_id: Option<Uuid>,
    ) {
        if let Err(err) = self
            .try_notify(user_id, kind, message, related_id)
            .await
        {
            warn!(user = user_id, kind = kind.as_str(), %err, "notification failed");
        }
    }

    async fn try_notify(
        &self,
        user_id: &str,
        kind: NotificationKind,
        message: String,
        related_id: Option<Uuid>,
    ) -> ResultEngine<()> {
        let notification = Notification {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            kind,
            message,
            is_read: false,
            sent_at: self.clock.now(),
            related_id,
            email_sent: false,
        };
        notifications::ActiveModel::from(&notification)
            .insert(&self.database)
            .await?;

        let recipient = users::Entity::find_by_id(user_id.to_string())
            .one(&self.database)
            .await?
            .map(|user| user.email)
            .ok_or_else(|| DispatchError::MissingRecipient(user_id.to_string()));
        let sent = recipient.and_then(|to| {
            self.email.send(&EmailRequest {
                to,
                subject: kind.subject().to_string(),
                body: notification.message.clone(),
            })
        });
        match sent {
            Ok(()) => {
                let active = notifications::ActiveModel {
                    id: ActiveValue::Set(notification.id),
                    email_sent: ActiveValue::Set(true),
                    ..Default::default()
                };
                active.update(&self.database).await?;
            }
            Err(err) => {
                warn!(
                    user = user_id,
                    notification = %notification.id,
                    %err,
                    "email dispatch failed"
                );
            }
        }
        Ok(())
    }
}

impl Engine {
    pub(super) async fn notify(
        &self,
        user_id: &str,
        kind: NotificationKind,
        message: String,
        related_id: Option<Uuid>,
    ) {
        self.notifier.notify(user_id, kind, message, related_id).await;
    }

    /// Notifications of the user, newest first.
    pub async fn notifications(
        &self,
        user_id: &str,
        unread_only: bool,
    ) -> ResultEngine<Vec<Notification>> {
        let mut query =
            notifications::Entity::find().filter(notifications::Column::UserId.eq(user_id));
        if unread_only {
            query = query.filter(notifications::Column::IsRead.eq(false));
        }
        query
            .order_by_desc(notifications::Column::SentAt)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Notification::try_from)
            .collect()
    }

    pub async fn mark_notification_read(
        &self,
        user_id: &str,
        notification_id: Uuid,
    ) -> ResultEngine<()> {
        self.require_notification(&self.database, user_id, notification_id)
            .await?;
        let active = notifications::ActiveModel {
            id: ActiveValue::Set(notification_id),
            is_read: ActiveValue::Set(true),
            ..Default::default()
        };
        active.update(&self.database).await?;
        Ok(())
    }

    /// Returns how many notifications changed.
    pub async fn mark_all_notifications_read(&self, user_id: &str) -> ResultEngine<u64> {
        let result = notifications::Entity::update_many()
            .col_expr(notifications::Column::IsRead, Expr::value(true))
            .filter(notifications::Column::UserId.eq(user_id))
            .filter(notifications::Column::IsRead.eq(false))
            .exec(&self.database)
            .await?;
        Ok(result.rows_affected)
    }
}
