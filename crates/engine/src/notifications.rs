//! In-app notifications.
//!
//! Rows are written by the budget monitor and the recurring scheduler only;
//! reading them and flipping `is_read` is the user's side.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::EngineError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Budget,
    BillDue,
    Warning,
    Insight,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Budget => "budget",
            Self::BillDue => "bill_due",
            Self::Warning => "warning",
            Self::Insight => "insight",
        }
    }

    /// Subject line of the companion email.
    pub fn subject(self) -> &'static str {
        match self {
            Self::Budget => "Budget Warning",
            Self::BillDue => "Recurring Bill",
            Self::Warning => "Warning",
            Self::Insight => "Insight",
        }
    }
}

impl TryFrom<&str> for NotificationKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "budget" => Ok(Self::Budget),
            "bill_due" => Ok(Self::BillDue),
            "warning" => Ok(Self::Warning),
            "insight" => Ok(Self::Insight),
            other => Err(EngineError::Validation(format!(
                "invalid notification kind: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: String,
    pub kind: NotificationKind,
    pub message: String,
    pub is_read: bool,
    pub sent_at: DateTime<Utc>,
    pub related_id: Option<Uuid>,
    pub email_sent: bool,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "notifications")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: String,
    pub kind: String,
    pub message: String,
    pub is_read: bool,
    pub sent_at: DateTimeUtc,
    pub related_id: Option<Uuid>,
    pub email_sent: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Notification> for ActiveModel {
    fn from(value: &Notification) -> Self {
        Self {
            id: ActiveValue::Set(value.id),
            user_id: ActiveValue::Set(value.user_id.clone()),
            kind: ActiveValue::Set(value.kind.as_str().to_string()),
            message: ActiveValue::Set(value.message.clone()),
            is_read: ActiveValue::Set(value.is_read),
            sent_at: ActiveValue::Set(value.sent_at),
            related_id: ActiveValue::Set(value.related_id),
            email_sent: ActiveValue::Set(value.email_sent),
        }
    }
}

impl TryFrom<Model> for Notification {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: model.id,
            user_id: model.user_id,
            kind: NotificationKind::try_from(model.kind.as_str())?,
            message: model.message,
            is_read: model.is_read,
            sent_at: model.sent_at,
            related_id: model.related_id,
            email_sent: model.email_sent,
        })
    }
}
