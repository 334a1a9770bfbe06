use sea_orm::{ConnectionTrait, QueryFilter, QuerySelect, prelude::*};
use uuid::Uuid;

use crate::{
    ActivityState, EngineError, LifecycleState, RecordState, ResultEngine, accounts, budgets,
    categories, notifications, recurring_bills, transactions, users,
};

use super::Engine;

/// Generates a `require_*` method loading an entity owned by `user_id`.
///
/// Rows of another user and soft-deleted rows are reported as missing, so
/// ownership never leaks existence. Rows are read with an exclusive lock on
/// backends that support `SELECT ... FOR UPDATE`.
macro_rules! impl_require_owned {
    ($require_fn:ident, $entity:ident, $err_msg:literal, deleted = $deleted:expr) => {
        pub(super) async fn $require_fn(
            &self,
            db: &impl ConnectionTrait,
            user_id: &str,
            id: Uuid,
        ) -> ResultEngine<$entity::Model> {
            $entity::Entity::find_by_id(id)
                .filter($entity::Column::UserId.eq(user_id))
                .filter($entity::Column::State.ne($deleted.as_str()))
                .lock_exclusive()
                .one(db)
                .await?
                .ok_or_else(|| EngineError::KeyNotFound($err_msg.to_string()))
        }
    };
    ($require_fn:ident, $entity:ident, $err_msg:literal) => {
        pub(super) async fn $require_fn(
            &self,
            db: &impl ConnectionTrait,
            user_id: &str,
            id: Uuid,
        ) -> ResultEngine<$entity::Model> {
            $entity::Entity::find_by_id(id)
                .filter($entity::Column::UserId.eq(user_id))
                .lock_exclusive()
                .one(db)
                .await?
                .ok_or_else(|| EngineError::KeyNotFound($err_msg.to_string()))
        }
    };
}

impl Engine {
    impl_require_owned!(
        require_account,
        accounts,
        "account not exists",
        deleted = ActivityState::Deleted
    );

    impl_require_owned!(
        require_category,
        categories,
        "category not exists",
        deleted = RecordState::Deleted
    );

    impl_require_owned!(
        require_transaction,
        transactions,
        "transaction not exists",
        deleted = RecordState::Deleted
    );

    impl_require_owned!(
        require_bill,
        recurring_bills,
        "recurring bill not exists",
        deleted = ActivityState::Deleted
    );

    impl_require_owned!(require_budget, budgets, "budget not exists");

    impl_require_owned!(
        require_notification,
        notifications,
        "notification not exists"
    );

    pub(super) async fn require_user(
        &self,
        db: &impl ConnectionTrait,
        user_id: &str,
    ) -> ResultEngine<users::Model> {
        users::Entity::find_by_id(user_id.to_string())
            .one(db)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound("user not exists".to_string()))
    }

    /// Like `require_account`, but the account must also accept new bookings.
    pub(super) async fn require_active_account(
        &self,
        db: &impl ConnectionTrait,
        user_id: &str,
        id: Uuid,
    ) -> ResultEngine<accounts::Model> {
        let model = self.require_account(db, user_id, id).await?;
        if model.state != ActivityState::Active.as_str() {
            return Err(EngineError::Validation(format!(
                "account '{}' is {}",
                model.name, model.state
            )));
        }
        Ok(model)
    }
}
