use sea_orm::{ActiveValue, QueryFilter, QueryOrder, TransactionTrait, prelude::*, sea_query::Expr};
use uuid::Uuid;

use crate::{
    ActivityState, Category, EngineError, LedgerEvent, LifecycleState, RecordState, ResultEngine,
    categories, lifecycle::transition, recurring_bills, util::normalize_required_name,
};

use super::{Engine, with_tx};

impl Engine {
    /// Create a category, optionally nested under `parent_id`.
    ///
    /// Names are unique, case-insensitively, among the live siblings.
    pub async fn new_category(
        &self,
        user_id: &str,
        name: &str,
        parent_id: Option<Uuid>,
    ) -> ResultEngine<Category> {
        let name = normalize_required_name(name, "category")?;
        let now = self.clock.now();

        let (category, events) = with_tx!(self, |db_tx| {
            self.require_user(&db_tx, user_id).await?;
            if let Some(parent_id) = parent_id {
                self.require_category(&db_tx, user_id, parent_id).await?;
            }

            let parent_filter = match parent_id {
                Some(parent_id) => categories::Column::ParentId.eq(parent_id),
                None => categories::Column::ParentId.is_null(),
            };
            let exists = categories::Entity::find()
                .filter(categories::Column::UserId.eq(user_id))
                .filter(categories::Column::State.eq(RecordState::Live.as_str()))
                .filter(parent_filter)
                .filter(Expr::cust("LOWER(name)").eq(name.to_lowercase()))
                .one(&db_tx)
                .await?
                .is_some();
            if exists {
                return Err(EngineError::ExistingKey(name));
            }

            let category = Category {
                id: Uuid::new_v4(),
                user_id: user_id.to_string(),
                name: name.clone(),
                parent_id,
                state: RecordState::Live,
            };
            categories::ActiveModel {
                id: ActiveValue::Set(category.id),
                user_id: ActiveValue::Set(category.user_id.clone()),
                name: ActiveValue::Set(category.name.clone()),
                parent_id: ActiveValue::Set(category.parent_id),
                state: ActiveValue::Set(category.state.as_str().to_string()),
                created_at: ActiveValue::Set(now),
            }
            .insert(&db_tx)
            .await?;

            Ok((
                category.clone(),
                vec![LedgerEvent::CategoryCreated { category }],
            ))
        })?;

        self.publish(events).await;
        Ok(category)
    }

    /// Live categories of the user, by name.
    pub async fn categories(&self, user_id: &str) -> ResultEngine<Vec<Category>> {
        categories::Entity::find()
            .filter(categories::Column::UserId.eq(user_id))
            .filter(categories::Column::State.eq(RecordState::Live.as_str()))
            .order_by_asc(categories::Column::Name)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Category::try_from)
            .collect()
    }

    pub async fn archived_categories(&self, user_id: &str) -> ResultEngine<Vec<Category>> {
        categories::Entity::find()
            .filter(categories::Column::UserId.eq(user_id))
            .filter(categories::Column::State.eq(RecordState::Deleted.as_str()))
            .order_by_asc(categories::Column::Name)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Category::try_from)
            .collect()
    }

    /// Soft-delete a category.
    ///
    /// Transactions, splits and budgets keep pointing at it; it just can no
    /// longer be picked for new records. A category still booked by a
    /// recurring bill that is not deleted cannot be removed.
    pub async fn delete_category(&self, user_id: &str, category_id: Uuid) -> ResultEngine<()> {
        let events = with_tx!(self, |db_tx| {
            let model = self
                .require_category(&db_tx, user_id, category_id)
                .await?;
            let category = Category::try_from(model)?;
            let state = transition(category.state, RecordState::Deleted, "category")?;

            let bill = recurring_bills::Entity::find()
                .filter(recurring_bills::Column::UserId.eq(user_id))
                .filter(recurring_bills::Column::CategoryId.eq(category_id))
                .filter(recurring_bills::Column::State.ne(ActivityState::Deleted.as_str()))
                .one(&db_tx)
                .await?;
            if let Some(bill) = bill {
                return Err(EngineError::Validation(format!(
                    "category '{}' is used by recurring bill '{}'",
                    category.name, bill.name
                )));
            }

            let active = categories::ActiveModel {
                id: ActiveValue::Set(category_id),
                state: ActiveValue::Set(state.as_str().to_string()),
                ..Default::default()
            };
            active.update(&db_tx).await?;

            Ok(vec![LedgerEvent::CategoryDeleted {
                category: Category { state, ..category },
            }])
        })?;

        self.publish(events).await;
        Ok(())
    }
}
