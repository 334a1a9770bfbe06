use std::collections::HashSet;

use sea_orm::{QueryFilter, TransactionTrait, prelude::*};
use uuid::Uuid;

use crate::{
    EngineError, LedgerEvent, ResultEngine, SplitInput, TransactionSplit, splits,
};

use super::{Engine, with_tx};

/// Check a full set of splits against the transaction amount.
///
/// Every share must be positive, categories must not repeat and the total
/// must satisfy `0 < total <= amount`. An empty set is valid.
pub(super) fn validate_split_inputs(splits: &[SplitInput], amount_minor: i64) -> ResultEngine<()> {
    if splits.is_empty() {
        return Ok(());
    }

    let mut categories = HashSet::with_capacity(splits.len());
    let mut total: i64 = 0;
    for split in splits {
        if split.amount_minor <= 0 {
            return Err(EngineError::InvalidSplit(
                "split amount must be > 0".to_string(),
            ));
        }
        if !categories.insert(split.category_id) {
            return Err(EngineError::InvalidSplit(format!(
                "category {} is split twice",
                split.category_id
            )));
        }
        total = total
            .checked_add(split.amount_minor)
            .ok_or_else(|| EngineError::InvalidSplit("split total overflows".to_string()))?;
    }

    if total <= 0 || total > amount_minor {
        return Err(EngineError::InvalidSplit(format!(
            "split total {total} must be > 0 and <= {amount_minor}"
        )));
    }
    Ok(())
}

impl Engine {
    /// Add one split to a live transaction, keeping the split bound.
    pub async fn add_split(
        &self,
        user_id: &str,
        transaction_id: Uuid,
        split: SplitInput,
    ) -> ResultEngine<TransactionSplit> {
        let now = self.clock.now();
        let (split, events) = with_tx!(self, |db_tx| {
            let transaction = self
                .load_transaction(&db_tx, user_id, transaction_id)
                .await?;
            self.require_category(&db_tx, user_id, split.category_id)
                .await?;

            let mut inputs: Vec<SplitInput> = transaction
                .splits
                .iter()
                .map(|s| SplitInput::new(s.category_id, s.amount_minor))
                .collect();
            inputs.push(split);
            validate_split_inputs(&inputs, transaction.amount_minor)?;

            let split = TransactionSplit {
                id: Uuid::new_v4(),
                transaction_id,
                category_id: split.category_id,
                amount_minor: split.amount_minor,
                created_at: now,
            };
            splits::ActiveModel::from(&split).insert(&db_tx).await?;
            Ok((
                split.clone(),
                vec![LedgerEvent::SplitAdded {
                    user_id: user_id.to_string(),
                    split,
                }],
            ))
        })?;

        self.publish(events).await;
        Ok(split)
    }

    /// Remove one split. The parent transaction must be live.
    pub async fn remove_split(&self, user_id: &str, split_id: Uuid) -> ResultEngine<()> {
        let events = with_tx!(self, |db_tx| {
            let model = splits::Entity::find_by_id(split_id)
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::KeyNotFound("split not exists".to_string()))?;
            self.require_transaction(&db_tx, user_id, model.transaction_id)
                .await?;

            splits::Entity::delete_many()
                .filter(splits::Column::Id.eq(split_id))
                .exec(&db_tx)
                .await?;
            Ok(vec![LedgerEvent::SplitRemoved {
                user_id: user_id.to_string(),
                split: TransactionSplit::from(model),
            }])
        })?;

        self.publish(events).await;
        Ok(())
    }
}
