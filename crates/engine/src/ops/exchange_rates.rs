use chrono::NaiveDate;
use sea_orm::{ActiveValue, QueryFilter, TransactionTrait, prelude::*};
use uuid::Uuid;

use crate::{
    Currency, EngineError, ExchangeRate, ResultEngine, currency::ensure_allowed, exchange_rates,
    util::normalize_required_name,
};

use super::{Engine, with_tx};

impl Engine {
    /// Store the `base → target` rate of `date`, replacing any earlier value
    /// for the same day.
    ///
    /// Rates are data only: the engine never converts amounts with them.
    pub async fn record_exchange_rate(
        &self,
        base: &Currency,
        target: &Currency,
        date: NaiveDate,
        rate_micros: i64,
        source: &str,
    ) -> ResultEngine<ExchangeRate> {
        ensure_allowed(self.currencies.as_ref(), base)?;
        ensure_allowed(self.currencies.as_ref(), target)?;
        if base == target {
            return Err(EngineError::Validation(
                "base and target currency must differ".to_string(),
            ));
        }
        if rate_micros <= 0 {
            return Err(EngineError::InvalidAmount(
                "exchange rate must be > 0".to_string(),
            ));
        }
        let source = normalize_required_name(source, "rate source")?;
        let fetched_at = self.clock.now();

        with_tx!(self, |db_tx| {
            let existing = exchange_rates::Entity::find()
                .filter(exchange_rates::Column::BaseCurrency.eq(base.code()))
                .filter(exchange_rates::Column::TargetCurrency.eq(target.code()))
                .filter(exchange_rates::Column::Date.eq(date))
                .one(&db_tx)
                .await?;

            let model = match existing {
                Some(model) => {
                    let active = exchange_rates::ActiveModel {
                        id: ActiveValue::Set(model.id),
                        rate_micros: ActiveValue::Set(rate_micros),
                        source: ActiveValue::Set(source.clone()),
                        fetched_at: ActiveValue::Set(fetched_at),
                        ..Default::default()
                    };
                    active.update(&db_tx).await?
                }
                None => {
                    exchange_rates::ActiveModel {
                        id: ActiveValue::Set(Uuid::new_v4()),
                        base_currency: ActiveValue::Set(base.code().to_string()),
                        target_currency: ActiveValue::Set(target.code().to_string()),
                        rate_micros: ActiveValue::Set(rate_micros),
                        date: ActiveValue::Set(date),
                        source: ActiveValue::Set(source.clone()),
                        fetched_at: ActiveValue::Set(fetched_at),
                    }
                    .insert(&db_tx)
                    .await?
                }
            };
            ExchangeRate::try_from(model)
        })
    }

    /// The `base → target` rate stored for `date`.
    pub async fn exchange_rate(
        &self,
        base: &Currency,
        target: &Currency,
        date: NaiveDate,
    ) -> ResultEngine<ExchangeRate> {
        let model = exchange_rates::Entity::find()
            .filter(exchange_rates::Column::BaseCurrency.eq(base.code()))
            .filter(exchange_rates::Column::TargetCurrency.eq(target.code()))
            .filter(exchange_rates::Column::Date.eq(date))
            .one(&self.database)
            .await?
            .ok_or_else(|| {
                EngineError::KeyNotFound(format!("rate {base}/{target} on {date}"))
            })?;
        ExchangeRate::try_from(model)
    }
}
