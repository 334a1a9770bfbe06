//! Daily exchange rates, stored as fetched.
//!
//! `rate_micros` is the price of one unit of `base` in `target`, with six
//! fraction digits (`571.25` → `571_250_000`).

use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Currency, EngineError};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub id: Uuid,
    pub base: Currency,
    pub target: Currency,
    pub rate_micros: i64,
    pub date: NaiveDate,
    pub source: String,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "exchange_rates")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub base_currency: String,
    pub target_currency: String,
    pub rate_micros: i64,
    pub date: Date,
    pub source: String,
    pub fetched_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for ExchangeRate {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: model.id,
            base: Currency::new(&model.base_currency)?,
            target: Currency::new(&model.target_currency)?,
            rate_micros: model.rate_micros,
            date: model.date,
            source: model.source,
            fetched_at: model.fetched_at,
        })
    }
}
