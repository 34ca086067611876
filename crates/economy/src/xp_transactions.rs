//! Append-only XP history.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    EconomyError, XpSource,
    util::{from_millis, parse_uuid, to_millis},
};

/// One XP award. The id doubles as the idempotency key of the award.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct XpTransaction {
    pub id: Uuid,
    pub child_id: String,
    pub amount: i64,
    pub source: XpSource,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "xp_transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub child_id: String,
    pub amount: i64,
    pub source: String,
    pub description: String,
    pub timestamp_ms: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&XpTransaction> for ActiveModel {
    fn from(value: &XpTransaction) -> Self {
        Self {
            id: ActiveValue::Set(value.id.to_string()),
            child_id: ActiveValue::Set(value.child_id.clone()),
            amount: ActiveValue::Set(value.amount),
            source: ActiveValue::Set(value.source.as_str().to_string()),
            description: ActiveValue::Set(value.description.clone()),
            timestamp_ms: ActiveValue::Set(to_millis(value.timestamp)),
        }
    }
}

impl TryFrom<Model> for XpTransaction {
    type Error = EconomyError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "xp transaction")?,
            child_id: model.child_id,
            amount: model.amount,
            source: XpSource::try_from(model.source.as_str())?,
            description: model.description,
            timestamp: from_millis(model.timestamp_ms, "xp transaction")?,
        })
    }
}
