//! SeaORM Entity for business_tokens table
//!
//! One row per tokenized business. The buyer history lives in
//! `token_purchases` and is joined on read.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "business_tokens")]
pub struct Model {
    /// Allocated from the `tokenId` counter, never auto-incremented by the database
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,
    pub business_name: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    #[sea_orm(column_type = "Decimal(Some((20, 4)))")]
    pub revenue_estimate: Decimal,
    #[sea_orm(column_type = "Decimal(Some((7, 4)))")]
    pub tokenize_percentage: Decimal,
    #[sea_orm(column_type = "Decimal(Some((20, 4)))")]
    pub price_per_token: Decimal,
    pub total_tokens: i64,
    pub available_tokens: i64,
    #[sea_orm(column_type = "Decimal(Some((24, 4)))")]
    pub total_value: Decimal,
    /// Lowercase wallet address
    pub owner_address: String,
    pub is_active: bool,
    pub created_at: DateTimeWithTimeZone,
    pub last_restocked_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::token_purchases::Entity")]
    TokenPurchases,
}

impl Related<super::token_purchases::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TokenPurchases.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
