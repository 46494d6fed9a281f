//! SeaORM Entity for token_purchases table

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "token_purchases")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub token_id: i64,
    pub buyer: String,
    pub amount: i64,
    #[sea_orm(column_type = "Decimal(Some((24, 4)))")]
    pub total_cost: Decimal,
    #[sea_orm(column_type = "Decimal(Some((38, 18)))", nullable)]
    pub eth_amount_paid: Option<Decimal>,
    pub payment_tx_hash: Option<String>,
    pub is_paid_on_chain: bool,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::business_tokens::Entity",
        from = "Column::TokenId",
        to = "super::business_tokens::Column::Id",
        on_update = "NoAction",
        on_delete = "Restrict"
    )]
    BusinessToken,
}

impl Related<super::business_tokens::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BusinessToken.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
