//! Migration to create the token_purchases table (buyer history)

use sea_orm_migration::{prelude::*, schema::*};

use crate::m20261019_000002_create_business_tokens::BusinessTokens;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TokenPurchases::Table)
                    .if_not_exists()
                    .col(pk_auto(TokenPurchases::Id))
                    .col(big_integer(TokenPurchases::TokenId))
                    .col(string(TokenPurchases::Buyer))
                    .col(big_integer(TokenPurchases::Amount))
                    .col(decimal_len(TokenPurchases::TotalCost, 24, 4))
                    .col(decimal_len_null(TokenPurchases::EthAmountPaid, 38, 18))
                    .col(string_null(TokenPurchases::PaymentTxHash))
                    .col(boolean(TokenPurchases::IsPaidOnChain).default(false))
                    .col(
                        timestamp_with_time_zone(TokenPurchases::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .check(Expr::col(TokenPurchases::Amount).gt(0))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_token_purchases_token_id")
                            .from(TokenPurchases::Table, TokenPurchases::TokenId)
                            .to(BusinessTokens::Table, BusinessTokens::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        // Buyer history is always read per token, in insertion order
        manager
            .create_index(
                Index::create()
                    .name("idx_token_purchases_token_id")
                    .table(TokenPurchases::Table)
                    .col(TokenPurchases::TokenId)
                    .col(TokenPurchases::Id)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TokenPurchases::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum TokenPurchases {
    Table,
    Id,
    TokenId,
    Buyer,
    Amount,
    TotalCost,
    EthAmountPaid,
    PaymentTxHash,
    IsPaidOnChain,
    CreatedAt,
}
