//! Migration to create the business_tokens table
//!
//! One row per tokenized business. Supply counters are guarded by CHECK
//! constraints so no write can leave `available_tokens` outside
//! `0..=total_tokens`.

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(BusinessTokens::Table)
                    .if_not_exists()
                    .col(big_integer(BusinessTokens::Id).primary_key())
                    .col(string(BusinessTokens::BusinessName))
                    .col(text(BusinessTokens::Description))
                    .col(decimal_len(BusinessTokens::RevenueEstimate, 20, 4))
                    .col(decimal_len(BusinessTokens::TokenizePercentage, 7, 4))
                    .col(decimal_len(BusinessTokens::PricePerToken, 20, 4))
                    .col(big_integer(BusinessTokens::TotalTokens))
                    .col(big_integer(BusinessTokens::AvailableTokens))
                    .col(decimal_len(BusinessTokens::TotalValue, 24, 4))
                    .col(string(BusinessTokens::OwnerAddress))
                    .col(boolean(BusinessTokens::IsActive).default(true))
                    .col(
                        timestamp_with_time_zone(BusinessTokens::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(timestamp_with_time_zone_null(BusinessTokens::LastRestockedAt))
                    .check(Expr::col(BusinessTokens::AvailableTokens).gte(0))
                    .check(
                        Expr::col(BusinessTokens::AvailableTokens)
                            .lte(Expr::col(BusinessTokens::TotalTokens)),
                    )
                    .to_owned(),
            )
            .await?;

        // Restock authorization lookups
        manager
            .create_index(
                Index::create()
                    .name("idx_business_tokens_owner_address")
                    .table(BusinessTokens::Table)
                    .col(BusinessTokens::OwnerAddress)
                    .to_owned(),
            )
            .await?;

        // Listing of active tokens, newest first
        manager
            .create_index(
                Index::create()
                    .name("idx_business_tokens_active_created")
                    .table(BusinessTokens::Table)
                    .col(BusinessTokens::IsActive)
                    .col(BusinessTokens::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(BusinessTokens::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub(crate) enum BusinessTokens {
    Table,
    Id,
    BusinessName,
    Description,
    RevenueEstimate,
    TokenizePercentage,
    PricePerToken,
    TotalTokens,
    AvailableTokens,
    TotalValue,
    OwnerAddress,
    IsActive,
    CreatedAt,
    LastRestockedAt,
}
