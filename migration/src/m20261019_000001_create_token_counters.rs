//! Named sequence counters used to allocate token ids

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TokenCounters::Table)
                    .if_not_exists()
                    .col(string(TokenCounters::Name).primary_key())
                    .col(big_integer(TokenCounters::Seq).default(0))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TokenCounters::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum TokenCounters {
    Table,
    Name,
    Seq,
}
