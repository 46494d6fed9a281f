pub use sea_orm_migration::prelude::*;

mod m20261019_000001_create_token_counters;
mod m20261019_000002_create_business_tokens;
mod m20261019_000003_create_token_purchases;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261019_000001_create_token_counters::Migration),
            Box::new(m20261019_000002_create_business_tokens::Migration),
            Box::new(m20261019_000003_create_token_purchases::Migration),
        ]
    }
}
