//! PostgreSQL token store on SeaORM
//!
//! Supply changes are expressed as single conditional `UPDATE ... RETURNING`
//! statements so the guard is evaluated by the database at write time.
//! A purchase's decrement and its buyer row commit in one transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, ConnectionTrait, Database, DatabaseBackend,
    DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set, Statement, TransactionTrait,
};
use sea_orm_migration::MigratorTrait;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

use crate::entities::{business_tokens, prelude::*, token_purchases};
use crate::models::token::{PurchaseRecord, TokenRecord};
use crate::services::token_store::{PurchaseOutcome, RestockOutcome, StoreError, TokenStore};

/// Maximum pooled connections
const MAX_CONNECTIONS: u32 = 20;

const NEXT_SEQUENCE_SQL: &str = r#"
    INSERT INTO token_counters (name, seq)
    VALUES ($1, 1)
    ON CONFLICT (name) DO UPDATE SET seq = token_counters.seq + 1
    RETURNING seq
"#;

#[derive(Clone)]
pub struct PostgresTokenStore {
    db: DatabaseConnection,
}

impl PostgresTokenStore {
    /// Connect to the database. `timeout` bounds both connecting and
    /// acquiring a pooled connection.
    pub async fn connect(database_url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let mut opts = ConnectOptions::new(database_url.to_string());
        opts.max_connections(MAX_CONNECTIONS)
            .connect_timeout(timeout)
            .acquire_timeout(timeout)
            .sqlx_logging(false);

        info!("Connecting to database...");
        let db = Database::connect(opts).await?;
        Ok(Self { db })
    }

    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        info!("Running migrations...");
        migration::Migrator::up(&self.db, None).await?;
        Ok(())
    }

    /// Attach buyer history to token rows, preserving row order
    async fn with_buyers(
        conn: &DatabaseConnection,
        tokens: Vec<business_tokens::Model>,
    ) -> Result<Vec<TokenRecord>, StoreError> {
        if tokens.is_empty() {
            return Ok(vec![]);
        }

        let ids: Vec<i64> = tokens.iter().map(|t| t.id).collect();
        let purchases = TokenPurchases::find()
            .filter(token_purchases::Column::TokenId.is_in(ids))
            .order_by_asc(token_purchases::Column::Id)
            .all(conn)
            .await?;

        let mut by_token: HashMap<i64, Vec<PurchaseRecord>> = HashMap::new();
        for purchase in purchases {
            by_token
                .entry(purchase.token_id)
                .or_default()
                .push(purchase_from_model(purchase));
        }

        Ok(tokens
            .into_iter()
            .map(|t| {
                let buyers = by_token.remove(&t.id).unwrap_or_default();
                token_from_model(t, buyers)
            })
            .collect())
    }

    async fn load_active(
        conn: &DatabaseConnection,
        id: i64,
    ) -> Result<Option<TokenRecord>, StoreError> {
        let token = BusinessTokens::find_by_id(id)
            .filter(business_tokens::Column::IsActive.eq(true))
            .one(conn)
            .await?;

        match token {
            Some(token) => Ok(Self::with_buyers(conn, vec![token]).await?.pop()),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl TokenStore for PostgresTokenStore {
    async fn next_sequence(&self, counter: &str) -> Result<i64, StoreError> {
        let row = self
            .db
            .query_one(Statement::from_sql_and_values(
                DatabaseBackend::Postgres,
                NEXT_SEQUENCE_SQL,
                [counter.into()],
            ))
            .await?
            .ok_or_else(|| {
                StoreError::DatabaseError(format!("counter {} returned no row", counter))
            })?;

        let seq: i64 = row.try_get("", "seq")?;
        debug!(counter = counter, seq = seq, "Allocated sequence value");
        Ok(seq)
    }

    async fn insert_token(&self, record: TokenRecord) -> Result<TokenRecord, StoreError> {
        let model = business_tokens::ActiveModel {
            id: Set(record.id),
            business_name: Set(record.business_name.clone()),
            description: Set(record.description.clone()),
            revenue_estimate: Set(record.revenue_estimate),
            tokenize_percentage: Set(record.tokenize_percentage),
            price_per_token: Set(record.price_per_token),
            total_tokens: Set(record.total_tokens),
            available_tokens: Set(record.available_tokens),
            total_value: Set(record.total_value),
            owner_address: Set(record.owner_address.clone()),
            is_active: Set(record.is_active),
            created_at: Set(record.created_at.fixed_offset()),
            last_restocked_at: Set(record.last_restocked_at.map(|t| t.fixed_offset())),
        }
        .insert(&self.db)
        .await?;

        Ok(token_from_model(model, vec![]))
    }

    async fn find_active(&self, id: i64) -> Result<Option<TokenRecord>, StoreError> {
        Self::load_active(&self.db, id).await
    }

    async fn list_active(&self) -> Result<Vec<TokenRecord>, StoreError> {
        let tokens = BusinessTokens::find()
            .filter(business_tokens::Column::IsActive.eq(true))
            .order_by_desc(business_tokens::Column::CreatedAt)
            .order_by_desc(business_tokens::Column::Id)
            .all(&self.db)
            .await?;

        Self::with_buyers(&self.db, tokens).await
    }

    async fn purchase_if_available(
        &self,
        id: i64,
        purchase: PurchaseRecord,
    ) -> Result<PurchaseOutcome, StoreError> {
        let txn = self.db.begin().await?;

        let updated = BusinessTokens::update_many()
            .col_expr(
                business_tokens::Column::AvailableTokens,
                Expr::col(business_tokens::Column::AvailableTokens).sub(purchase.amount),
            )
            .filter(business_tokens::Column::Id.eq(id))
            .filter(business_tokens::Column::IsActive.eq(true))
            .filter(business_tokens::Column::AvailableTokens.gte(purchase.amount))
            .exec_with_returning(&txn)
            .await?;

        let Some(token) = updated.into_iter().next() else {
            txn.rollback().await?;
            let current = BusinessTokens::find_by_id(id)
                .filter(business_tokens::Column::IsActive.eq(true))
                .one(&self.db)
                .await?;
            return Ok(match current {
                Some(t) => PurchaseOutcome::Insufficient {
                    available: t.available_tokens,
                },
                None => PurchaseOutcome::NotFound,
            });
        };

        token_purchases::ActiveModel {
            token_id: Set(id),
            buyer: Set(purchase.buyer),
            amount: Set(purchase.amount),
            total_cost: Set(purchase.total_cost),
            eth_amount_paid: Set(purchase.eth_amount_paid),
            payment_tx_hash: Set(purchase.payment_tx_hash),
            is_paid_on_chain: Set(purchase.is_paid_on_chain),
            created_at: Set(purchase.timestamp.fixed_offset()),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;

        Ok(PurchaseOutcome::Purchased {
            remaining: token.available_tokens,
        })
    }

    async fn restock_if_owner(
        &self,
        id: i64,
        additional: i64,
        owner: &str,
        restocked_at: DateTime<Utc>,
    ) -> Result<RestockOutcome, StoreError> {
        let updated = BusinessTokens::update_many()
            .col_expr(
                business_tokens::Column::AvailableTokens,
                Expr::col(business_tokens::Column::AvailableTokens).add(additional),
            )
            .col_expr(
                business_tokens::Column::TotalTokens,
                Expr::col(business_tokens::Column::TotalTokens).add(additional),
            )
            .col_expr(
                business_tokens::Column::TotalValue,
                Expr::expr(Expr::col(business_tokens::Column::TotalTokens).add(additional))
                    .mul(Expr::col(business_tokens::Column::PricePerToken)),
            )
            .col_expr(
                business_tokens::Column::LastRestockedAt,
                Expr::value(restocked_at.fixed_offset()),
            )
            .filter(business_tokens::Column::Id.eq(id))
            .filter(business_tokens::Column::IsActive.eq(true))
            .filter(business_tokens::Column::OwnerAddress.eq(owner))
            .exec_with_returning(&self.db)
            .await?;

        if let Some(token) = updated.into_iter().next() {
            let mut records = Self::with_buyers(&self.db, vec![token]).await?;
            if let Some(record) = records.pop() {
                return Ok(RestockOutcome::Restocked(record));
            }
        }

        let exists = BusinessTokens::find_by_id(id)
            .filter(business_tokens::Column::IsActive.eq(true))
            .one(&self.db)
            .await?
            .is_some();

        Ok(if exists {
            RestockOutcome::NotOwner
        } else {
            RestockOutcome::NotFound
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.db.ping().await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        info!("Closing database connection pool");
        self.db.clone().close().await?;
        Ok(())
    }
}

fn token_from_model(model: business_tokens::Model, buyers: Vec<PurchaseRecord>) -> TokenRecord {
    TokenRecord {
        id: model.id,
        business_name: model.business_name,
        description: model.description,
        revenue_estimate: model.revenue_estimate,
        tokenize_percentage: model.tokenize_percentage,
        price_per_token: model.price_per_token,
        total_tokens: model.total_tokens,
        available_tokens: model.available_tokens,
        total_value: model.total_value,
        owner_address: model.owner_address,
        is_active: model.is_active,
        buyers,
        created_at: model.created_at.with_timezone(&Utc),
        last_restocked_at: model.last_restocked_at.map(|t| t.with_timezone(&Utc)),
    }
}

fn purchase_from_model(model: token_purchases::Model) -> PurchaseRecord {
    PurchaseRecord {
        buyer: model.buyer,
        amount: model.amount,
        total_cost: model.total_cost,
        eth_amount_paid: model.eth_amount_paid,
        payment_tx_hash: model.payment_tx_hash,
        is_paid_on_chain: model.is_paid_on_chain,
        timestamp: model.created_at.with_timezone(&Utc),
    }
}
