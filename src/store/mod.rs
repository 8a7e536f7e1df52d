//! Subscription persistence.
//!
//! `SubscriptionStore` owns the shape of every query the registry runs:
//! the bootstrap sequence for the backing table, the idempotent upsert,
//! the validate-mode existence probe, and the subscriber lookup. Queries
//! are built with sea-query against the schema identifiers below and
//! executed through the abstract [`QueryGateway`].

use std::sync::Arc;

use chrono::Utc;
use sea_query::{Expr, Iden, OnConflict, Order, Query, SqliteQueryBuilder, Value, Values};
use tracing::{debug, info};

use crate::gateway::{QueryGateway, Result, StoreError, StoreQuery};
use crate::message::{EndpointAddress, MessageType};


/// Subscriptions table schema.
#[derive(Iden)]
pub enum Subscriptions {
    Table,
    #[iden = "message_type"]
    MessageType,
    #[iden = "endpoint"]
    Endpoint,
    #[iden = "created_at"]
    CreatedAt,
}

/// Name of the subscriptions table, for catalog probes.
pub const SUBSCRIPTIONS_TABLE: &str = "subscriptions";

/// SQL for creating the subscriptions table.
///
/// Deliberately not `IF NOT EXISTS`: the bootstrapper probes first and
/// relies on the gateway's duplicate-object classification to absorb
/// the race with a concurrent bootstrapper.
pub const CREATE_SUBSCRIPTIONS_TABLE: &str = "CREATE TABLE subscriptions (
    message_type TEXT NOT NULL,
    endpoint TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (message_type, endpoint)
)";

const TABLE_EXISTS_SQL: &str =
    "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?";

/// Durable store for (message type, endpoint) subscription records.
pub struct SubscriptionStore {
    gateway: Arc<dyn QueryGateway>,
}

impl SubscriptionStore {
    pub fn new(gateway: Arc<dyn QueryGateway>) -> Self {
        Self { gateway }
    }

    /// Ensure the backing table exists.
    ///
    /// Probe, then create on absence. A creation failure classified as
    /// `AlreadyExists` means a concurrent bootstrapper won the race and
    /// is swallowed; anything else aborts construction.
    pub async fn bootstrap(&self) -> Result<()> {
        let probe = StoreQuery::new(TABLE_EXISTS_SQL).bind("name", SUBSCRIPTIONS_TABLE);
        if self.gateway.execute_scalar(&probe).await? > 0 {
            debug!(table = SUBSCRIPTIONS_TABLE, "subscription table present");
            return Ok(());
        }

        match self
            .gateway
            .execute(&StoreQuery::new(CREATE_SUBSCRIPTIONS_TABLE))
            .await
        {
            Ok(()) => {
                info!(table = SUBSCRIPTIONS_TABLE, "created subscription table");
                Ok(())
            }
            Err(StoreError::AlreadyExists(_)) => {
                debug!(
                    table = SUBSCRIPTIONS_TABLE,
                    "lost creation race to concurrent bootstrapper"
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Persist a subscription. Re-running for the same pair is a no-op.
    pub async fn upsert(
        &self,
        message_type: &MessageType,
        endpoint: &EndpointAddress,
    ) -> Result<()> {
        let (sql, values) = Query::insert()
            .into_table(Subscriptions::Table)
            .columns([
                Subscriptions::MessageType,
                Subscriptions::Endpoint,
                Subscriptions::CreatedAt,
            ])
            .values_panic([
                message_type.as_str().into(),
                endpoint.as_str().into(),
                Utc::now().to_rfc3339().into(),
            ])
            .on_conflict(
                OnConflict::columns([Subscriptions::MessageType, Subscriptions::Endpoint])
                    .do_nothing()
                    .to_owned(),
            )
            .build(SqliteQueryBuilder);

        self.gateway
            .execute(&named(sql, values, &["message_type", "endpoint", "created_at"]))
            .await
    }

    /// Whether a subscription row exists for the pair. Never mutates.
    pub async fn exists(
        &self,
        message_type: &MessageType,
        endpoint: &EndpointAddress,
    ) -> Result<bool> {
        let (sql, values) = Query::select()
            .expr(Expr::col(Subscriptions::MessageType).count())
            .from(Subscriptions::Table)
            .and_where(Expr::col(Subscriptions::MessageType).eq(message_type.as_str()))
            .and_where(Expr::col(Subscriptions::Endpoint).eq(endpoint.as_str()))
            .build(SqliteQueryBuilder);

        let count = self
            .gateway
            .execute_scalar(&named(sql, values, &["message_type", "endpoint"]))
            .await?;
        Ok(count > 0)
    }

    /// All endpoints subscribed to a message type, ordered ascending.
    pub async fn subscribers(&self, message_type: &MessageType) -> Result<Vec<EndpointAddress>> {
        let (sql, values) = Query::select()
            .column(Subscriptions::Endpoint)
            .from(Subscriptions::Table)
            .and_where(Expr::col(Subscriptions::MessageType).eq(message_type.as_str()))
            .order_by(Subscriptions::Endpoint, Order::Asc)
            .build(SqliteQueryBuilder);

        let rows = self
            .gateway
            .execute_tabular(&named(sql, values, &["message_type"]))
            .await?;

        rows.iter()
            .map(|row| {
                row.get("endpoint")
                    .map(EndpointAddress::new)
                    .ok_or_else(|| {
                        StoreError::MalformedResult("endpoint column missing".to_string())
                    })
            })
            .collect()
    }
}

/// Attach bind names to a sea-query build result.
///
/// Placeholder order in the generated SQL matches the order of `names`.
fn named(sql: String, values: Values, names: &[&'static str]) -> StoreQuery {
    let mut query = StoreQuery::new(sql);
    for (name, value) in names.iter().copied().zip(values.0) {
        query = query.bind(name, bind_text(value));
    }
    query
}

// Subscription queries bind text values only.
fn bind_text(value: Value) -> String {
    match value {
        Value::String(Some(text)) => *text,
        other => format!("{other:?}"),
    }
}
