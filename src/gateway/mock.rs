//! Mock store gateway for testing.
//!
//! Keeps the subscription relation in memory and interprets the small
//! set of query shapes the registry issues. Failures can be injected to
//! exercise the bootstrap race and the no-retry propagation policy.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{QueryGateway, Result, StoreError, StoreQuery, TabularRow};

/// Injectable outcome for the schema creation statement.
#[derive(Debug, Clone, Copy)]
pub enum CreateFailure {
    /// The benign duplicate-object race: another bootstrapper won.
    AlreadyExists,
    /// Any other creation failure; must abort construction.
    Fatal,
}

/// Mock gateway backed by an in-memory subscription relation.
#[derive(Default)]
pub struct MockQueryGateway {
    schema_created: RwLock<bool>,
    rows: RwLock<Vec<(String, String)>>,
    executed: RwLock<Vec<StoreQuery>>,
    fetch_counts: RwLock<HashMap<String, u32>>,
    fetch_delay: RwLock<Option<Duration>>,
    create_failure: RwLock<Option<CreateFailure>>,
    insert_failure: RwLock<bool>,
}

impl MockQueryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// A gateway whose schema already exists.
    pub fn with_schema() -> Self {
        Self {
            schema_created: RwLock::new(true),
            ..Self::default()
        }
    }

    /// Fail the next schema creation statement.
    pub async fn set_create_failure(&self, failure: CreateFailure) {
        *self.create_failure.write().await = Some(failure);
    }

    /// Fail every insert statement.
    pub async fn set_insert_failure(&self, fail: bool) {
        *self.insert_failure.write().await = fail;
    }

    /// Delay subscriber fetches, widening the race window in tests.
    pub async fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.write().await = Some(delay);
    }

    /// Seed a subscription row directly, bypassing the query path.
    pub async fn insert_row(&self, message_type: &str, endpoint: &str) {
        self.rows
            .write()
            .await
            .push((message_type.to_string(), endpoint.to_string()));
    }

    /// All persisted rows, in insertion order.
    pub async fn rows(&self) -> Vec<(String, String)> {
        self.rows.read().await.clone()
    }

    /// SQL text of every statement executed, in order.
    pub async fn executed_sql(&self) -> Vec<String> {
        self.executed
            .read()
            .await
            .iter()
            .map(|q| q.sql().to_string())
            .collect()
    }

    /// How many subscriber fetches were issued for a message type.
    pub async fn fetch_count(&self, message_type: &str) -> u32 {
        self.fetch_counts
            .read()
            .await
            .get(message_type)
            .copied()
            .unwrap_or(0)
    }

    async fn record(&self, query: &StoreQuery) {
        self.executed.write().await.push(query.clone());
    }

    fn required_bind<'q>(query: &'q StoreQuery, name: &str) -> Result<&'q str> {
        query
            .bind_value(name)
            .ok_or_else(|| StoreError::MalformedResult(format!("missing bind value: {name}")))
    }
}

#[async_trait]
impl QueryGateway for MockQueryGateway {
    async fn execute_scalar(&self, query: &StoreQuery) -> Result<i64> {
        self.record(query).await;

        // Catalog probe from the bootstrapper.
        if query.sql().contains("sqlite_master") {
            return Ok(i64::from(*self.schema_created.read().await));
        }

        let message_type = Self::required_bind(query, "message_type")?;
        let endpoint = query.bind_value("endpoint");
        let rows = self.rows.read().await;
        let count = rows
            .iter()
            .filter(|(mt, ep)| {
                mt == message_type && endpoint.map(|wanted| ep == wanted).unwrap_or(true)
            })
            .count();
        Ok(count as i64)
    }

    async fn execute(&self, query: &StoreQuery) -> Result<()> {
        self.record(query).await;

        if query.sql().starts_with("CREATE TABLE") {
            if let Some(failure) = self.create_failure.write().await.take() {
                return Err(match failure {
                    CreateFailure::AlreadyExists => {
                        StoreError::AlreadyExists("table subscriptions already exists".to_string())
                    }
                    CreateFailure::Fatal => StoreError::Database("disk I/O error".to_string()),
                });
            }
            let mut created = self.schema_created.write().await;
            if *created {
                return Err(StoreError::AlreadyExists(
                    "table subscriptions already exists".to_string(),
                ));
            }
            *created = true;
            return Ok(());
        }

        if query.sql().contains("INSERT") {
            if *self.insert_failure.read().await {
                return Err(StoreError::Database("injected insert failure".to_string()));
            }
            let message_type = Self::required_bind(query, "message_type")?.to_string();
            let endpoint = Self::required_bind(query, "endpoint")?.to_string();
            let mut rows = self.rows.write().await;
            // Primary key on the pair: conflicting inserts are no-ops.
            if !rows.iter().any(|(mt, ep)| *mt == message_type && *ep == endpoint) {
                rows.push((message_type, endpoint));
            }
            return Ok(());
        }

        Err(StoreError::Database(format!(
            "unrecognized statement: {}",
            query.sql()
        )))
    }

    async fn execute_tabular(&self, query: &StoreQuery) -> Result<Vec<TabularRow>> {
        self.record(query).await;

        let message_type = Self::required_bind(query, "message_type")?;
        {
            let mut counts = self.fetch_counts.write().await;
            *counts.entry(message_type.to_string()).or_insert(0) += 1;
        }

        let delay = *self.fetch_delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let rows = self.rows.read().await;
        let mut endpoints: Vec<&String> = rows
            .iter()
            .filter(|(mt, _)| mt == message_type)
            .map(|(_, ep)| ep)
            .collect();
        endpoints.sort();

        Ok(endpoints
            .into_iter()
            .map(|ep| TabularRow::from_columns(vec![("endpoint".to_string(), ep.clone())]))
            .collect())
    }
}
