//! Alert repository for database operations.

use std::time::Instant;

use async_trait::async_trait;
use metrics::histogram;
use sqlx::PgPool;
use tracing::error;

use domain::models::alert::AlertRecord;
use domain::services::alert_store::{AlertQuery, AlertStore, AlertStoreUnavailable};

use crate::entities::AlertEntity;

/// Repository for alert database operations. Implements the domain's
/// [`AlertStore`], mapping every database failure to `Unavailable` so
/// the pipeline degrades instead of propagating driver errors.
#[derive(Clone)]
pub struct AlertRepository {
    pool: PgPool,
}

impl AlertRepository {
    /// Create a new repository instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn record_duration(query_name: &'static str, started: Instant) {
        histogram!("database_query_duration_seconds", "query" => query_name)
            .record(started.elapsed().as_secs_f64());
    }
}

#[async_trait]
impl AlertStore for AlertRepository {
    async fn append(&self, alert: &AlertRecord) -> Result<(), AlertStoreUnavailable> {
        let started = Instant::now();
        let result = sqlx::query(
            r#"
            INSERT INTO alerts (tenant_id, device_id, device_name, address, state, severity, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(alert.tenant_id)
        .bind(alert.device_id)
        .bind(&alert.device_name)
        .bind(&alert.address)
        .bind(alert.state.to_string())
        .bind(alert.severity.to_string())
        .bind(alert.timestamp)
        .execute(&self.pool)
        .await;
        Self::record_duration("insert_alert", started);

        result
            .map(|_| ())
            .map_err(|err| AlertStoreUnavailable(err.to_string()))
    }

    async fn query(&self, query: AlertQuery) -> Result<Vec<AlertRecord>, AlertStoreUnavailable> {
        // All three filters are optional; parameter positions are fixed
        // and NULL short-circuits the comparison.
        let started = Instant::now();
        let rows = sqlx::query_as::<_, AlertEntity>(
            r#"
            SELECT id, tenant_id, device_id, device_name, address, state, severity, timestamp
            FROM alerts
            WHERE ($1::uuid IS NULL OR tenant_id = $1)
              AND ($2::timestamptz IS NULL OR timestamp >= $2)
              AND ($3::timestamptz IS NULL OR timestamp <= $3)
            ORDER BY timestamp DESC
            "#,
        )
        .bind(query.tenant_id)
        .bind(query.from)
        .bind(query.to)
        .fetch_all(&self.pool)
        .await
        .map_err(|err| AlertStoreUnavailable(err.to_string()))?;
        Self::record_duration("query_alerts", started);

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            match row.into_record() {
                Ok(record) => records.push(record),
                Err(reason) => {
                    // Skip rather than fail the whole page on one bad row.
                    error!(%reason, "dropping unreadable alert row");
                }
            }
        }
        Ok(records)
    }
}
