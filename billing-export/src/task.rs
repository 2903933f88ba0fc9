//! The one-shot export sequence: ensure the destination dataset, apply the
//! hourly refresh guard, append the current USD→EUR rate, and rebuild the
//! billing snapshot from the configured source table.

use anyhow::Context;
use bq_client::{QueryParameter, QueryRequest, TableId, WarehouseError, WriteDisposition};
use time::{OffsetDateTime, UtcOffset};

use crate::{config::AppConfig, rates::RatesClient, warehouse::Warehouse};

/// Destination dataset and tables are a fixed contract with the reporting
/// layer; only the source billing table comes from configuration.
pub const DATASET_ID: &str = "some_data_monitoring";
pub const DATASET_LOCATION: &str = "EU";
pub const BILLING_TABLE: &str = "billing";
pub const RATES_TABLE: &str = "dollar2euro";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// The snapshot was already rebuilt in the current UTC hour; nothing was
    /// written. Still a successful run for the orchestrator.
    SkippedWithinHour,
}

pub struct ExportTask<W> {
    warehouse: W,
    rates: RatesClient,
    config: AppConfig,
}

impl<W: Warehouse> ExportTask<W> {
    pub fn new(warehouse: W, rates: RatesClient, config: AppConfig) -> Self {
        Self {
            warehouse,
            rates,
            config,
        }
    }

    pub async fn run(&self) -> anyhow::Result<RunOutcome> {
        self.ensure_dataset().await?;

        let now = OffsetDateTime::now_utc();
        if self.refreshed_within_hour(now).await? {
            tracing::info!(table = BILLING_TABLE, "waiting for the next hour");
            return Ok(RunOutcome::SkippedWithinHour);
        }

        let rate = self
            .rates
            .usd_to_eur()
            .await
            .context("fetching USD->EUR exchange rate")?;
        self.append_conversion_row(rate).await?;
        self.refresh_billing_snapshot().await?;

        Ok(RunOutcome::Completed)
    }

    async fn ensure_dataset(&self) -> anyhow::Result<()> {
        if self
            .warehouse
            .dataset_exists(DATASET_ID)
            .await
            .context("checking destination dataset")?
        {
            return Ok(());
        }
        tracing::info!(dataset = DATASET_ID, "destination dataset missing, creating");
        match self.warehouse.create_dataset(DATASET_ID, DATASET_LOCATION).await {
            Ok(()) => Ok(()),
            // Another instance can win the creation race; the dataset exists
            // either way.
            Err(WarehouseError::Conflict(_)) => {
                tracing::info!(dataset = DATASET_ID, "dataset created concurrently");
                Ok(())
            }
            Err(e) => Err(e).context("creating destination dataset"),
        }
    }

    /// Hourly idempotency guard. An absent table means "proceed"; any other
    /// metadata failure propagates.
    async fn refreshed_within_hour(&self, now: OffsetDateTime) -> anyhow::Result<bool> {
        let modified = self
            .warehouse
            .table_last_modified(DATASET_ID, BILLING_TABLE)
            .await
            .context("fetching billing table metadata")?;
        Ok(match modified {
            Some(ts) => same_utc_hour(ts, now),
            None => false,
        })
    }

    async fn append_conversion_row(&self, rate: f64) -> anyhow::Result<()> {
        let request = QueryRequest {
            sql: "SELECT CURRENT_TIMESTAMP() AS timestamp, @rate AS dollar2euro".to_string(),
            params: vec![QueryParameter::float64("rate", rate)],
            destination: TableId::new(DATASET_ID, RATES_TABLE),
            write: WriteDisposition::Append,
            location: DATASET_LOCATION.to_string(),
        };
        self.warehouse
            .run_query(&request)
            .await
            .context("appending conversion rate row")?;
        tracing::info!(rate, table = RATES_TABLE, "conversion rate appended");
        Ok(())
    }

    async fn refresh_billing_snapshot(&self) -> anyhow::Result<()> {
        let request = QueryRequest {
            sql: self.snapshot_sql(),
            params: Vec::new(),
            destination: TableId::new(DATASET_ID, BILLING_TABLE),
            write: WriteDisposition::Truncate,
            location: DATASET_LOCATION.to_string(),
        };
        self.warehouse
            .run_query(&request)
            .await
            .context("rebuilding billing snapshot")?;
        tracing::info!(table = BILLING_TABLE, "billing snapshot rebuilt");
        Ok(())
    }

    fn snapshot_sql(&self) -> String {
        let gc = &self.config.google_cloud;
        // Identifier charset is enforced at config load.
        format!(
            "SELECT \
                service.description AS service, \
                sku.description AS sku, \
                DATE(usage_start_time) AS date, \
                ROUND(cost, 2) AS cost, \
                ROUND((SELECT SUM(amount) FROM UNNEST(credits)), 2) AS credit \
             FROM `{}.{}.{}`",
            gc.project, gc.billing.dataset, gc.billing.table
        )
    }
}

/// Hour-granularity comparison in UTC. Explicit truncation rather than a
/// comparison of rendered timestamp prefixes.
pub fn same_utc_hour(a: OffsetDateTime, b: OffsetDateTime) -> bool {
    let a = a.to_offset(UtcOffset::UTC);
    let b = b.to_offset(UtcOffset::UTC);
    a.date() == b.date() && a.hour() == b.hour()
}
