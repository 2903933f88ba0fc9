use async_trait::async_trait;
use bq_client::{BigQueryClient, QueryRequest, WarehouseError};
use time::OffsetDateTime;

/// Seam between the export task and the wire client so the task logic can be
/// exercised against a recording fake in tests.
#[async_trait]
pub trait Warehouse: Send + Sync {
    async fn dataset_exists(&self, dataset: &str) -> Result<bool, WarehouseError>;

    async fn create_dataset(&self, dataset: &str, location: &str) -> Result<(), WarehouseError>;

    async fn table_last_modified(
        &self,
        dataset: &str,
        table: &str,
    ) -> Result<Option<OffsetDateTime>, WarehouseError>;

    async fn run_query(&self, request: &QueryRequest) -> Result<(), WarehouseError>;
}

#[async_trait]
impl Warehouse for BigQueryClient {
    async fn dataset_exists(&self, dataset: &str) -> Result<bool, WarehouseError> {
        BigQueryClient::dataset_exists(self, dataset).await
    }

    async fn create_dataset(&self, dataset: &str, location: &str) -> Result<(), WarehouseError> {
        BigQueryClient::create_dataset(self, dataset, location).await
    }

    async fn table_last_modified(
        &self,
        dataset: &str,
        table: &str,
    ) -> Result<Option<OffsetDateTime>, WarehouseError> {
        BigQueryClient::table_last_modified(self, dataset, table).await
    }

    async fn run_query(&self, request: &QueryRequest) -> Result<(), WarehouseError> {
        BigQueryClient::run_query(self, request).await
    }
}
