//! Minimal BigQuery v2 REST client covering the calls the export task
//! needs: dataset get/insert, table metadata, and query jobs materializing
//! into a destination table.

use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use time::OffsetDateTime;

use crate::error::WarehouseError;

pub const DEFAULT_BASE_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";

const JOB_POLL_INTERVAL: Duration = Duration::from_millis(250);
const JOB_STATE_DONE: &str = "DONE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableId {
    pub dataset: String,
    pub table: String,
}

impl TableId {
    pub fn new(dataset: &str, table: &str) -> Self {
        Self {
            dataset: dataset.to_string(),
            table: table.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteDisposition {
    Append,
    Truncate,
}

impl WriteDisposition {
    fn as_api_str(self) -> &'static str {
        match self {
            Self::Append => "WRITE_APPEND",
            Self::Truncate => "WRITE_TRUNCATE",
        }
    }
}

/// Named query parameter. Values travel as typed parameters, never spliced
/// into the SQL text.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParameter {
    pub name: String,
    pub param_type: &'static str,
    pub value: String,
}

impl QueryParameter {
    pub fn float64(name: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            param_type: "FLOAT64",
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub sql: String,
    pub params: Vec<QueryParameter>,
    pub destination: TableId,
    pub write: WriteDisposition,
    pub location: String,
}

pub struct BigQueryClient {
    http: reqwest::Client,
    base_url: String,
    project: String,
    token: String,
}

#[derive(Deserialize)]
struct TableResource {
    #[serde(rename = "lastModifiedTime")]
    last_modified_time: Option<String>,
}

#[derive(Deserialize)]
struct JobResource {
    #[serde(rename = "jobReference")]
    job_reference: JobReference,
    status: JobStatus,
}

#[derive(Deserialize)]
struct JobReference {
    #[serde(rename = "jobId")]
    job_id: String,
}

#[derive(Deserialize)]
struct JobStatus {
    state: String,
    #[serde(rename = "errorResult")]
    error_result: Option<ErrorProto>,
}

#[derive(Deserialize)]
struct ErrorProto {
    message: String,
}

impl BigQueryClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        project: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            project: project.into(),
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/projects/{}{}", self.base_url, self.project, path)
    }

    /// Maps HTTP status onto the typed taxonomy: 404 and 409 are first-class
    /// outcomes, everything else non-2xx is an API error.
    async fn check_status(
        resp: reqwest::Response,
        subject: &str,
    ) -> Result<reqwest::Response, WarehouseError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        match status.as_u16() {
            404 => Err(WarehouseError::NotFound(subject.to_string())),
            409 => Err(WarehouseError::Conflict(subject.to_string())),
            code => Err(WarehouseError::Api {
                status: code,
                message: api_error_message(resp).await,
            }),
        }
    }

    pub async fn dataset_exists(&self, dataset: &str) -> Result<bool, WarehouseError> {
        let resp = self
            .http
            .get(self.url(&format!("/datasets/{dataset}")))
            .bearer_auth(&self.token)
            .send()
            .await?;
        match Self::check_status(resp, dataset).await {
            Ok(_) => Ok(true),
            Err(WarehouseError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn create_dataset(
        &self,
        dataset: &str,
        location: &str,
    ) -> Result<(), WarehouseError> {
        let body = json!({
            "datasetReference": {
                "projectId": self.project,
                "datasetId": dataset,
            },
            "location": location,
        });
        let resp = self
            .http
            .post(self.url("/datasets"))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        Self::check_status(resp, dataset).await?;
        tracing::info!(dataset, location, "dataset created");
        Ok(())
    }

    /// Last-modified instant of a table, `None` when the table does not
    /// exist. The API reports epoch milliseconds as a decimal string.
    pub async fn table_last_modified(
        &self,
        dataset: &str,
        table: &str,
    ) -> Result<Option<OffsetDateTime>, WarehouseError> {
        let resp = self
            .http
            .get(self.url(&format!("/datasets/{dataset}/tables/{table}")))
            .bearer_auth(&self.token)
            .send()
            .await?;
        let resp = match Self::check_status(resp, table).await {
            Ok(resp) => resp,
            Err(WarehouseError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        let resource: TableResource = resp.json().await?;
        let Some(raw) = resource.last_modified_time else {
            return Ok(None);
        };
        let millis: i128 = raw
            .parse()
            .map_err(|_| WarehouseError::Malformed(format!("lastModifiedTime {raw:?}")))?;
        let ts = OffsetDateTime::from_unix_timestamp_nanos(millis * 1_000_000)
            .map_err(|_| WarehouseError::Malformed(format!("lastModifiedTime {raw:?}")))?;
        Ok(Some(ts))
    }

    /// Inserts a query job and blocks until it reaches a terminal state.
    pub async fn run_query(&self, request: &QueryRequest) -> Result<(), WarehouseError> {
        let mut query = json!({
            "query": request.sql,
            "useLegacySql": false,
            "destinationTable": {
                "projectId": self.project,
                "datasetId": request.destination.dataset,
                "tableId": request.destination.table,
            },
            "writeDisposition": request.write.as_api_str(),
            "createDisposition": "CREATE_IF_NEEDED",
        });
        if !request.params.is_empty() {
            let params: Vec<_> = request
                .params
                .iter()
                .map(|p| {
                    json!({
                        "name": p.name,
                        "parameterType": { "type": p.param_type },
                        "parameterValue": { "value": p.value },
                    })
                })
                .collect();
            query["parameterMode"] = json!("NAMED");
            query["queryParameters"] = json!(params);
        }
        let body = json!({
            "configuration": { "query": query },
            "jobReference": {
                "projectId": self.project,
                "location": request.location,
            },
        });

        let resp = self
            .http
            .post(self.url("/jobs"))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        let resp = Self::check_status(resp, &request.destination.table).await?;
        let mut job: JobResource = resp.json().await?;

        while job.status.state != JOB_STATE_DONE {
            tokio::time::sleep(JOB_POLL_INTERVAL).await;
            let resp = self
                .http
                .get(self.url(&format!("/jobs/{}", job.job_reference.job_id)))
                .query(&[("location", request.location.as_str())])
                .bearer_auth(&self.token)
                .send()
                .await?;
            let resp = Self::check_status(resp, &job.job_reference.job_id).await?;
            job = resp.json().await?;
        }

        if let Some(err) = job.status.error_result {
            return Err(WarehouseError::JobFailed {
                job_id: job.job_reference.job_id,
                message: err.message,
            });
        }
        tracing::debug!(job_id = %job.job_reference.job_id, "query job completed");
        Ok(())
    }
}

async fn api_error_message(resp: reqwest::Response) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: ErrorDetail,
    }
    #[derive(Deserialize)]
    struct ErrorDetail {
        message: String,
    }
    match resp.json::<ErrorBody>().await {
        Ok(body) => body.error.message,
        Err(_) => "(no error detail)".to_string(),
    }
}
