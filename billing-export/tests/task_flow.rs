//! End-to-end task runs against a mock server standing in for both the
//! exchange-rate API and the BigQuery REST API.

use billing_export::{config::AppConfig, rates::RatesClient, task::ExportTask, RunOutcome};
use bq_client::BigQueryClient;
use mockito::Matcher;
use serde_json::json;
use time::OffsetDateTime;

fn config() -> AppConfig {
    serde_yaml::from_str(
        "\
google_cloud:
  project: test-project
  billing:
    dataset: billing_src
    table: gcp_billing_export_v1
",
    )
    .unwrap()
}

fn task_against(server: &mockito::ServerGuard) -> ExportTask<BigQueryClient> {
    let http = reqwest::Client::new();
    let warehouse = BigQueryClient::new(http.clone(), server.url(), "test-project", "test-token");
    let rates = RatesClient::new(http, format!("{}/v4/latest/USD", server.url()));
    ExportTask::new(warehouse, rates, config())
}

fn done_job(job_id: &str) -> String {
    json!({
        "jobReference": { "projectId": "test-project", "jobId": job_id },
        "status": { "state": "DONE" },
    })
    .to_string()
}

#[tokio::test]
async fn full_run_appends_rate_and_rebuilds_snapshot() {
    let mut server = mockito::Server::new_async().await;

    let dataset = server
        .mock("GET", "/projects/test-project/datasets/some_data_monitoring")
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;
    let table_meta = server
        .mock(
            "GET",
            "/projects/test-project/datasets/some_data_monitoring/tables/billing",
        )
        .with_status(404)
        .with_body(r#"{"error": {"message": "Not found"}}"#)
        .create_async()
        .await;
    let rates = server
        .mock("GET", "/v4/latest/USD")
        .with_status(200)
        .with_body(r#"{"base": "USD", "rates": {"EUR": 0.92}}"#)
        .create_async()
        .await;
    let append = server
        .mock("POST", "/projects/test-project/jobs")
        .match_body(Matcher::PartialJson(json!({
            "configuration": { "query": {
                "writeDisposition": "WRITE_APPEND",
                "destinationTable": {
                    "projectId": "test-project",
                    "datasetId": "some_data_monitoring",
                    "tableId": "dollar2euro",
                },
                "queryParameters": [{
                    "name": "rate",
                    "parameterValue": { "value": "0.92" },
                }],
            }},
        })))
        .with_status(200)
        .with_body(done_job("job-append"))
        .expect(1)
        .create_async()
        .await;
    let truncate = server
        .mock("POST", "/projects/test-project/jobs")
        .match_body(Matcher::PartialJson(json!({
            "configuration": { "query": {
                "writeDisposition": "WRITE_TRUNCATE",
                "destinationTable": {
                    "projectId": "test-project",
                    "datasetId": "some_data_monitoring",
                    "tableId": "billing",
                },
            }},
        })))
        .with_status(200)
        .with_body(done_job("job-truncate"))
        .expect(1)
        .create_async()
        .await;

    let outcome = task_against(&server).run().await.unwrap();
    assert_eq!(outcome, RunOutcome::Completed);

    dataset.assert_async().await;
    table_meta.assert_async().await;
    rates.assert_async().await;
    append.assert_async().await;
    truncate.assert_async().await;
}

#[tokio::test]
async fn rerun_within_the_hour_issues_no_jobs_and_no_rate_fetch() {
    let mut server = mockito::Server::new_async().await;

    server
        .mock("GET", "/projects/test-project/datasets/some_data_monitoring")
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;
    let now_millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    server
        .mock(
            "GET",
            "/projects/test-project/datasets/some_data_monitoring/tables/billing",
        )
        .with_status(200)
        .with_body(json!({ "lastModifiedTime": now_millis.to_string() }).to_string())
        .create_async()
        .await;
    let rates = server
        .mock("GET", "/v4/latest/USD")
        .expect(0)
        .create_async()
        .await;
    let jobs = server
        .mock("POST", "/projects/test-project/jobs")
        .expect(0)
        .create_async()
        .await;

    let outcome = task_against(&server).run().await.unwrap();
    assert_eq!(outcome, RunOutcome::SkippedWithinHour);

    rates.assert_async().await;
    jobs.assert_async().await;
}

#[tokio::test]
async fn dataset_is_created_when_absent_and_conflict_is_tolerated() {
    let mut server = mockito::Server::new_async().await;

    server
        .mock("GET", "/projects/test-project/datasets/some_data_monitoring")
        .with_status(404)
        .with_body(r#"{"error": {"message": "Not found"}}"#)
        .create_async()
        .await;
    // A concurrent instance won the creation race.
    let create = server
        .mock("POST", "/projects/test-project/datasets")
        .match_body(Matcher::PartialJson(json!({
            "datasetReference": {
                "projectId": "test-project",
                "datasetId": "some_data_monitoring",
            },
            "location": "EU",
        })))
        .with_status(409)
        .with_body(r#"{"error": {"message": "Already Exists"}}"#)
        .expect(1)
        .create_async()
        .await;
    server
        .mock(
            "GET",
            "/projects/test-project/datasets/some_data_monitoring/tables/billing",
        )
        .with_status(404)
        .with_body(r#"{"error": {"message": "Not found"}}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/v4/latest/USD")
        .with_status(200)
        .with_body(r#"{"rates": {"EUR": 0.92}}"#)
        .create_async()
        .await;
    server
        .mock("POST", "/projects/test-project/jobs")
        .with_status(200)
        .with_body(done_job("job-any"))
        .expect(2)
        .create_async()
        .await;

    let outcome = task_against(&server).run().await.unwrap();
    assert_eq!(outcome, RunOutcome::Completed);
    create.assert_async().await;
}
