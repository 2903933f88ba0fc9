use anyhow::Context;
use billing_export::{
    config::AppConfig,
    observability,
    rates::{self, RatesClient},
    task::ExportTask,
    RunOutcome,
};
use bq_client::{auth, BigQueryClient};
use clap::Parser;
use std::path::PathBuf;

/// Environment variable holding the service account key JSON, injected by
/// the orchestrator from a mounted secret.
const CREDENTIALS_ENV: &str = "GCP_SA";

#[derive(Debug, Parser)]
#[command(
    name = "billing-export",
    about = "Cloud billing export (BigQuery) --> reporting warehouse"
)]
struct Cli {
    /// Absolute or relative path to the configuration file.
    #[arg(long, default_value = "/conf/billing-export.yaml")]
    conf: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init_tracing();

    let cli = Cli::parse();
    let cfg = AppConfig::load(&cli.conf)?;

    let key = auth::ServiceAccountKey::from_env(CREDENTIALS_ENV)?;
    let http = reqwest::Client::new();
    let token = auth::fetch_access_token(&http, &key, auth::BIGQUERY_SCOPE)
        .await
        .context("obtaining warehouse access token")?;

    let warehouse = BigQueryClient::new(
        http.clone(),
        bq_client::DEFAULT_BASE_URL,
        cfg.google_cloud.project.clone(),
        token.access_token,
    );
    let rates = RatesClient::new(http, rates::DEFAULT_ENDPOINT);

    let task = ExportTask::new(warehouse, rates, cfg);
    match task.run().await? {
        RunOutcome::Completed => tracing::info!("upload to BigQuery OK"),
        RunOutcome::SkippedWithinHour => {}
    }

    Ok(())
}
