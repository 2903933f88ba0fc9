use anyhow::Context;
use serde::Deserialize;
use std::{fs, path::Path};

#[derive(Debug, Clone, Deserialize)]
pub struct BillingSource {
    pub dataset: String,
    pub table: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleCloud {
    pub project: String,
    pub billing: BillingSource,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub google_cloud: GoogleCloud,
}

impl AppConfig {
    /// Reads and validates the mounted YAML configuration. Any problem here
    /// aborts the run before the first network call.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading configuration file {}", path.display()))?;
        let cfg: AppConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing configuration file {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let gc = &self.google_cloud;
        check_project_id("google_cloud.project", &gc.project)?;
        check_bq_name("google_cloud.billing.dataset", &gc.billing.dataset)?;
        check_bq_name("google_cloud.billing.table", &gc.billing.table)?;
        Ok(())
    }
}

// These names end up inside a backtick-quoted table path in the snapshot
// query, so the accepted charsets are restricted up front. Hyphens are valid
// in project ids only; dataset and table names take [A-Za-z0-9_].
fn check_project_id(field: &str, value: &str) -> anyhow::Result<()> {
    let ok = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        anyhow::bail!("{field} must be non-empty and limited to [A-Za-z0-9_-], got {value:?}")
    }
}

fn check_bq_name(field: &str, value: &str) -> anyhow::Result<()> {
    let ok = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if ok {
        Ok(())
    } else {
        anyhow::bail!("{field} must be non-empty and limited to [A-Za-z0-9_], got {value:?}")
    }
}
