use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

pub const DEFAULT_ENDPOINT: &str = "https://api.exchangerate-api.com/v4/latest/USD";

const EUR: &str = "EUR";

#[derive(Debug, Error)]
pub enum RatesError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("exchange rate api returned http {0}")]
    Status(u16),
    #[error("exchange rate response has no {0} rate")]
    MissingRate(&'static str),
}

#[derive(Debug, Deserialize)]
struct RatesResponse {
    rates: HashMap<String, f64>,
}

#[derive(Clone)]
pub struct RatesClient {
    http: reqwest::Client,
    endpoint: String,
}

impl RatesClient {
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }

    /// Current USD→EUR rate. A response without the EUR entry is an error,
    /// never a defaulted value.
    pub async fn usd_to_eur(&self) -> Result<f64, RatesError> {
        let resp = self.http.get(&self.endpoint).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(RatesError::Status(status.as_u16()));
        }
        let body: RatesResponse = resp.json().await?;
        eur_rate(&body)
    }
}

fn eur_rate(body: &RatesResponse) -> Result<f64, RatesError> {
    body.rates.get(EUR).copied().ok_or(RatesError::MissingRate(EUR))
}
