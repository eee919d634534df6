use std::time::Duration;

use reqwest::{Client, Url};
use yardsale_core::{AppConfig, Marker, MarkersQuery, SalesPage, SalesQuery};
use yardsale_search::{FetchFailure, SalesApi};

use crate::error::ClientError;
use crate::retry::retry_with_backoff;
use crate::types::Envelope;

const API_KEY_HEADER: &str = "apikey";

/// Client for `GET /sales` and `GET /sales/markers`.
///
/// Non-2xx statuses become typed errors; 5xx and transport failures are
/// retried with back-off up to `max_retries` additional attempts.
pub struct SalesClient {
    client: Client,
    sales_url: Url,
    markers_url: Url,
    api_key: Option<String>,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl SalesClient {
    /// # Errors
    ///
    /// See [`SalesClient::with_options`].
    pub fn new(config: &AppConfig) -> Result<Self, ClientError> {
        Self::with_options(
            &config.api_base_url,
            config.api_key.as_deref(),
            config.request_timeout_secs,
            &config.user_agent,
            config.max_retries,
            config.retry_backoff_base_ms,
        )
    }

    /// # Errors
    ///
    /// Returns [`ClientError::Http`] if the `reqwest::Client` cannot be built,
    /// or [`ClientError::InvalidBaseUrl`] if `base_url` does not parse.
    pub fn with_options(
        base_url: &str,
        api_key: Option<&str>,
        timeout_secs: u64,
        user_agent: &str,
        max_retries: u32,
        backoff_base_ms: u64,
    ) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()?;

        // Exactly one trailing slash so `join` appends instead of replacing
        // the last path segment.
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base = Url::parse(&normalised).map_err(|e| invalid_base_url(base_url, &e))?;
        let sales_url = base
            .join("sales")
            .map_err(|e| invalid_base_url(base_url, &e))?;
        let markers_url = base
            .join("sales/markers")
            .map_err(|e| invalid_base_url(base_url, &e))?;

        Ok(Self {
            client,
            sales_url,
            markers_url,
            api_key: api_key.map(str::to_owned),
            max_retries,
            backoff_base_ms,
        })
    }

    /// One page of sales.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Api`] when the API answers `ok: false`.
    /// - [`ClientError::Envelope`] / [`ClientError::Deserialize`] for a
    ///   malformed body (not retried).
    /// - [`ClientError::NotFound`] / [`ClientError::UnexpectedStatus`] for
    ///   non-2xx statuses, after retries for 5xx.
    /// - [`ClientError::Http`] on transport failure after retries.
    pub async fn sales(&self, query: &SalesQuery) -> Result<SalesPage, ClientError> {
        let url = Self::with_pairs(&self.sales_url, &query.to_pairs());
        let envelope = self.get_envelope(&url, "sales").await?;
        let page = envelope.into_sales_page("sales")?;
        tracing::debug!(
            count = page.sales.len(),
            offset = query.offset,
            degraded = page.degraded,
            "fetched sales page"
        );
        Ok(page)
    }

    /// Marker projection for a query.
    ///
    /// # Errors
    ///
    /// Same as [`SalesClient::sales`].
    pub async fn markers(&self, query: &MarkersQuery) -> Result<Vec<Marker>, ClientError> {
        let url = Self::with_pairs(&self.markers_url, &query.to_pairs());
        let envelope = self.get_envelope(&url, "markers").await?;
        let markers = envelope.into_markers("markers")?;
        tracing::debug!(count = markers.len(), "fetched markers");
        Ok(markers)
    }

    fn with_pairs(endpoint: &Url, pairs: &[(&'static str, String)]) -> Url {
        let mut url = endpoint.clone();
        {
            let mut qp = url.query_pairs_mut();
            for (k, v) in pairs {
                qp.append_pair(k, v);
            }
        }
        url
    }

    async fn get_envelope(&self, url: &Url, context: &str) -> Result<Envelope, ClientError> {
        retry_with_backoff(self.max_retries, self.backoff_base_ms, || async move {
            let mut request = self.client.get(url.clone());
            if let Some(key) = &self.api_key {
                request = request.header(API_KEY_HEADER, key);
            }
            let response = request.send().await?;
            let status = response.status();

            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(ClientError::NotFound {
                    url: url.to_string(),
                });
            }
            if !status.is_success() {
                return Err(ClientError::UnexpectedStatus {
                    status: status.as_u16(),
                    url: url.to_string(),
                });
            }

            let body = response.text().await?;
            serde_json::from_str::<Envelope>(&body).map_err(|e| ClientError::Deserialize {
                context: format!("{context} response from {url}"),
                source: e,
            })
        })
        .await
    }
}

fn invalid_base_url(base_url: &str, reason: &dyn std::fmt::Display) -> ClientError {
    ClientError::InvalidBaseUrl {
        base_url: base_url.to_owned(),
        reason: reason.to_string(),
    }
}

impl SalesApi for SalesClient {
    async fn fetch_sales(&self, query: &SalesQuery) -> Result<SalesPage, FetchFailure> {
        self.sales(query).await.map_err(FetchFailure::from)
    }

    async fn fetch_markers(&self, query: &MarkersQuery) -> Result<Vec<Marker>, FetchFailure> {
        self.markers(query).await.map_err(FetchFailure::from)
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
