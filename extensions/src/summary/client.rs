use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use url::{Url, form_urlencoded};

use super::error::SummaryError;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";
pub const SUMMARY_ENDPOINT: &str = "generate_summary";
pub const DEFAULT_MODEL: &str = "default";

/// Body of a successful summary response. Extra fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct SummaryResponse {
    pub summary: String,
}

/// Where and how to ask the backend for summaries.
#[derive(Clone, Debug)]
pub struct SummaryConfig {
    pub(crate) base_url: Url,
    pub(crate) model: String,
    /// `None` lets a request wait as long as the backend takes.
    pub(crate) timeout: Option<Duration>,
}

impl SummaryConfig {
    /// Targets the local backend with the `default` model and no request timeout.
    pub fn new() -> Result<Self, SummaryError> {
        let base_url = Url::parse(DEFAULT_BASE_URL).map_err(|e| {
            SummaryError::InvalidUrl(format!("Failed to parse default base URL: {e}"))
        })?;
        Ok(Self {
            base_url,
            model: DEFAULT_MODEL.to_string(),
            timeout: None,
        })
    }

    pub fn base_url(mut self, url: &str) -> Result<Self, SummaryError> {
        let parsed = Url::parse(url)
            .map_err(|e| SummaryError::InvalidUrl(format!("Invalid base URL '{url}': {e}")))?;
        if parsed.cannot_be_a_base() {
            return Err(SummaryError::InvalidUrl(format!("'{url}' cannot be used as a base URL")));
        }
        self.base_url = parsed;
        Ok(self)
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base(&self) -> &Url {
        &self.base_url
    }
}

/// HTTP client for the backend's `generate_summary` endpoint.
#[derive(Clone, Debug)]
pub struct SummaryClient {
    config: SummaryConfig,
    http_client: Client,
}

impl SummaryClient {
    /// Builds a default reqwest client if one is not provided.
    #[instrument(name = "summary_client_new", skip(config, client_override))]
    pub fn new(config: SummaryConfig, client_override: Option<Client>) -> Result<Self, SummaryError> {
        let http_client = match client_override {
            Some(client) => client,
            None => {
                let mut builder = Client::builder();
                if let Some(timeout) = config.timeout {
                    builder = builder.timeout(timeout);
                }
                builder.build().map_err(SummaryError::HttpClient)?
            }
        };
        debug!(base_url = %config.base_url, model = %config.model, "Summary client initialized");
        Ok(Self { config, http_client })
    }

    pub fn config(&self) -> &SummaryConfig {
        &self.config
    }

    /// `<base>/generate_summary?keyword=<keyword>&model=<model>`, with the
    /// keyword percent-encoded.
    pub fn summary_url(&self, keyword: &str) -> Result<Url, SummaryError> {
        let mut url = self.config.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SummaryError::InvalidUrl("Base URL cannot take path segments".to_string()))?
            .pop_if_empty()
            .push(SUMMARY_ENDPOINT);
        let query = format!(
            "keyword={}&model={}",
            encode_component(keyword),
            encode_component(&self.config.model)
        );
        url.set_query(Some(&query));
        Ok(url)
    }

    /// Asks the backend to summarize `keyword`.
    ///
    /// Only a 200 response whose JSON body has a string `summary` field counts
    /// as success. No retries.
    #[instrument(skip(self), fields(model = %self.config.model))]
    pub async fn fetch_summary(&self, keyword: &str) -> Result<String, SummaryError> {
        let url = self.summary_url(keyword)?;
        debug!(target: "quicknote::summary", url = %url, "Requesting summary");

        let response = self.http_client.get(url).send().await.map_err(|e| {
            warn!(target: "quicknote::summary", error = %e, "Summary request failed");
            SummaryError::Unreachable(e)
        })?;

        let status = response.status();
        if status != StatusCode::OK {
            warn!(target: "quicknote::summary", %status, "Summary backend returned an error status");
            return Err(SummaryError::Status { status });
        }

        let body = response.bytes().await.map_err(SummaryError::Unreachable)?;
        let parsed: SummaryResponse = serde_json::from_slice(&body).map_err(|e| {
            warn!(target: "quicknote::summary", error = %e, "Summary body could not be parsed");
            SummaryError::MalformedBody(e)
        })?;

        debug!(target: "quicknote::summary", chars = parsed.summary.chars().count(), "Summary received");
        Ok(parsed.summary)
    }
}

/// Percent-encodes a query value the way browsers encode a URI component:
/// a space becomes `%20`, not `+`.
fn encode_component(value: &str) -> String {
    // byte_serialize escapes a literal '+' as %2B, so every '+' left is a space
    form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
