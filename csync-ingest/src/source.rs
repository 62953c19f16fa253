//! Source reader
//!
//! Reads whole collections from the hosted backend's REST interface:
//! `GET <base>/<collection>?select=*`, authenticated with the service token
//! as both bearer credential and `apikey` header. The response body is a JSON
//! array of row objects.
//!
//! There is no retry here. A failed fetch surfaces as [`FetchError`] and the
//! pipeline continues with zero records for that collection.

use crate::error::{FetchError, SetupError};
use async_trait::async_trait;
use csync_common::config::SourceConfig;
use csync_common::Record;
use reqwest::{header, Client};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

/// Longest error body kept in a [`FetchError::Status`]
pub const MAX_ERROR_BODY: usize = 512;

/// Anything that can hand over a full collection of records
#[async_trait]
pub trait CollectionSource: Send + Sync {
    /// Fetch every record of `name`, preserving source order
    async fn fetch_collection(&self, name: &str) -> Result<Vec<Record>, FetchError>;
}

/// HTTP reader for a PostgREST-style backend
pub struct RestSource {
    http_client: Client,
    base_url: String,
}

impl RestSource {
    /// Build the client and verify the backend answers at all
    ///
    /// Any HTTP status on the probe counts as reachable; only transport
    /// failures (DNS, refused connection, TLS, timeout) are fatal.
    pub async fn connect(config: &SourceConfig) -> Result<Self, SetupError> {
        let source = Self::new(config)?;

        debug!(url = %source.base_url, "Probing source");
        match source.http_client.get(&source.base_url).send().await {
            Ok(response) => {
                info!(
                    "Source reachable at {} (probe status {})",
                    source.base_url,
                    response.status()
                );
                Ok(source)
            }
            Err(e) => Err(SetupError::SourceUnreachable {
                url: source.base_url.clone(),
                message: e.to_string(),
            }),
        }
    }

    /// Build the client without probing the backend
    pub fn new(config: &SourceConfig) -> Result<Self, SetupError> {
        let mut headers = header::HeaderMap::new();
        let mut bearer = header::HeaderValue::from_str(&format!("Bearer {}", config.access_token))
            .map_err(|e| invalid_token(e.to_string()))?;
        bearer.set_sensitive(true);
        let mut apikey = header::HeaderValue::from_str(&config.access_token)
            .map_err(|e| invalid_token(e.to_string()))?;
        apikey.set_sensitive(true);

        headers.insert(header::AUTHORIZATION, bearer);
        headers.insert("apikey", apikey);
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| SetupError::SourceUnreachable {
                url: config.base_url.clone(),
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Full-collection URL for `name`
    pub fn collection_url(&self, name: &str) -> String {
        format!("{}/{}?select=*", self.base_url, name)
    }
}

#[async_trait]
impl CollectionSource for RestSource {
    async fn fetch_collection(&self, name: &str) -> Result<Vec<Record>, FetchError> {
        let url = self.collection_url(name);
        debug!(url = %url, "Fetching collection");

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Transport {
                collection: name.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                collection: name.to_string(),
                status: status.as_u16(),
                body: truncate_body(body),
            });
        }

        let rows: Vec<Value> = response.json().await.map_err(|e| FetchError::Decode {
            collection: name.to_string(),
            message: e.to_string(),
        })?;

        let records = rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| {
                Record::from_value(row).map_err(|e| FetchError::Decode {
                    collection: name.to_string(),
                    message: format!("row {}: {}", i, e),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        info!("Extracted {} rows from '{}'", records.len(), name);
        Ok(records)
    }
}

/// Cut `body` to at most [`MAX_ERROR_BODY`] bytes on a char boundary
fn truncate_body(mut body: String) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body;
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body.truncate(end);
    body.push_str("...");
    body
}

fn invalid_token(message: String) -> SetupError {
    SetupError::Config(csync_common::Error::Config(format!(
        "access token is not a valid header value: {}",
        message
    )))
}
