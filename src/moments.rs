use log::debug;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::{collections::HashMap, future::Future, time::Duration};
use url::Url;

use crate::config::PollerOptions;
use crate::error::Error;

/// The latest moment of one region.
#[derive(Debug, Clone, Deserialize)]
pub struct RegionMoment {
    pub id: String,
    pub ts: i64,
    pub utc: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerTime {
    pub ts: i64,
    pub utc: String,
}

/// Body of `GET /v1/moments/latest`.
#[derive(Debug, Clone, Deserialize)]
pub struct LatestMoments {
    pub regions: HashMap<String, RegionMoment>,
    pub now: ServerTime,
}

/// Returns the moment id published for `region`.
///
/// # Errors
///
/// Returns [`Error::RegionNotFound`] if the region is absent and
/// [`Error::EmptyMomentId`] if its id is empty.
pub fn region_moment_id<'a>(moments: &'a LatestMoments, region: &str) -> Result<&'a str, Error> {
    let moment = moments
        .regions
        .get(region)
        .ok_or_else(|| Error::RegionNotFound(region.to_string()))?;

    if moment.id.is_empty() {
        return Err(Error::EmptyMomentId(region.to_string()));
    }

    Ok(&moment.id)
}

/// Anything able to report the current moment id of the tracked region.
pub trait MomentSource {
    fn latest_id(&self) -> impl Future<Output = Result<String, Error>> + Send;
}

/// HTTP client for the moments API, bound to one key and one region.
#[derive(Debug, Clone)]
pub struct MomentsClient {
    client: Client,
    endpoint: Url,
    region: String,
}

impl MomentsClient {
    /// # Errors
    ///
    /// Returns an error if the API key is empty, the endpoint is not a valid
    /// URL, or the HTTP client cannot be built.
    pub fn new(
        endpoint: &str,
        api_key: &str,
        region: &str,
        timeout: Duration,
    ) -> Result<Self, Error> {
        if api_key.trim().is_empty() {
            return Err(Error::Config("API key must not be empty".to_string()));
        }

        let endpoint = Url::parse_with_params(endpoint, &[("api_key", api_key)])?;
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint,
            region: region.to_string(),
        })
    }

    /// # Errors
    ///
    /// See [`MomentsClient::new`].
    pub fn from_options(options: &PollerOptions, api_key: &str) -> Result<Self, Error> {
        Self::new(
            &options.endpoint,
            api_key,
            &options.region,
            options.timeout(),
        )
    }

    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Fetches one snapshot of the latest moments.
    ///
    /// # Errors
    ///
    /// Fails on transport errors, any status other than `200 OK`, an
    /// unreadable body, or a body that does not match [`LatestMoments`].
    pub async fn fetch_latest(&self) -> Result<LatestMoments, Error> {
        // The query string carries the API key, keep it out of error messages.
        let response = self
            .client
            .get(self.endpoint.clone())
            .send()
            .await
            .map_err(|e| Error::HttpRequest(e.without_url()))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::HttpStatus { status, body });
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::BodyRead(e.without_url()))?;
        debug!("Received {} bytes from moments API", body.len());

        Ok(serde_json::from_str(&body)?)
    }
}

impl MomentSource for MomentsClient {
    async fn latest_id(&self) -> Result<String, Error> {
        let moments = self.fetch_latest().await?;
        region_moment_id(&moments, &self.region).map(str::to_string)
    }
}
