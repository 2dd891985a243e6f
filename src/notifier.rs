use log::debug;
use reqwest::Client;
use serde::Serialize;
use std::{future::Future, time::Duration};
use url::Url;

use crate::config::{LineOptions, non_empty_var};
use crate::error::Error;

const ACCESS_TOKEN_VAR: &str = "LINE_CHANNEL_ACCESS_TOKEN";

/// Delivers a text message to every subscriber of a channel.
pub trait Notifier {
    fn broadcast_text(&self, text: &str) -> impl Future<Output = Result<(), Error>> + Send;
}

#[derive(Serialize)]
struct BroadcastRequest<'a> {
    messages: [TextMessage<'a>; 1],
}

#[derive(Serialize)]
struct TextMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

/// LINE Messaging API client using the broadcast endpoint.
#[derive(Debug, Clone)]
pub struct LineClient {
    client: Client,
    endpoint: Url,
    access_token: String,
}

impl LineClient {
    /// # Errors
    ///
    /// Returns an error if the token is empty, the endpoint is not a valid URL,
    /// or the HTTP client cannot be built.
    pub fn new(endpoint: &str, access_token: String, timeout: Duration) -> Result<Self, Error> {
        if access_token.trim().is_empty() {
            return Err(Error::Config(
                "LINE channel access token must not be empty".to_string(),
            ));
        }

        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            endpoint: Url::parse(endpoint)?,
            access_token,
        })
    }

    /// Builds a client from `LINE_CHANNEL_ACCESS_TOKEN` (environment or `.env`).
    ///
    /// # Errors
    ///
    /// Returns an error if the token is missing or empty, or if `options`
    /// holds an invalid endpoint.
    pub fn from_env(options: &LineOptions) -> Result<Self, Error> {
        let access_token = non_empty_var(ACCESS_TOKEN_VAR)?;
        Self::new(&options.endpoint, access_token, options.timeout())
    }
}

impl Notifier for LineClient {
    async fn broadcast_text(&self, text: &str) -> Result<(), Error> {
        let payload = BroadcastRequest {
            messages: [TextMessage { kind: "text", text }],
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Broadcast { status, body });
        }

        debug!("Broadcast accepted with {status}");
        Ok(())
    }
}
