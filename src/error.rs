use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable fetching error: {0}")]
    EnvVarNotSet(#[from] dotenvy::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),
    #[error("HTTP error {status}: {body}")]
    HttpStatus { status: StatusCode, body: String },
    #[error("Failed to read response: {0}")]
    BodyRead(#[source] reqwest::Error),
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),
    #[error("Region '{0}' not found in response")]
    RegionNotFound(String),
    #[error("No moment ID found for region '{0}'")]
    EmptyMomentId(String),
    #[error("Broadcast rejected with {status}: {body}")]
    Broadcast { status: StatusCode, body: String },
}

