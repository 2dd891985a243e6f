pub mod config;
pub mod error;
pub mod moments;
pub mod notifier;
pub mod poller;

use log::info;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::moments::MomentsClient;
use crate::notifier::{LineClient, Notifier};
use crate::poller::Poller;

pub use crate::error::Error;

pub const GREETING: &str = "Hello everyone!";

/// Watches the configured region and broadcasts a LINE message whenever a new
/// moment is published.
///
/// # Behavior
///
/// - Loads configuration from the default config file location
/// - Initializes the LINE client from `LINE_CHANNEL_ACCESS_TOKEN`
/// - Reads `BEREAL_API_KEY` and fetches the current moment id once
/// - Polls at the configured interval until `token` is cancelled
///
/// # Errors
///
/// Returns an error if configuration is incomplete, if the initial fetch
/// fails, or as soon as a broadcast fails. Later fetch errors are only logged.
pub async fn watch_moments(token: CancellationToken) -> Result<(), Error> {
    let config = Config::load()?;

    let notifier = LineClient::from_env(&config.line)?;
    info!("LINE client initialized.");

    let api_key = crate::config::api_key()?;
    let source = MomentsClient::from_options(&config.poller, &api_key)?;

    info!("Starting moment monitoring...");
    info!("Region: {}", source.region());
    info!(
        "Check interval: {} seconds",
        config.poller.check_interval_secs
    );
    info!("Timeout: {} seconds", config.poller.timeout_secs);

    let poller = Poller::start(source, notifier).await?;
    poller.run(config.poller.check_interval(), token).await
}

/// Sends [`GREETING`] once to every subscriber of the LINE channel.
///
/// # Errors
///
/// Returns an error if the LINE client cannot be initialized or the broadcast fails.
pub async fn broadcast_greeting() -> Result<(), Error> {
    let config = Config::load()?;
    let notifier = LineClient::from_env(&config.line)?;
    info!("LINE client initialized.");

    notifier.broadcast_text(GREETING).await?;
    info!("Greeting sent");
    Ok(())
}
