use chrono::{Local, NaiveDate};
use log::{error, info};
use std::time::Duration;
use tokio::{select, time::sleep};
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::moments::MomentSource;
use crate::notifier::Notifier;

/// Text broadcast when a new moment shows up.
#[must_use]
pub fn alert_message(date: NaiveDate) -> String {
    format!("Time to BeReal! ({})", date.format("%Y-%m-%d"))
}

/// Result of a single poll that did not end in a failed broadcast.
#[derive(Debug)]
pub enum PollOutcome {
    Unchanged,
    Changed { previous: String, current: String },
    /// The fetch failed; the tracked id was left untouched.
    FetchFailed(Error),
}

/// Watches one region and broadcasts whenever its moment id changes.
///
/// The last seen id lives here and nowhere else: it is set by [`Poller::start`]
/// and only replaced by [`Poller::poll_once`] when a successful fetch returns
/// a different id.
pub struct Poller<S, N> {
    source: S,
    notifier: N,
    tracked_id: String,
}

impl<S: MomentSource, N: Notifier> Poller<S, N> {
    /// Performs the initial fetch that seeds the tracked id.
    ///
    /// # Errors
    ///
    /// Any fetch error is returned as is; the first fetch is never retried.
    pub async fn start(source: S, notifier: N) -> Result<Self, Error> {
        let tracked_id = source.latest_id().await?;
        info!("Latest moment ID: {tracked_id}");

        Ok(Self {
            source,
            notifier,
            tracked_id,
        })
    }

    #[must_use]
    pub fn tracked_id(&self) -> &str {
        &self.tracked_id
    }

    /// Fetches the current id once and broadcasts if it moved.
    ///
    /// Fetch errors are folded into [`PollOutcome::FetchFailed`].
    ///
    /// # Errors
    ///
    /// Returns the notifier's error when the broadcast fails. The tracked id
    /// has already been updated at that point.
    pub async fn poll_once(&mut self) -> Result<PollOutcome, Error> {
        let current = match self.source.latest_id().await {
            Ok(id) => id,
            Err(e) => return Ok(PollOutcome::FetchFailed(e)),
        };

        if current == self.tracked_id {
            return Ok(PollOutcome::Unchanged);
        }

        info!(
            "New moment detected! Old ID: {}, New ID: {current}",
            self.tracked_id
        );
        let previous = std::mem::replace(&mut self.tracked_id, current.clone());

        let message = alert_message(Local::now().date_naive());
        self.notifier.broadcast_text(&message).await?;
        info!("Broadcast sent: {message}");

        Ok(PollOutcome::Changed { previous, current })
    }

    /// Polls every `interval` until `token` is cancelled.
    ///
    /// # Behavior
    ///
    /// - Sleeps for `interval` before each poll
    /// - Logs fetch errors and carries on at the same interval
    /// - Stops at the first broadcast failure
    ///
    /// # Errors
    ///
    /// Returns the broadcast error that stopped the loop.
    pub async fn run(mut self, interval: Duration, token: CancellationToken) -> Result<(), Error> {
        info!("Polling every {} ms", interval.as_millis());

        loop {
            select! {
                () = sleep(interval) => {},
                () = token.cancelled() => {
                    info!("Shutdown requested during sleep");
                    break;
                }
            }

            if let PollOutcome::FetchFailed(e) = self.poll_once().await? {
                error!("Error fetching latest ID: {e}");
            }
        }

        info!("Moment polling stopped gracefully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedSource {
        replies: Mutex<VecDeque<Result<String, Error>>>,
    }

    impl ScriptedSource {
        fn new(replies: Vec<Result<String, Error>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
            }
        }

        fn ids(ids: &[&str]) -> Self {
            Self::new(ids.iter().map(|id| Ok((*id).to_string())).collect())
        }
    }

    impl MomentSource for ScriptedSource {
        async fn latest_id(&self) -> Result<String, Error> {
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(Error::RegionNotFound("exhausted".to_string())))
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<String>>,
        fail: bool,
        cancel_on_send: Option<CancellationToken>,
    }

    impl RecordingNotifier {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Notifier for &RecordingNotifier {
        async fn broadcast_text(&self, text: &str) -> Result<(), Error> {
            self.sent.lock().unwrap().push(text.to_string());
            if let Some(token) = &self.cancel_on_send {
                token.cancel();
            }
            if self.fail {
                return Err(Error::Broadcast {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    body: "boom".to_string(),
                });
            }
            Ok(())
        }
    }

    fn today_alert() -> String {
        alert_message(Local::now().date_naive())
    }

    #[test]
    fn test_alert_message_embeds_date() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        assert_eq!(alert_message(date), "Time to BeReal! (2025-03-07)");
    }

    #[tokio::test]
    async fn test_start_seeds_tracked_id() {
        let notifier = RecordingNotifier::default();
        let poller = Poller::start(ScriptedSource::ids(&["m1"]), &notifier)
            .await
            .unwrap();
        assert_eq!(poller.tracked_id(), "m1");
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_start_fails_on_first_fetch_error() {
        let notifier = RecordingNotifier::default();
        let source = ScriptedSource::new(vec![
            Err(Error::EmptyMomentId("asia-east".to_string())),
            Ok("m1".to_string()),
        ]);
        let result = Poller::start(source, &notifier).await;
        assert!(matches!(result, Err(Error::EmptyMomentId(_))));
    }

    #[tokio::test]
    async fn test_unchanged_id_never_broadcasts() {
        let notifier = RecordingNotifier::default();
        let mut poller = Poller::start(ScriptedSource::ids(&["A", "A", "A"]), &notifier)
            .await
            .unwrap();

        for _ in 0..2 {
            let outcome = poller.poll_once().await.unwrap();
            assert!(matches!(outcome, PollOutcome::Unchanged));
        }
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_each_transition_broadcasts_once() {
        let notifier = RecordingNotifier::default();
        let mut poller = Poller::start(ScriptedSource::ids(&["A", "A", "B", "B", "C"]), &notifier)
            .await
            .unwrap();

        let mut transitions = Vec::new();
        for _ in 0..4 {
            if let PollOutcome::Changed { previous, current } = poller.poll_once().await.unwrap() {
                transitions.push((previous, current));
            }
        }

        assert_eq!(
            transitions,
            vec![
                ("A".to_string(), "B".to_string()),
                ("B".to_string(), "C".to_string())
            ]
        );
        assert_eq!(notifier.sent(), vec![today_alert(), today_alert()]);
        assert_eq!(poller.tracked_id(), "C");
    }

    #[tokio::test]
    async fn test_fetch_failures_leave_state_alone() {
        let notifier = RecordingNotifier::default();
        let malformed = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        // Nothing listens on port 9 of localhost.
        let refused = reqwest::get("http://127.0.0.1:9/").await.unwrap_err();
        let source = ScriptedSource::new(vec![
            Ok("A".to_string()),
            Err(Error::HttpRequest(refused)),
            Err(Error::HttpStatus {
                status: StatusCode::BAD_GATEWAY,
                body: "upstream down".to_string(),
            }),
            Err(Error::JsonParse(malformed)),
            Err(Error::RegionNotFound("asia-east".to_string())),
            Ok("A".to_string()),
        ]);
        let mut poller = Poller::start(source, &notifier).await.unwrap();

        for _ in 0..4 {
            let outcome = poller.poll_once().await.unwrap();
            assert!(matches!(outcome, PollOutcome::FetchFailed(_)));
            assert_eq!(poller.tracked_id(), "A");
        }
        assert!(matches!(
            poller.poll_once().await.unwrap(),
            PollOutcome::Unchanged
        ));
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_failure_is_returned_without_retry() {
        let notifier = RecordingNotifier::failing();
        let mut poller = Poller::start(ScriptedSource::ids(&["A", "B"]), &notifier)
            .await
            .unwrap();

        let result = poller.poll_once().await;
        assert!(matches!(result, Err(Error::Broadcast { .. })));
        assert_eq!(notifier.sent().len(), 1);
        assert_eq!(poller.tracked_id(), "B");
    }

    #[tokio::test]
    async fn test_single_new_moment_scenario() {
        let notifier = RecordingNotifier::default();
        let mut poller = Poller::start(ScriptedSource::ids(&["m1", "m1", "m2", "m2"]), &notifier)
            .await
            .unwrap();

        for _ in 0..3 {
            poller.poll_once().await.unwrap();
        }

        assert_eq!(notifier.sent(), vec![today_alert()]);
        assert_eq!(poller.tracked_id(), "m2");
    }

    #[tokio::test]
    async fn test_run_stops_on_broadcast_failure() {
        let notifier = RecordingNotifier::failing();
        let poller = Poller::start(ScriptedSource::ids(&["A", "B"]), &notifier)
            .await
            .unwrap();

        let result = poller
            .run(Duration::from_millis(1), CancellationToken::new())
            .await;

        assert!(matches!(result, Err(Error::Broadcast { .. })));
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_run_survives_fetch_errors() {
        let token = CancellationToken::new();
        let notifier = RecordingNotifier {
            cancel_on_send: Some(token.clone()),
            ..RecordingNotifier::default()
        };
        let source = ScriptedSource::new(vec![
            Ok("A".to_string()),
            Err(Error::EmptyMomentId("asia-east".to_string())),
            Ok("A".to_string()),
            Err(Error::RegionNotFound("asia-east".to_string())),
            Ok("B".to_string()),
        ]);
        let poller = Poller::start(source, &notifier).await.unwrap();

        poller.run(Duration::from_millis(1), token).await.unwrap();

        assert_eq!(notifier.sent(), vec![today_alert()]);
    }

    #[tokio::test]
    async fn test_run_exits_when_cancelled() {
        let notifier = RecordingNotifier::default();
        let poller = Poller::start(ScriptedSource::ids(&["A"]), &notifier)
            .await
            .unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let result = poller.run(Duration::from_secs(60), token).await;
        assert!(result.is_ok());
        assert!(notifier.sent().is_empty());
    }
}
