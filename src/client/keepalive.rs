//! Proactive session refresh.
//!
//! Calls the relay's refresh endpoint on a fixed period shorter than the access
//! token lifetime. Failures are ignored: the route guard refreshes on demand
//! when the next protected page is requested.

use super::session::SessionClient;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tracing::debug;

/// Default refresh period; access tokens live about five minutes.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(240);

/// Handle to a running keepalive task. Dropping it stops the timer.
#[derive(Debug)]
pub struct KeepAlive {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl KeepAlive {
    /// Stop the timer and wait for the task to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.handle.await {
            debug!("Keepalive task ended abnormally: {err}");
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Spawn the refresh timer; the first refresh happens one `period` from now.
#[must_use]
pub fn spawn(client: Arc<SessionClient>, period: Duration) -> KeepAlive {
    let (shutdown, mut stop) = watch::channel(false);

    let handle = tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // `interval` fires immediately; a fresh session does not need that.
        ticker.tick().await;

        loop {
            tokio::select! {
                // Fires on `stop` and when the handle is dropped.
                _ = stop.changed() => break,
                _ = ticker.tick() => {
                    match client.refresh().await {
                        Ok(()) => debug!("Session refreshed"),
                        Err(err) => debug!("Background refresh failed: {err}"),
                    }
                }
            }
        }
    });

    KeepAlive { shutdown, handle }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn keeps_ticking_after_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/refresh"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = Arc::new(SessionClient::new(&server.uri()).unwrap());
        let keepalive = spawn(client, Duration::from_millis(40));
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!keepalive.is_finished());
        keepalive.stop().await;

        let calls = server.received_requests().await.unwrap_or_default().len();
        assert!(calls >= 2, "expected repeated refresh attempts, got {calls}");
    }

    #[tokio::test]
    async fn stop_ends_task_before_first_tick() {
        let server = MockServer::start().await;
        let client = Arc::new(SessionClient::new(&server.uri()).unwrap());

        let keepalive = spawn(client, DEFAULT_INTERVAL);
        tokio::time::timeout(Duration::from_secs(1), keepalive.stop())
            .await
            .unwrap();

        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }
}
