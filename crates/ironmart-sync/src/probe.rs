//! # Connectivity Probe
//!
//! Answers "is Tally up right now?" without ever failing. Every way the
//! check can go wrong (refused, timeout, non-2xx, a different server on the
//! port) is folded into an offline [`HealthResult`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use ironmart_core::HealthResult;

use crate::tally::TallyGateway;

#[derive(Clone)]
pub struct ConnectivityProbe {
    gateway: Arc<dyn TallyGateway>,
    timeout: Duration,
}

impl ConnectivityProbe {
    pub fn new(gateway: Arc<dyn TallyGateway>, timeout: Duration) -> Self {
        ConnectivityProbe { gateway, timeout }
    }

    pub async fn probe(&self) -> HealthResult {
        let started = Instant::now();
        let outcome = tokio::time::timeout(self.timeout, self.gateway.ping()).await;
        let elapsed = started.elapsed().as_millis() as i64;

        let result = match outcome {
            Ok(Ok(())) => HealthResult::online(elapsed),
            Ok(Err(e)) => HealthResult::offline(elapsed, e.to_string()),
            Err(_) => HealthResult::offline(
                elapsed,
                format!("no response within {} seconds", self.timeout.as_secs()),
            ),
        };

        debug!(
            online = result.online,
            response_time_ms = result.response_time_ms,
            error = ?result.error,
            "Tally probe"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TallySettings;
    use crate::tally::HttpTallyGateway;
    use httpmock::prelude::*;

    fn probe_for(url: String) -> ConnectivityProbe {
        let settings = TallySettings {
            url,
            probe_timeout_secs: 1,
            ..Default::default()
        };
        let gateway = HttpTallyGateway::new(&settings).unwrap();
        ConnectivityProbe::new(Arc::new(gateway), settings.probe_timeout())
    }

    #[tokio::test]
    async fn test_online_when_tally_answers() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/");
                then.status(200).body("TallyPrime Server is Running");
            })
            .await;

        let result = probe_for(server.base_url()).probe().await;
        assert!(result.online);
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_non_success_status_is_offline() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/");
                then.status(503).body("Running, but busy");
            })
            .await;

        let result = probe_for(server.base_url()).probe().await;
        assert!(!result.online);
        assert!(result.error.unwrap().contains("503"));
    }

    #[tokio::test]
    async fn test_unreachable_is_offline_not_error() {
        let result = probe_for("http://127.0.0.1:9".to_string()).probe().await;
        assert!(!result.online);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn test_hanging_server_is_offline() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/");
                then.status(200)
                    .delay(Duration::from_secs(3))
                    .body("TallyPrime Server is Running");
            })
            .await;

        let started = Instant::now();
        let result = probe_for(server.base_url()).probe().await;
        assert!(!result.online);
        assert!(started.elapsed() < Duration::from_secs(3));
    }
}
