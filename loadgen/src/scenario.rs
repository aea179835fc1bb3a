use std::{sync::Arc, time::Duration};

use fake::{
    faker::{internet::en::SafeEmail, name::en::Name},
    Fake,
};
use reqwest::{Client, RequestBuilder, StatusCode};
use shared::CreateUserParams;
use tokio::time::Instant;

use crate::metrics::Metrics;

/// Health responses slower than this count as errors.
pub const HEALTH_LATENCY_BUDGET: Duration = Duration::from_millis(500);

pub const CHECK_STATUS_200: &str = "status is 200";
pub const CHECK_FAST_RESPONSE: &str = "response time < 500ms";
pub const CHECK_READ: &str = "read operation successful";
pub const CHECK_WRITE: &str = "write operation successful";

struct Outcome {
    /// `None` when no response arrived at all.
    status: Option<StatusCode>,
    duration: Duration,
}

impl Outcome {
    fn is(&self, status: StatusCode) -> bool {
        self.status == Some(status)
    }
}

/// The script every virtual user repeats.
#[derive(Debug, Clone)]
pub struct Scenario {
    client: Client,
    api_host: String,
    metrics: Arc<Metrics>,
}

impl Scenario {
    pub fn new(client: Client, api_host: impl Into<String>, metrics: Arc<Metrics>) -> Self {
        Self {
            client,
            api_host: api_host.into(),
            metrics,
        }
    }

    pub fn api_host(&self) -> &str {
        &self.api_host
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub async fn iteration(&self) {
        let health = self.send(self.client.get(self.url("/api/health"))).await;

        let ok = health.is(StatusCode::OK);
        let fast = health.duration < HEALTH_LATENCY_BUDGET;
        self.metrics.record_check(CHECK_STATUS_200, ok);
        self.metrics.record_check(CHECK_FAST_RESPONSE, fast);
        self.metrics.errors.add(!(ok && fast));

        if ok {
            let read = self.send(self.client.get(self.url("/api/users"))).await;
            self.metrics.record_check(CHECK_READ, read.is(StatusCode::OK));

            // .json() sets the Content-Type header
            let write = self
                .send(self.client.post(self.url("/api/users")).json(&fake_user()))
                .await;
            self.metrics.record_check(
                CHECK_WRITE,
                write.is(StatusCode::CREATED) || write.is(StatusCode::OK),
            );
        }

        self.metrics.record_iteration();
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_host, path)
    }

    async fn send(&self, request: RequestBuilder) -> Outcome {
        let start = Instant::now();
        let status = match request.send().await {
            Ok(response) => {
                let status = response.status();
                if let Err(e) = response.bytes().await {
                    tracing::debug!("failed to read response body: {}", e);
                }
                Some(status)
            }
            Err(e) => {
                tracing::debug!("request failed: {}", e);
                None
            }
        };
        let duration = start.elapsed();

        self.metrics.record_request(duration);
        Outcome { status, duration }
    }
}

pub fn fake_user() -> CreateUserParams {
    let name: String = Name().fake();
    let email: String = SafeEmail().fake();
    CreateUserParams::new(name, email)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tests::{spawn_stub_api, unreachable_host, StubApi};
    use axum::http::StatusCode as AxumStatus;

    fn scenario(api_host: &str) -> Scenario {
        Scenario::new(Client::new(), api_host, Arc::new(Metrics::default()))
    }

    fn check(scenario: &Scenario, name: &str) -> Option<(u64, u64)> {
        scenario
            .metrics()
            .summary()
            .checks
            .into_iter()
            .find(|check| check.name == name)
            .map(|check| (check.passes, check.fails))
    }

    #[test]
    fn test_fake_user_is_complete() {
        let user = fake_user();
        assert!(!user.name.unwrap().is_empty());
        assert!(user.email.unwrap().contains('@'));
    }

    #[tokio::test]
    async fn test_healthy_iteration() {
        let stub = spawn_stub_api(AxumStatus::OK).await;
        let scenario = scenario(&stub.base_url);

        scenario.iteration().await;

        let summary = scenario.metrics().summary();
        assert_eq!(summary.requests, 3);
        assert_eq!(summary.iterations, 1);
        assert_eq!(summary.error_rate, Some(0.0));
        assert_eq!(check(&scenario, CHECK_STATUS_200), Some((1, 0)));
        assert_eq!(check(&scenario, CHECK_FAST_RESPONSE), Some((1, 0)));
        assert_eq!(check(&scenario, CHECK_READ), Some((1, 0)));
        assert_eq!(check(&scenario, CHECK_WRITE), Some((1, 0)));

        let posted = stub.posted();
        assert_eq!(posted.len(), 1);
        assert!(posted[0].email.as_deref().unwrap().contains('@'));
    }

    #[tokio::test]
    async fn test_unhealthy_iteration_skips_reads_and_writes() {
        let stub: StubApi = spawn_stub_api(AxumStatus::SERVICE_UNAVAILABLE).await;
        let scenario = scenario(&stub.base_url);

        scenario.iteration().await;

        let summary = scenario.metrics().summary();
        assert_eq!(summary.requests, 1);
        assert_eq!(summary.error_rate, Some(1.0));
        assert_eq!(check(&scenario, CHECK_STATUS_200), Some((0, 1)));
        assert_eq!(check(&scenario, CHECK_READ), None);
        assert_eq!(check(&scenario, CHECK_WRITE), None);
        assert!(stub.posted().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_host_counts_as_error() {
        let scenario = scenario(&unreachable_host().await);

        scenario.iteration().await;

        let summary = scenario.metrics().summary();
        assert_eq!(summary.requests, 1);
        assert_eq!(summary.iterations, 1);
        assert_eq!(summary.error_rate, Some(1.0));
    }
}
