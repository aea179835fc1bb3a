use std::{fmt, time::Duration};

use crate::metrics::Summary;

/// Pass/fail criteria for a whole run. A run passes while the 95th
/// percentile request duration stays under `p95_max` and the `errors`
/// rate stays under `error_rate_max`.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub p95_max: Duration,
    pub error_rate_max: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            p95_max: Duration::from_millis(500),
            error_rate_max: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Breach {
    RequestDuration { p95_ms: f64, limit_ms: f64 },
    ErrorRate { rate: f64, limit: f64 },
}

impl fmt::Display for Breach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequestDuration { p95_ms, limit_ms } => {
                write!(f, "http_req_duration p(95)={p95_ms:.2}ms, want < {limit_ms}ms")
            }
            Self::ErrorRate { rate, limit } => {
                write!(f, "errors rate={rate:.4}, want < {limit}")
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct Verdict {
    pub breaches: Vec<Breach>,
}

impl Verdict {
    pub fn passed(&self) -> bool {
        self.breaches.is_empty()
    }
}

impl Thresholds {
    pub fn evaluate(&self, summary: &Summary) -> Verdict {
        let mut breaches = Vec::new();

        let limit_ms = self.p95_max.as_secs_f64() * 1000.0;
        if summary.requests > 0 && summary.p95_ms >= limit_ms {
            breaches.push(Breach::RequestDuration {
                p95_ms: summary.p95_ms,
                limit_ms,
            });
        }

        if let Some(rate) = summary.error_rate {
            if rate >= self.error_rate_max {
                breaches.push(Breach::ErrorRate {
                    rate,
                    limit: self.error_rate_max,
                });
            }
        }

        Verdict { breaches }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn summary(p95_ms: f64, error_rate: Option<f64>) -> Summary {
        Summary {
            requests: 10,
            iterations: 10,
            vus_max: 1,
            avg_ms: p95_ms,
            p90_ms: p95_ms,
            p95_ms,
            max_ms: p95_ms,
            error_rate,
            checks: vec![],
        }
    }

    #[test]
    fn test_healthy_run_passes() {
        let verdict = Thresholds::default().evaluate(&summary(120.0, Some(0.02)));
        assert!(verdict.passed());
    }

    #[test]
    fn test_slow_run_fails() {
        let verdict = Thresholds::default().evaluate(&summary(730.0, Some(0.0)));
        assert_eq!(
            verdict.breaches,
            vec![Breach::RequestDuration {
                p95_ms: 730.0,
                limit_ms: 500.0
            }]
        );
    }

    #[test]
    fn test_limits_are_exclusive() {
        let verdict = Thresholds::default().evaluate(&summary(500.0, Some(0.1)));
        assert_eq!(verdict.breaches.len(), 2);
    }

    #[test]
    fn test_error_rate_fails() {
        let verdict = Thresholds::default().evaluate(&summary(10.0, Some(0.25)));
        assert!(matches!(verdict.breaches[..], [Breach::ErrorRate { .. }]));
    }

    #[test]
    fn test_nothing_measured_passes() {
        let mut empty = summary(0.0, None);
        empty.requests = 0;
        assert!(Thresholds::default().evaluate(&empty).passed());
    }
}
