//! Run-wide measurements, fed concurrently by every virtual user.

use std::{
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Mutex, MutexGuard,
    },
    time::Duration,
};

use tracing::info;

/// Share of `true` samples.
#[derive(Debug, Default)]
pub struct Rate {
    hits: AtomicU64,
    total: AtomicU64,
}

impl Rate {
    pub fn add(&self, hit: bool) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    /// `None` until a sample was added.
    pub fn value(&self) -> Option<f64> {
        let total = self.total.load(Ordering::Relaxed);
        (total > 0).then(|| self.hits.load(Ordering::Relaxed) as f64 / total as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckSummary {
    pub name: &'static str,
    pub passes: u64,
    pub fails: u64,
}

#[derive(Debug, Default)]
pub struct Metrics {
    durations: Mutex<Vec<Duration>>,
    checks: Mutex<Vec<CheckSummary>>,
    iterations: AtomicU64,
    vus_max: AtomicUsize,
    /// Failed health checks. The only rate the thresholds look at.
    pub errors: Rate,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // a panicking VU must not take the whole run down with it
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Metrics {
    pub fn record_request(&self, duration: Duration) {
        lock(&self.durations).push(duration);
    }

    pub fn record_check(&self, name: &'static str, passed: bool) {
        let mut checks = lock(&self.checks);
        let index = match checks.iter().position(|check| check.name == name) {
            Some(index) => index,
            None => {
                checks.push(CheckSummary {
                    name,
                    passes: 0,
                    fails: 0,
                });
                checks.len() - 1
            }
        };
        let check = &mut checks[index];
        if passed {
            check.passes += 1;
        } else {
            check.fails += 1;
        }
    }

    pub fn record_iteration(&self) {
        self.iterations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn observe_vus(&self, active: usize) {
        self.vus_max.fetch_max(active, Ordering::Relaxed);
    }

    pub fn summary(&self) -> Summary {
        let mut durations = lock(&self.durations).clone();
        durations.sort_unstable();

        let total: Duration = durations.iter().sum();
        let avg_ms = if durations.is_empty() {
            0.0
        } else {
            millis(total) / durations.len() as f64
        };

        Summary {
            requests: durations.len() as u64,
            iterations: self.iterations.load(Ordering::Relaxed),
            vus_max: self.vus_max.load(Ordering::Relaxed),
            avg_ms,
            p90_ms: percentile(&durations, 0.90),
            p95_ms: percentile(&durations, 0.95),
            max_ms: durations.last().copied().map(millis).unwrap_or(0.0),
            error_rate: self.errors.value(),
            checks: lock(&self.checks).clone(),
        }
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// Linear interpolation between the closest ranks of an ascending slice.
fn percentile(sorted: &[Duration], p: f64) -> f64 {
    match sorted {
        [] => 0.0,
        [only] => millis(*only),
        _ => {
            let rank = p * (sorted.len() - 1) as f64;
            let lower = rank.floor() as usize;
            let upper = rank.ceil() as usize;
            let weight = rank - lower as f64;
            millis(sorted[lower]) * (1.0 - weight) + millis(sorted[upper]) * weight
        }
    }
}

#[derive(Debug, Clone)]
pub struct Summary {
    pub requests: u64,
    pub iterations: u64,
    pub vus_max: usize,
    pub avg_ms: f64,
    pub p90_ms: f64,
    pub p95_ms: f64,
    pub max_ms: f64,
    pub error_rate: Option<f64>,
    pub checks: Vec<CheckSummary>,
}

impl Summary {
    pub fn log(&self) {
        info!("http_reqs..............: {}", self.requests);
        info!("iterations.............: {}", self.iterations);
        info!("vus_max................: {}", self.vus_max);
        info!(
            "http_req_duration......: avg={:.2}ms p(90)={:.2}ms p(95)={:.2}ms max={:.2}ms",
            self.avg_ms, self.p90_ms, self.p95_ms, self.max_ms
        );
        match self.error_rate {
            Some(rate) => info!("errors.................: {:.2}%", rate * 100.0),
            None => info!("errors.................: no samples"),
        }
        for check in &self.checks {
            let mark = if check.fails == 0 { "✓" } else { "✗" };
            info!(
                "{mark} {} ({} passed, {} failed)",
                check.name, check.passes, check.fails
            );
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_rate() {
        let rate = Rate::default();
        assert_eq!(rate.value(), None);
        rate.add(true);
        rate.add(false);
        rate.add(false);
        rate.add(false);
        assert_eq!(rate.value(), Some(0.25));
    }

    #[test]
    fn test_percentiles() {
        let metrics = Metrics::default();
        for n in (1..=100).rev() {
            metrics.record_request(ms(n));
        }
        let summary = metrics.summary();
        assert_eq!(summary.requests, 100);
        assert!((summary.p95_ms - 95.05).abs() < 1e-6);
        assert!((summary.p90_ms - 90.1).abs() < 1e-6);
        assert!((summary.avg_ms - 50.5).abs() < 1e-6);
        assert!((summary.max_ms - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_summary() {
        let summary = Metrics::default().summary();
        assert_eq!(summary.requests, 0);
        assert_eq!(summary.p95_ms, 0.0);
        assert_eq!(summary.error_rate, None);
        assert!(summary.checks.is_empty());
    }

    #[test]
    fn test_checks_keep_first_seen_order() {
        let metrics = Metrics::default();
        metrics.record_check("status is 200", true);
        metrics.record_check("read operation successful", false);
        metrics.record_check("status is 200", false);

        let checks = metrics.summary().checks;
        assert_eq!(
            checks,
            vec![
                CheckSummary {
                    name: "status is 200",
                    passes: 1,
                    fails: 1
                },
                CheckSummary {
                    name: "read operation successful",
                    passes: 0,
                    fails: 1
                },
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_contributions_are_not_lost() {
        let metrics = Arc::new(Metrics::default());

        let handles = (0..8)
            .map(|vu| {
                let metrics = metrics.clone();
                tokio::spawn(async move {
                    for i in 0..500 {
                        metrics.record_request(ms(i % 50));
                        metrics.record_check("status is 200", i % 2 == 0);
                        metrics.errors.add(vu % 2 == 0);
                        metrics.record_iteration();
                        metrics.observe_vus(vu + 1);
                    }
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.await.unwrap();
        }

        let summary = metrics.summary();
        assert_eq!(summary.requests, 4_000);
        assert_eq!(summary.iterations, 4_000);
        assert_eq!(summary.vus_max, 8);
        assert_eq!(summary.error_rate, Some(0.5));
        assert_eq!(summary.checks[0].passes + summary.checks[0].fails, 4_000);
    }
}
