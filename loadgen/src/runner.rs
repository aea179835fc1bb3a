use std::{sync::Arc, time::Duration};

use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{interval, timeout, Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{metrics::Summary, profile::Profile, scenario::Scenario};

/// How often the active virtual-user count is brought in line with the
/// profile.
const TICK: Duration = Duration::from_millis(100);

struct VirtualUser {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct Runner {
    profile: Profile,
    scenario: Arc<Scenario>,
    pause: Duration,
    graceful_stop: Duration,
}

impl Runner {
    pub fn new(profile: Profile, scenario: Scenario) -> Self {
        Self {
            profile,
            scenario: Arc::new(scenario),
            pause: Duration::from_secs(1),
            graceful_stop: Duration::from_secs(30),
        }
    }

    /// Sleep between two iterations of the same virtual user.
    pub fn pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// How long in-flight iterations may run once the last stage ended.
    pub fn graceful_stop(mut self, graceful_stop: Duration) -> Self {
        self.graceful_stop = graceful_stop;
        self
    }

    pub async fn run(self) -> Summary {
        info!(
            "Starting PostgreSQL load test against: {}",
            self.scenario.api_host()
        );
        info!(
            "{} stages, up to {} VUs over {:?}",
            self.profile.stages().len(),
            self.profile.max_target(),
            self.profile.total_duration()
        );

        let metrics = self.scenario.metrics().clone();
        let started = Instant::now();
        let mut active: Vec<VirtualUser> = Vec::new();
        let mut stopping: Vec<JoinHandle<()>> = Vec::new();

        let mut ticker = interval(TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let Some(target) = self.profile.target_at(started.elapsed()) else {
                break;
            };

            if target != active.len() {
                debug!("VUs {} -> {}", active.len(), target);
            }
            while active.len() < target {
                active.push(self.spawn_virtual_user());
            }
            while active.len() > target {
                if let Some(vu) = active.pop() {
                    stopping.push(vu.stop_after_iteration());
                }
            }
            metrics.observe_vus(active.len());
            stopping.retain(|handle| !handle.is_finished());
        }

        stopping.extend(active.into_iter().map(VirtualUser::stop_after_iteration));
        let drained = timeout(self.graceful_stop, async {
            for handle in stopping.iter_mut() {
                if let Err(e) = handle.await {
                    warn!("virtual user failed: {}", e);
                }
            }
        })
        .await;
        if drained.is_err() {
            warn!(
                "abandoning in-flight iterations after {:?}",
                self.graceful_stop
            );
            for handle in &stopping {
                handle.abort();
            }
        }

        info!("PostgreSQL load test completed");
        metrics.summary()
    }

    fn spawn_virtual_user(&self) -> VirtualUser {
        let (stop, stopped) = watch::channel(false);
        let handle = tokio::spawn(virtual_user(self.scenario.clone(), self.pause, stopped));
        VirtualUser { stop, handle }
    }
}

impl VirtualUser {
    fn stop_after_iteration(self) -> JoinHandle<()> {
        // a send error means the task already ended
        let _ = self.stop.send(true);
        self.handle
    }
}

async fn virtual_user(scenario: Arc<Scenario>, pause: Duration, mut stopped: watch::Receiver<bool>) {
    while !*stopped.borrow() {
        scenario.iteration().await;

        tokio::select! {
            _ = tokio::time::sleep(pause) => {}
            _ = stopped.changed() => break,
        }
    }
}
