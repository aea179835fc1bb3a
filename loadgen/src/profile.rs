//! Virtual-user traffic shape over time.

use std::time::Duration;

/// Ramp linearly from the previous stage's target to `target` over
/// `duration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: usize,
}

impl Stage {
    pub const fn new(duration: Duration, target: usize) -> Self {
        Self { duration, target }
    }
}

#[derive(Debug, Clone)]
pub struct Profile {
    stages: Vec<Stage>,
}

impl Profile {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    /// Up to `vus` over two minutes, hold for five, back to zero over two.
    pub fn ramp_hold_ramp(vus: usize) -> Self {
        Self::new(vec![
            Stage::new(Duration::from_secs(2 * 60), vus),
            Stage::new(Duration::from_secs(5 * 60), vus),
            Stage::new(Duration::from_secs(2 * 60), 0),
        ])
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|stage| stage.duration).sum()
    }

    pub fn max_target(&self) -> usize {
        self.stages
            .iter()
            .map(|stage| stage.target)
            .max()
            .unwrap_or(0)
    }

    /// Number of virtual users that should be running `elapsed` into the
    /// run, or `None` once every stage is over.
    pub fn target_at(&self, elapsed: Duration) -> Option<usize> {
        let mut from = 0usize;
        let mut stage_start = Duration::ZERO;

        for stage in &self.stages {
            let stage_end = stage_start + stage.duration;
            if elapsed < stage_end {
                let into = (elapsed - stage_start).as_nanos() as i128;
                let span = stage.duration.as_nanos() as i128;
                let delta = stage.target as i128 - from as i128;
                return Some((from as i128 + delta * into / span) as usize);
            }
            from = stage.target;
            stage_start = stage_end;
        }

        None
    }
}
