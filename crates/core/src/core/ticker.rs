//! Sample ticker: the one component that pulls.
//!
//! On every tick it reads each frame buffer, merges the populated ones into
//! the global collector and publishes a snapshot if, and only if, the merged
//! timestamp advanced.

use crate::catalog::Catalog;
use crate::sample::{FrameSampleBuffer, GlobalCollector, StateSnapshot};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

pub const MIN_RATE_HZ: u32 = 1;
pub const MAX_RATE_HZ: u32 = 1000;

/// No traffic for this long after the first packet is reported as silence.
pub const DEFAULT_SILENCE_THRESHOLD: Duration = Duration::from_secs(3);

/// Keep an output rate inside `MIN_RATE_HZ..=MAX_RATE_HZ`.
pub fn clamp_rate(rate_hz: u32) -> u32 {
    rate_hz.clamp(MIN_RATE_HZ, MAX_RATE_HZ)
}

/// Whole milliseconds per tick, truncated (30 Hz ticks every 33 ms).
pub fn tick_period_ms(rate_hz: u32) -> u64 {
    u64::from(1000 / clamp_rate(rate_hz))
}

pub fn period_from_rate(rate_hz: u32) -> Duration {
    Duration::from_millis(tick_period_ms(rate_hz))
}

/// Merges frame buffers into one state vector on demand.
///
/// The ticker owns the [`GlobalCollector`]; buffers are shared with their
/// ingestion tasks and only ever read here.
#[derive(Debug)]
pub struct Ticker {
    buffers: Vec<Arc<FrameSampleBuffer>>,
    collector: GlobalCollector,
    last_published: Option<f64>,
    silence_threshold: Duration,
    silent: Vec<bool>,
}

impl Ticker {
    pub fn new(catalog: &Catalog, buffers: Vec<Arc<FrameSampleBuffer>>) -> Self {
        let silent = vec![false; buffers.len()];
        Self {
            buffers,
            collector: GlobalCollector::new(catalog),
            last_published: None,
            silence_threshold: DEFAULT_SILENCE_THRESHOLD,
            silent,
        }
    }

    /// How long a frame may stay quiet before it is reported.
    pub fn with_silence_threshold(mut self, threshold: Duration) -> Self {
        self.silence_threshold = threshold;
        self
    }

    pub fn buffers(&self) -> &[Arc<FrameSampleBuffer>] {
        &self.buffers
    }

    pub fn last_published(&self) -> Option<f64> {
        self.last_published
    }

    pub fn tick(&mut self) -> Option<Arc<StateSnapshot>> {
        self.tick_at(Instant::now())
    }

    /// Merge every populated buffer and return the state if time advanced.
    ///
    /// `None` before the first sample, and whenever the merged timestamp is
    /// not strictly newer than the last one returned.
    pub fn tick_at(&mut self, now: Instant) -> Option<Arc<StateSnapshot>> {
        for buffer in &self.buffers {
            let sample = buffer.sample();
            if !sample.is_populated() {
                continue;
            }
            if let Err(e) = self
                .collector
                .merge(buffer.frame(), &sample.values, sample.timestamp)
            {
                error!("Merge failed for {}: {}", buffer.topic(), e);
            }
        }

        self.check_silence(now);

        let snapshot = self.collector.snapshot()?;
        if let Some(last) = self.last_published {
            if snapshot.timestamp <= last {
                return None;
            }
        }
        self.last_published = Some(snapshot.timestamp);
        Some(Arc::new(snapshot))
    }

    fn check_silence(&mut self, now: Instant) {
        for (buffer, silent) in self.buffers.iter().zip(self.silent.iter_mut()) {
            let Some(idle) = buffer.idle_for(now) else {
                continue;
            };
            let quiet = idle > self.silence_threshold;
            if quiet && !*silent {
                warn!(
                    "No data on {} for {:.1}s",
                    buffer.topic(),
                    idle.as_secs_f64()
                );
            } else if !quiet && *silent {
                info!("Data resumed on {}", buffer.topic());
            }
            *silent = quiet;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::VariableSpec;

    fn setup() -> (Catalog, Vec<Arc<FrameSampleBuffer>>) {
        let var = |uuid: &str, topic: &str, local_index| VariableSpec {
            uuid: uuid.to_string(),
            topic: topic.to_string(),
            local_index,
            data_type: "float".to_string(),
            ..Default::default()
        };
        let catalog = Catalog::builder()
            .variable(var("a", "fast", 0))
            .variable(var("t", "fast", 1))
            .variable(var("b", "slow", 0))
            .variable(var("u", "slow", 1))
            .build()
            .unwrap();
        let buffers = FrameSampleBuffer::for_catalog(&catalog);
        (catalog, buffers)
    }

    #[test]
    fn rate_clamps_to_supported_range() {
        assert_eq!(tick_period_ms(0), 1000);
        assert_eq!(tick_period_ms(30), 33);
        assert_eq!(tick_period_ms(5000), 1);
        assert_eq!(period_from_rate(100), Duration::from_millis(10));
    }

    #[test]
    fn publishes_only_when_time_advances() {
        let (catalog, buffers) = setup();
        let mut ticker = Ticker::new(&catalog, buffers.clone());

        assert!(ticker.tick().is_none(), "nothing merged yet");

        buffers[0].submit(&[1.0, 10.0], 10.0).unwrap();
        let snap = ticker.tick().unwrap();
        assert_eq!(snap.values, vec![1.0, 10.0, 0.0, 0.0]);
        assert_eq!(snap.timestamp, 10.0);

        assert!(ticker.tick().is_none(), "no new data");

        // slower frame behind in time: merged, but the max timestamp did not move
        buffers[1].submit(&[2.0, 4.0], 4.0).unwrap();
        assert!(ticker.tick().is_none());

        buffers[0].submit(&[3.0, 11.0], 11.0).unwrap();
        let snap = ticker.tick().unwrap();
        assert_eq!(snap.values, vec![3.0, 11.0, 2.0, 4.0]);
        assert_eq!(ticker.last_published(), Some(11.0));
    }

    #[test]
    fn published_timestamps_strictly_increase() {
        let (catalog, buffers) = setup();
        let mut ticker = Ticker::new(&catalog, buffers.clone());

        let mut published = Vec::new();
        for (i, ts) in [1.0, 1.0, 2.5, 2.0, 3.0, 3.0, 7.0].into_iter().enumerate() {
            let _ = buffers[i % 2].submit(&[0.0, ts as f32], ts);
            if let Some(s) = ticker.tick() {
                published.push(s.timestamp);
            }
        }
        assert_eq!(published, vec![1.0, 2.5, 3.0, 7.0]);
    }

    #[test]
    fn silence_is_flagged_once_and_cleared() {
        let (catalog, buffers) = setup();
        let mut ticker =
            Ticker::new(&catalog, buffers.clone()).with_silence_threshold(Duration::from_secs(3));

        let t0 = Instant::now();
        ticker.tick_at(t0);
        assert_eq!(ticker.silent, vec![false, false]);

        buffers[0].submit_at(&[0.0, 1.0], 1.0, t0).unwrap();
        ticker.tick_at(t0 + Duration::from_secs(2));
        assert_eq!(ticker.silent, vec![false, false]);

        ticker.tick_at(t0 + Duration::from_secs(5));
        assert_eq!(ticker.silent, vec![true, false], "never-seen frames are not silent");

        buffers[0].submit_at(&[0.0, 2.0], 2.0, t0 + Duration::from_secs(6)).unwrap();
        ticker.tick_at(t0 + Duration::from_secs(6));
        assert_eq!(ticker.silent, vec![false, false]);
    }
}
