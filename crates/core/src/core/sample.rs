//! Per-frame sample buffers and the global collector.
//!
//! A [`FrameSampleBuffer`] is written by exactly one ingestion task and read by
//! the ticker. The accepted sample lives behind an [`ArcSwap`], so readers
//! never lock and always see a whole vector; the staging vector is guarded by
//! a mutex only the writer takes. Committing a sample swaps the staged vector
//! in and, when no reader still holds the previous one, recycles it as the
//! next staging vector.

use crate::catalog::{Catalog, FrameDescriptor, FrameId, VarId};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::warn;

/// Signal channels are boolean-like: anything above one half is "on".
#[inline]
pub fn quantize_signal(v: f32) -> f32 {
    if v > 0.5 {
        1.0
    } else {
        0.0
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SampleError {
    #[error("frame {frame:?}: expected {expected} values, got {got}")]
    LengthMismatch {
        frame: String,
        expected: usize,
        got: usize,
    },
    #[error("frame {frame:?}: timestamp {timestamp} is not finite")]
    NonFiniteTimestamp { frame: String, timestamp: f64 },
    #[error("unknown frame {0}")]
    UnknownFrame(FrameId),
}

/// Last accepted sample of a frame, in local-index order.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSample {
    pub values: Vec<f32>,
    pub timestamp: f64,
}

impl FrameSample {
    fn unpopulated(len: usize) -> Self {
        Self {
            values: vec![0.0; len],
            timestamp: f64::NEG_INFINITY,
        }
    }

    /// False until the first sample has been accepted.
    pub fn is_populated(&self) -> bool {
        self.timestamp.is_finite()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Submission {
    Accepted,
    /// Not newer than the last accepted sample; nothing changed.
    Stale { timestamp: f64, last: f64 },
}

#[derive(Debug)]
struct Staging {
    values: Vec<f32>,
    last_timestamp: f64,
}

#[derive(Debug)]
pub struct FrameSampleBuffer {
    frame: FrameId,
    topic: String,
    len: usize,
    signal_slots: Vec<usize>,
    staging: Mutex<Staging>,
    active: ArcSwap<FrameSample>,
    epoch: Instant,
    /// Microseconds since `epoch` plus one; zero means nothing received yet.
    last_seen_us: AtomicU64,
}

impl FrameSampleBuffer {
    pub fn new(frame: FrameId, descriptor: &FrameDescriptor) -> Self {
        let len = descriptor.len();
        Self {
            frame,
            topic: descriptor.topic.clone(),
            len,
            signal_slots: descriptor.signal_slots.clone(),
            staging: Mutex::new(Staging {
                values: vec![0.0; len],
                last_timestamp: f64::NEG_INFINITY,
            }),
            active: ArcSwap::from_pointee(FrameSample::unpopulated(len)),
            epoch: Instant::now(),
            last_seen_us: AtomicU64::new(0),
        }
    }

    /// One buffer per frame of the catalog, indexed by frame id.
    pub fn for_catalog(catalog: &Catalog) -> Vec<Arc<Self>> {
        catalog
            .frames()
            .iter()
            .enumerate()
            .map(|(id, frame)| Arc::new(Self::new(id, frame)))
            .collect()
    }

    pub fn frame(&self) -> FrameId {
        self.frame
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn submit(&self, raw: &[f32], timestamp: f64) -> Result<Submission, SampleError> {
        self.submit_at(raw, timestamp, Instant::now())
    }

    /// Validate, quantize and commit `raw` (local-index order).
    ///
    /// Any call counts as traffic for silence detection, even one that is
    /// rejected.
    pub fn submit_at(
        &self,
        raw: &[f32],
        timestamp: f64,
        now: Instant,
    ) -> Result<Submission, SampleError> {
        self.mark_seen(now);

        if raw.len() != self.len {
            return Err(SampleError::LengthMismatch {
                frame: self.topic.clone(),
                expected: self.len,
                got: raw.len(),
            });
        }
        if !timestamp.is_finite() {
            return Err(SampleError::NonFiniteTimestamp {
                frame: self.topic.clone(),
                timestamp,
            });
        }

        let mut staging = self.staging.lock();
        if timestamp <= staging.last_timestamp {
            warn!(
                "{}: dropping stale sample at {} (last accepted {})",
                self.topic, timestamp, staging.last_timestamp
            );
            return Ok(Submission::Stale {
                timestamp,
                last: staging.last_timestamp,
            });
        }

        staging.values.copy_from_slice(raw);
        for &slot in &self.signal_slots {
            staging.values[slot] = quantize_signal(staging.values[slot]);
        }

        let values = std::mem::take(&mut staging.values);
        let previous = self.active.swap(Arc::new(FrameSample { values, timestamp }));
        staging.values = match Arc::try_unwrap(previous) {
            Ok(sample) => sample.values,
            Err(_) => vec![0.0; self.len],
        };
        staging.last_timestamp = timestamp;

        Ok(Submission::Accepted)
    }

    /// Lock-free read of the last accepted sample.
    pub fn sample(&self) -> Arc<FrameSample> {
        self.active.load_full()
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        let ts = self.active.load().timestamp;
        ts.is_finite().then_some(ts)
    }

    /// Record traffic without a sample (e.g. a payload that failed to decode).
    pub fn mark_seen(&self, now: Instant) {
        let us = now.saturating_duration_since(self.epoch).as_micros() as u64;
        self.last_seen_us.store(us.saturating_add(1), Ordering::Relaxed);
    }

    /// Time since the last message, or `None` before the first one.
    pub fn idle_for(&self, now: Instant) -> Option<Duration> {
        match self.last_seen_us.load(Ordering::Relaxed) {
            0 => None,
            stamp => {
                let seen = self.epoch + Duration::from_micros(stamp - 1);
                Some(now.saturating_duration_since(seen))
            }
        }
    }
}

/// The merged state vector published on every tick.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    /// Indexed by global variable index.
    pub values: Vec<f32>,
    /// Most advanced timestamp merged so far.
    pub timestamp: f64,
}

#[derive(Debug, Clone)]
pub struct GlobalCollector {
    layouts: Vec<Vec<VarId>>,
    values: Vec<f32>,
    max_timestamp: Option<f64>,
}

impl GlobalCollector {
    pub fn new(catalog: &Catalog) -> Self {
        Self {
            layouts: catalog
                .frames()
                .iter()
                .map(|f| f.variables.clone())
                .collect(),
            values: vec![0.0; catalog.num_vars()],
            max_timestamp: None,
        }
    }

    /// Scatter a frame's sample into the global vector. Never rejects on time.
    pub fn merge(&mut self, frame: FrameId, sample: &[f32], timestamp: f64) -> Result<(), SampleError> {
        let layout = self
            .layouts
            .get(frame)
            .ok_or(SampleError::UnknownFrame(frame))?;
        if layout.len() != sample.len() {
            return Err(SampleError::LengthMismatch {
                frame: format!("#{frame}"),
                expected: layout.len(),
                got: sample.len(),
            });
        }

        for (&global, &v) in layout.iter().zip(sample) {
            self.values[global] = v;
        }
        self.max_timestamp = Some(match self.max_timestamp {
            Some(t) => t.max(timestamp),
            None => timestamp,
        });
        Ok(())
    }

    pub fn max_timestamp(&self) -> Option<f64> {
        self.max_timestamp
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Copy of the state vector; `None` until something has been merged.
    pub fn snapshot(&self) -> Option<StateSnapshot> {
        self.max_timestamp.map(|timestamp| StateSnapshot {
            values: self.values.clone(),
            timestamp,
        })
    }
}
