//! Delayed block capture and the scope window that consumes it.
//!
//! A [`BlockCapture`] accumulates a fixed number of accepted samples of one
//! frame and hands them off as a single immutable [`DelayedBlock`]. Stale
//! rejection and signal quantization follow the frame sample buffer rules.

use crate::catalog::{Catalog, CatalogError, FrameDescriptor, FrameId, Rgba, VarId, TIMESTAMP_SLOT};
use crate::sample::{quantize_signal, SampleError};
use crate::window::{
    partition, resolve_value_range, Bounds, DrawRange, Extrema, Shard, ValueOverride, WindowError,
    WindowStyle,
};
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_BLOCK_SAMPLES: usize = 1000;

/// `num_vars × num_samples` floats, sample-major.
#[derive(Debug, Clone, PartialEq)]
pub struct DelayedBlock {
    pub frame: FrameId,
    pub num_vars: usize,
    pub num_samples: usize,
    values: Vec<f32>,
}

impl DelayedBlock {
    #[inline]
    pub fn index(&self, sample: usize, var: usize) -> usize {
        self.num_vars * sample + var
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn get(&self, sample: usize, var: usize) -> Option<f32> {
        if sample >= self.num_samples || var >= self.num_vars {
            return None;
        }
        self.values.get(self.index(sample, var)).copied()
    }

    /// One sample, in frame-local order.
    pub fn sample(&self, sample: usize) -> Option<&[f32]> {
        if sample >= self.num_samples {
            return None;
        }
        let start = self.index(sample, 0);
        self.values.get(start..start + self.num_vars)
    }

    /// Source time of a sample; the sample index when the frame has no time slot.
    pub fn time_at(&self, sample: usize) -> f64 {
        match self.get(sample, TIMESTAMP_SLOT) {
            Some(t) => f64::from(t),
            None => sample as f64,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Capture {
    Stale,
    Stored { filled: usize },
    Complete(DelayedBlock),
}

#[derive(Debug)]
pub struct BlockCapture {
    frame: FrameId,
    topic: String,
    num_vars: usize,
    num_samples: usize,
    signal_slots: Vec<usize>,
    values: Vec<f32>,
    filled: usize,
    last_timestamp: f64,
}

impl BlockCapture {
    pub fn new(frame: FrameId, descriptor: &FrameDescriptor, num_samples: usize) -> Self {
        let num_samples = num_samples.max(1);
        let num_vars = descriptor.len();
        Self {
            frame,
            topic: descriptor.topic.clone(),
            num_vars,
            num_samples,
            signal_slots: descriptor.signal_slots.clone(),
            values: vec![0.0; num_vars * num_samples],
            filled: 0,
            last_timestamp: f64::NEG_INFINITY,
        }
    }

    pub fn frame(&self) -> FrameId {
        self.frame
    }

    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    pub fn filled(&self) -> usize {
        self.filled
    }

    pub fn push(&mut self, raw: &[f32], timestamp: f64) -> Result<Capture, SampleError> {
        if raw.len() != self.num_vars {
            return Err(SampleError::LengthMismatch {
                frame: self.topic.clone(),
                expected: self.num_vars,
                got: raw.len(),
            });
        }
        if !timestamp.is_finite() {
            return Err(SampleError::NonFiniteTimestamp {
                frame: self.topic.clone(),
                timestamp,
            });
        }
        if timestamp <= self.last_timestamp {
            warn!(
                "{}: block capture dropping stale sample at {} (last accepted {})",
                self.topic, timestamp, self.last_timestamp
            );
            return Ok(Capture::Stale);
        }
        self.last_timestamp = timestamp;

        let start = self.filled * self.num_vars;
        let row = &mut self.values[start..start + self.num_vars];
        row.copy_from_slice(raw);
        for &slot in &self.signal_slots {
            row[slot] = quantize_signal(row[slot]);
        }
        self.filled += 1;

        if self.filled < self.num_samples {
            return Ok(Capture::Stored {
                filled: self.filled,
            });
        }

        self.filled = 0;
        let values = std::mem::replace(&mut self.values, vec![0.0; self.num_vars * self.num_samples]);
        debug!("{}: block of {} samples captured", self.topic, self.num_samples);
        Ok(Capture::Complete(DelayedBlock {
            frame: self.frame,
            num_vars: self.num_vars,
            num_samples: self.num_samples,
            values,
        }))
    }
}

/// Line view over the latest block of one frame.
#[derive(Debug, Clone)]
pub struct ScopeWindow {
    frame: FrameId,
    vars: Vec<VarId>,
    num_samples: usize,
    shards: Vec<Shard>,
    first_time: Option<f64>,
    last_time: Option<f64>,
}

impl ScopeWindow {
    /// Every variable must live in the same frame.
    pub fn new(catalog: &Catalog, vars: &[VarId], num_samples: usize) -> Result<Self, ScopeError> {
        let frame = catalog.common_frame(vars)?;
        let mut locals = Vec::with_capacity(vars.len());
        let mut colors: Vec<Rgba> = Vec::with_capacity(vars.len());
        for &id in vars {
            let v = catalog.variable(id).ok_or(CatalogError::UnknownVariable(id))?;
            locals.push(v.local_index);
            colors.push(v.color);
        }

        let num_samples = num_samples.max(2);
        let shards = partition(WindowStyle::Line, vars, &locals, &colors, num_samples)?;
        Ok(Self {
            frame,
            vars: vars.to_vec(),
            num_samples,
            shards,
            first_time: None,
            last_time: None,
        })
    }

    pub fn frame(&self) -> FrameId {
        self.frame
    }

    pub fn vars(&self) -> &[VarId] {
        &self.vars
    }

    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    pub fn shards(&self) -> &[Shard] {
        &self.shards
    }

    pub fn first_time(&self) -> Option<f64> {
        self.first_time
    }

    pub fn last_time(&self) -> Option<f64> {
        self.last_time
    }

    /// Replace the plotted block. Blocks of other frames or sizes are ignored.
    pub fn add(&mut self, block: &DelayedBlock) -> bool {
        if block.frame != self.frame || block.num_samples != self.num_samples {
            warn!(
                "Scope on frame {} ignoring block of frame {} ({} samples)",
                self.frame, block.frame, block.num_samples
            );
            return false;
        }

        for shard in &mut self.shards {
            shard.reset_extrema();
        }
        for s in 0..block.num_samples {
            let Some(row) = block.sample(s) else { break };
            let t = block.time_at(s) as f32;
            for shard in &mut self.shards {
                shard.write_line(s, t, row);
            }
        }
        self.first_time = Some(block.time_at(0));
        self.last_time = Some(block.time_at(block.num_samples - 1));
        true
    }

    pub fn extrema(&self) -> Option<Extrema> {
        let mut acc: Option<Extrema> = None;
        for e in self.shards.iter().filter_map(Shard::extrema) {
            acc = Some(match acc {
                Some(a) => Extrema {
                    min: a.min.min(e.min),
                    max: a.max.max(e.max),
                },
                None => e,
            });
        }
        acc
    }

    /// The whole block, without the closing segment.
    pub fn draw_range(&self) -> DrawRange {
        DrawRange::new(0, self.num_samples - 1)
    }

    pub fn bounds(&self, overrides: ValueOverride) -> Bounds {
        let (min_value, max_value) = resolve_value_range(self.extrema(), overrides);
        Bounds {
            min_time: self.first_time.unwrap_or(0.0),
            max_time: self.last_time.unwrap_or(0.0),
            min_value,
            max_value,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ScopeError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Window(#[from] WindowError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::VariableSpec;

    fn catalog() -> Catalog {
        let var = |uuid: &str, topic: &str, local_index, data_type: &str| VariableSpec {
            uuid: uuid.to_string(),
            topic: topic.to_string(),
            local_index,
            data_type: data_type.to_string(),
            ..Default::default()
        };
        Catalog::builder()
            .variable(var("v", "scope", 0, "float"))
            .variable(var("t", "scope", 1, "float"))
            .variable(var("trig", "scope", 2, "bool"))
            .variable(var("x", "other", 0, "float"))
            .build()
            .unwrap()
    }

    #[test]
    fn flushes_exactly_once_per_block() {
        let catalog = catalog();
        let mut cap = BlockCapture::new(0, catalog.frame(0).unwrap(), 4);

        let mut blocks = Vec::new();
        for i in 0..10 {
            match cap.push(&[i as f32, i as f32, 0.9], i as f64).unwrap() {
                Capture::Complete(block) => blocks.push(block),
                Capture::Stored { filled } => assert_eq!(filled, i % 4 + 1),
                Capture::Stale => unreachable!(),
            }
        }

        assert_eq!(blocks.len(), 2);
        assert_eq!(cap.filled(), 2);
        let second = &blocks[1];
        assert_eq!(second.values().len(), 3 * 4);
        assert_eq!(second.sample(0), Some(&[4.0, 4.0, 1.0][..]));
        assert_eq!(second.get(3, 0), Some(7.0));
        assert_eq!(second.get(4, 0), None);
        assert_eq!(second.time_at(2), 6.0);
    }

    #[test]
    fn stale_samples_do_not_count() {
        let catalog = catalog();
        let mut cap = BlockCapture::new(0, catalog.frame(0).unwrap(), 2);
        assert!(matches!(cap.push(&[0.0, 5.0, 0.0], 5.0), Ok(Capture::Stored { filled: 1 })));
        assert_eq!(cap.push(&[0.0, 5.0, 0.0], 5.0), Ok(Capture::Stale));
        assert_eq!(cap.push(&[0.0, 4.0, 0.0], 4.0), Ok(Capture::Stale));
        assert!(cap.push(&[0.0], 6.0).is_err());
        assert!(matches!(cap.push(&[0.0, 6.0, 0.0], 6.0), Ok(Capture::Complete(_))));
    }

    #[test]
    fn scope_requires_a_common_frame() {
        let catalog = catalog();
        assert!(ScopeWindow::new(&catalog, &[0, 2], 8).is_ok());
        assert!(matches!(
            ScopeWindow::new(&catalog, &[0, 3], 8),
            Err(ScopeError::Catalog(CatalogError::NoCommonFrame { .. }))
        ));
        assert!(matches!(
            ScopeWindow::new(&catalog, &[], 8),
            Err(ScopeError::Catalog(CatalogError::Empty))
        ));
    }

    #[test]
    fn scope_plots_a_block_against_source_time() {
        let catalog = catalog();
        let mut cap = BlockCapture::new(0, catalog.frame(0).unwrap(), 3);
        let mut scope = ScopeWindow::new(&catalog, &[2, 0], 3).unwrap();

        let mut block = None;
        for (v, t) in [(1.0, 10.0), (-2.0, 10.5), (4.0, 11.0)] {
            if let Capture::Complete(b) = cap.push(&[v, t, v], f64::from(t)).unwrap() {
                block = Some(b);
            }
        }
        let block = block.unwrap();
        assert!(scope.add(&block));

        assert_eq!(scope.first_time(), Some(10.0));
        assert_eq!(scope.last_time(), Some(11.0));
        assert_eq!(scope.extrema(), Some(Extrema { min: -2.0, max: 4.0 }));
        assert_eq!(scope.draw_range(), DrawRange::new(0, 2));

        let points = scope.shards()[0].points();
        // [trig, v] per sample
        assert_eq!((points[0].y, points[1].y), (1.0, 1.0));
        assert_eq!((points[2].t, points[2].y, points[3].y), (10.5, 0.0, -2.0));

        let b = scope.bounds(ValueOverride::default());
        assert_eq!((b.min_time, b.max_time), (10.0, 11.0));
    }
}
