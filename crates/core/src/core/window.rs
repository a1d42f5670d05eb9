//! Rolling window buffers.
//!
//! A window keeps the last `capacity` samples of a group of variables as
//! plottable points, in a circular, sample-major layout. Rendering backends
//! address vertices with u16 indices, so the group is split into shards that
//! each stay under [`INDEX_WIDTH_LIMIT`] vertices:
//!
//! ```text
//! shard_vars × points_per_sample × capacity ≤ 65_535
//! ```
//!
//! Segment `i` joins slot `i` and slot `i + 1`; the last segment joins slot
//! `capacity − 1` back to slot `0`. [`visible_ranges`] yields the segments
//! that do not touch the write cursor, which is where the newest and oldest
//! samples meet.

use crate::catalog::{Catalog, Rgba, VarId};
use std::ops::Range;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const INDEX_WIDTH_LIMIT: usize = u16::MAX as usize;

/// Samples kept per tick of the configured window, as `num / den` (1.5).
pub const OVERSAMPLE: (u128, u128) = (3, 2);

/// Smallest capacity for which every cursor position yields a drawable range.
pub const MIN_CAPACITY: usize = 4;

/// Value spans narrower than this are widened to one unit.
pub const BOUNDS_EPSILON: f32 = 1e-4;

pub fn window_capacity(window: Duration, period: Duration) -> usize {
    if period.is_zero() {
        return MIN_CAPACITY;
    }
    let (num, den) = OVERSAMPLE;
    let samples = (window.as_nanos() * num).div_ceil(period.as_nanos() * den);
    usize::try_from(samples).unwrap_or(usize::MAX).max(MIN_CAPACITY)
}

#[derive(Debug, Error, PartialEq)]
pub enum WindowError {
    #[error("capacity {capacity} × {points_per_sample} points per sample exceeds the u16 index range")]
    ShardOverflow {
        capacity: usize,
        points_per_sample: usize,
    },
    #[error("state vector has {got} values, variable {needed} is out of range")]
    SampleTooShort { needed: VarId, got: usize },
    #[error("unknown variable index {0}")]
    UnknownVariable(VarId),
    #[error("window has no variables")]
    Empty,
    #[error("tick period must be non-zero")]
    ZeroPeriod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowStyle {
    /// One point per variable per sample.
    Line,
    /// Lower/upper point pair per variable per sample, stacked by sign.
    Stack,
}

impl WindowStyle {
    pub fn points_per_sample(self) -> usize {
        match self {
            WindowStyle::Line => 1,
            WindowStyle::Stack => 2,
        }
    }

    /// Index-list entries a segment contributes per variable.
    pub fn elements_per_segment(self) -> usize {
        match self {
            WindowStyle::Line => 1,
            WindowStyle::Stack => 2,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "bytemuck", derive(bytemuck::Pod, bytemuck::Zeroable))]
pub struct Point {
    pub t: f32,
    pub y: f32,
    pub color: Rgba,
}

/// `(start, len)` in segment units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawRange {
    pub start: usize,
    pub len: usize,
}

impl DrawRange {
    pub fn new(start: usize, len: usize) -> Self {
        Self { start, len }
    }

    pub fn segments(&self) -> Range<usize> {
        self.start..self.start + self.len
    }
}

/// One or two ranges; two when the visible history wraps around the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibleRanges {
    ranges: [DrawRange; 2],
    count: usize,
}

impl VisibleRanges {
    fn one(a: DrawRange) -> Self {
        Self {
            ranges: [a, DrawRange::new(0, 0)],
            count: 1,
        }
    }

    fn two(a: DrawRange, b: DrawRange) -> Self {
        Self {
            ranges: [a, b],
            count: 2,
        }
    }

    pub fn as_slice(&self) -> &[DrawRange] {
        &self.ranges[..self.count]
    }

    pub fn iter(&self) -> impl Iterator<Item = &DrawRange> {
        self.as_slice().iter()
    }

    pub fn total_len(&self) -> usize {
        self.iter().map(|r| r.len).sum()
    }

    /// `[[start, len], ...]`, the shape a draw call consumes.
    pub fn to_pairs(&self) -> Vec<[usize; 2]> {
        self.iter().map(|r| [r.start, r.len]).collect()
    }
}

/// Segments drawable for a buffer whose next write goes to `cursor`.
///
/// The two segments touching `cursor` are skipped; everything else
/// (`capacity − 2` segments) is covered exactly once. `capacity` must be at
/// least [`MIN_CAPACITY`].
pub fn visible_ranges(cursor: usize, capacity: usize) -> VisibleRanges {
    debug_assert!(capacity >= MIN_CAPACITY && cursor < capacity);
    if cursor == 0 {
        VisibleRanges::one(DrawRange::new(1, capacity - 2))
    } else if cursor == 1 {
        VisibleRanges::one(DrawRange::new(2, capacity - 2))
    } else if cursor == capacity - 1 {
        VisibleRanges::one(DrawRange::new(0, capacity - 2))
    } else {
        VisibleRanges::two(
            DrawRange::new(0, cursor - 1),
            DrawRange::new(cursor + 1, capacity - cursor - 1),
        )
    }
}

/// Running extrema.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extrema {
    pub min: f32,
    pub max: f32,
}

impl Extrema {
    fn widen(slot: &mut Option<Extrema>, lo: f32, hi: f32) {
        if lo.is_nan() || hi.is_nan() {
            return;
        }
        *slot = Some(match *slot {
            Some(e) => Extrema {
                min: e.min.min(lo),
                max: e.max.max(hi),
            },
            None => Extrema { min: lo, max: hi },
        });
    }
}

/// A slice of a window's variables with its own vertex array.
#[derive(Debug, Clone)]
pub struct Shard {
    style: WindowStyle,
    vars: Vec<VarId>,
    /// Where each variable is read from in the vectors passed to `write_*`.
    slots: Vec<usize>,
    colors: Vec<Rgba>,
    capacity: usize,
    points: Vec<Point>,
    extrema: Option<Extrema>,
}

impl Shard {
    pub(crate) fn new(
        style: WindowStyle,
        vars: Vec<VarId>,
        slots: Vec<usize>,
        colors: Vec<Rgba>,
        capacity: usize,
    ) -> Self {
        let points_per_sample = vars.len() * style.points_per_sample();
        let mut points = vec![Point::default(); points_per_sample * capacity];
        for sample in points.chunks_mut(points_per_sample.max(1)) {
            for (k, point) in sample.iter_mut().enumerate() {
                point.color = colors[k / style.points_per_sample()];
            }
        }
        Self {
            style,
            vars,
            slots,
            colors,
            capacity,
            points,
            extrema: None,
        }
    }

    pub fn vars(&self) -> &[VarId] {
        &self.vars
    }

    pub fn colors(&self) -> &[Rgba] {
        &self.colors
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Line extrema over everything ever written. Not tracked for stacks.
    pub fn extrema(&self) -> Option<Extrema> {
        self.extrema
    }

    pub(crate) fn reset_extrema(&mut self) {
        self.extrema = None;
    }

    fn stride(&self) -> usize {
        self.vars.len() * self.style.points_per_sample()
    }

    pub fn vertex_index(&self, sample: usize, var: usize, upper: bool) -> u16 {
        let idx = sample * self.stride() + var * self.style.points_per_sample() + upper as usize;
        idx as u16
    }

    pub(crate) fn write_line(&mut self, sample: usize, t: f32, values: &[f32]) {
        let base = sample * self.stride();
        for (k, &slot) in self.slots.iter().enumerate() {
            let y = values[slot];
            let point = &mut self.points[base + k];
            point.t = t;
            point.y = y;
            Extrema::widen(&mut self.extrema, y, y);
        }
    }

    /// Lay this shard's variables onto the running sums `pos`/`neg`.
    pub(crate) fn write_stack(
        &mut self,
        sample: usize,
        t: f32,
        values: &[f32],
        pos: &mut f32,
        neg: &mut f32,
    ) {
        let base = sample * self.stride();
        for (k, &slot) in self.slots.iter().enumerate() {
            let v = values[slot];
            let running = if v > 0.0 { &mut *pos } else { &mut *neg };
            let lower = *running;
            let upper = lower + v;
            *running = upper;

            let i = base + 2 * k;
            self.points[i].t = t;
            self.points[i].y = lower;
            self.points[i + 1].t = t;
            self.points[i + 1].y = upper;
        }
    }

    fn segment_ends(&self, segment: usize) -> (usize, usize) {
        if segment + 1 < self.capacity {
            (segment, segment + 1)
        } else {
            (0, self.capacity - 1)
        }
    }

    /// One `[a, b]` pair per variable per segment, segment-major.
    pub fn line_indices(&self) -> Vec<[u16; 2]> {
        let mut out = Vec::with_capacity(self.capacity * self.vars.len());
        for segment in 0..self.capacity {
            let (a, b) = self.segment_ends(segment);
            for var in 0..self.vars.len() {
                out.push([
                    self.vertex_index(a, var, false),
                    self.vertex_index(b, var, false),
                ]);
            }
        }
        out
    }

    /// Two triangles per variable per segment filling the lower/upper band.
    pub fn band_indices(&self) -> Vec<[u16; 3]> {
        let mut out = Vec::with_capacity(2 * self.capacity * self.vars.len());
        for segment in 0..self.capacity {
            let (a, b) = self.segment_ends(segment);
            for var in 0..self.vars.len() {
                let (a_lo, a_hi) = (self.vertex_index(a, var, false), self.vertex_index(a, var, true));
                let (b_lo, b_hi) = (self.vertex_index(b, var, false), self.vertex_index(b, var, true));
                out.push([a_lo, a_hi, b_lo]);
                out.push([a_hi, b_hi, b_lo]);
            }
        }
        out
    }

    /// Entries of this shard's index list covering `range`.
    pub fn element_range(&self, range: DrawRange) -> Range<usize> {
        let per_segment = self.vars.len() * self.style.elements_per_segment();
        range.start * per_segment..(range.start + range.len) * per_segment
    }
}

/// Split `vars` sequentially into shards that fit the index ceiling.
pub(crate) fn partition(
    style: WindowStyle,
    vars: &[VarId],
    slots: &[usize],
    colors: &[Rgba],
    capacity: usize,
) -> Result<Vec<Shard>, WindowError> {
    let points_per_sample = style.points_per_sample();
    let per_shard = INDEX_WIDTH_LIMIT / (capacity * points_per_sample);
    if per_shard == 0 {
        return Err(WindowError::ShardOverflow {
            capacity,
            points_per_sample,
        });
    }
    Ok((0..vars.len())
        .step_by(per_shard)
        .map(|start| {
            let end = (start + per_shard).min(vars.len());
            Shard::new(
                style,
                vars[start..end].to_vec(),
                slots[start..end].to_vec(),
                colors[start..end].to_vec(),
                capacity,
            )
        })
        .collect())
}

/// Explicit per-plot bounds that override the observed range.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ValueOverride {
    pub min: Option<f32>,
    pub max: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_time: f64,
    pub max_time: f64,
    pub min_value: f32,
    pub max_value: f32,
}

/// Observed range (or `[0, 1]`), then overrides, then the degenerate guard.
pub fn resolve_value_range(observed: Option<Extrema>, overrides: ValueOverride) -> (f32, f32) {
    let (mut lo, mut hi) = observed.map_or((0.0, 1.0), |e| (e.min, e.max));
    if let Some(min) = overrides.min {
        lo = min;
    }
    if let Some(max) = overrides.max {
        hi = max;
    }
    if (hi - lo).abs() < BOUNDS_EPSILON {
        hi = lo + 1.0;
    }
    (lo, hi)
}

#[derive(Debug, Clone)]
pub struct RollingWindow {
    style: WindowStyle,
    vars: Vec<VarId>,
    colors: Vec<Rgba>,
    /// Smallest state-vector length that covers every variable.
    required_len: usize,
    window: Duration,
    period: Duration,
    capacity: usize,
    cursor: usize,
    shards: Vec<Shard>,
    /// Stack sums; lines keep extrema per shard.
    stack_extrema: Option<Extrema>,
    last_timestamp: Option<f64>,
}

impl RollingWindow {
    pub fn new(
        catalog: &Catalog,
        vars: &[VarId],
        style: WindowStyle,
        window: Duration,
        period: Duration,
    ) -> Result<Self, WindowError> {
        if vars.is_empty() {
            return Err(WindowError::Empty);
        }
        let colors = vars
            .iter()
            .map(|&id| catalog.color(id).map_err(|_| WindowError::UnknownVariable(id)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut this = Self {
            style,
            vars: vars.to_vec(),
            colors,
            required_len: vars.iter().max().map_or(0, |&m| m + 1),
            window,
            period,
            capacity: 0,
            cursor: 0,
            shards: Vec::new(),
            stack_extrema: None,
            last_timestamp: None,
        };
        this.rebuild()?;
        Ok(this)
    }

    /// Recompute capacity and shards; history is dropped.
    pub fn rebuild(&mut self) -> Result<(), WindowError> {
        if self.period.is_zero() {
            return Err(WindowError::ZeroPeriod);
        }
        let capacity = window_capacity(self.window, self.period);
        self.shards = partition(self.style, &self.vars, &self.vars, &self.colors, capacity)?;
        self.capacity = capacity;
        self.cursor = 0;
        self.stack_extrema = None;
        self.last_timestamp = None;
        debug!(
            "Rolling window rebuilt: {} vars, capacity {}, {} shard(s)",
            self.vars.len(),
            capacity,
            self.shards.len()
        );
        Ok(())
    }

    pub fn set_window(&mut self, window: Duration) -> Result<(), WindowError> {
        if window != self.window {
            self.window = window;
            self.rebuild()?;
        }
        Ok(())
    }

    pub fn set_period(&mut self, period: Duration) -> Result<(), WindowError> {
        if period != self.period {
            self.period = period;
            self.rebuild()?;
        }
        Ok(())
    }

    /// Append one state vector (global-index order) at `timestamp`.
    pub fn add(&mut self, values: &[f32], timestamp: f64, period: Duration) -> Result<(), WindowError> {
        if values.len() < self.required_len {
            return Err(WindowError::SampleTooShort {
                needed: self.required_len - 1,
                got: values.len(),
            });
        }
        self.set_period(period)?;

        let t = timestamp as f32;
        match self.style {
            WindowStyle::Line => {
                for shard in &mut self.shards {
                    shard.write_line(self.cursor, t, values);
                }
            }
            WindowStyle::Stack => {
                let (mut pos, mut neg) = (0.0f32, 0.0f32);
                for shard in &mut self.shards {
                    shard.write_stack(self.cursor, t, values, &mut pos, &mut neg);
                }
                Extrema::widen(&mut self.stack_extrema, neg, pos);
            }
        }

        self.cursor = (self.cursor + 1) % self.capacity;
        self.last_timestamp = Some(timestamp);
        Ok(())
    }

    pub fn style(&self) -> WindowStyle {
        self.style
    }

    pub fn vars(&self) -> &[VarId] {
        &self.vars
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn shards(&self) -> &[Shard] {
        &self.shards
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.last_timestamp
    }

    pub fn visible_ranges(&self) -> VisibleRanges {
        visible_ranges(self.cursor, self.capacity)
    }

    pub fn value_range(&self) -> Option<Extrema> {
        match self.style {
            WindowStyle::Stack => self.stack_extrema,
            WindowStyle::Line => {
                let mut acc = None;
                for e in self.shards.iter().filter_map(Shard::extrema) {
                    Extrema::widen(&mut acc, e.min, e.max);
                }
                acc
            }
        }
    }

    pub fn bounds(&self, overrides: ValueOverride) -> Bounds {
        let max_time = self.last_timestamp.unwrap_or(0.0);
        let (min_value, max_value) = resolve_value_range(self.value_range(), overrides);
        Bounds {
            min_time: max_time - self.window.as_secs_f64(),
            max_time,
            min_value,
            max_value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::VariableSpec;

    fn catalog(n: usize) -> Catalog {
        let mut builder = Catalog::builder();
        for i in 0..n {
            builder.push(VariableSpec {
                uuid: format!("v{i}"),
                topic: "sim".to_string(),
                local_index: i,
                data_type: "float".to_string(),
                ..Default::default()
            });
        }
        builder.build().unwrap()
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn capacity_oversamples_the_window() {
        assert_eq!(window_capacity(Duration::from_secs(10), ms(100)), 150);
        assert_eq!(window_capacity(Duration::from_secs(1), ms(3)), 500);
        assert_eq!(window_capacity(ms(10), ms(100)), MIN_CAPACITY);
        assert_eq!(window_capacity(Duration::from_secs(1), Duration::ZERO), MIN_CAPACITY);
    }

    #[test]
    fn ranges_skip_segments_around_the_cursor() {
        assert_eq!(visible_ranges(2, 6).to_pairs(), vec![[0, 1], [3, 3]]);
        assert_eq!(visible_ranges(0, 6).to_pairs(), vec![[1, 4]]);
        assert_eq!(visible_ranges(1, 6).to_pairs(), vec![[2, 4]]);
        assert_eq!(visible_ranges(5, 6).to_pairs(), vec![[0, 4]]);
    }

    #[test]
    fn ranges_cover_all_but_two_segments() {
        for capacity in MIN_CAPACITY..40 {
            for cursor in 0..capacity {
                let ranges = visible_ranges(cursor, capacity);
                assert_eq!(ranges.total_len(), capacity - 2);

                let before = (cursor + capacity - 1) % capacity;
                let mut seen = vec![false; capacity];
                for r in ranges.iter() {
                    assert!(r.len > 0);
                    for s in r.segments() {
                        assert!(s < capacity);
                        assert!(!seen[s], "segment {s} covered twice");
                        assert!(s != cursor && s != before);
                        seen[s] = true;
                    }
                }
            }
        }
    }

    #[test]
    fn cursor_wraps_after_capacity_inserts() {
        let catalog = catalog(2);
        // 0.4 s / 100 ms × 1.5 = 6
        let mut w = RollingWindow::new(&catalog, &[0, 1], WindowStyle::Line, ms(400), ms(100)).unwrap();
        assert_eq!(w.capacity(), 6);

        for i in 0..8 {
            w.add(&[i as f32, -(i as f32)], i as f64, ms(100)).unwrap();
        }
        assert_eq!(w.cursor(), 2);
        assert_eq!(w.visible_ranges().to_pairs(), vec![[0, 1], [3, 3]]);

        let shard = &w.shards()[0];
        // slot 1 was overwritten by sample 7
        assert_eq!(shard.points()[2].y, 7.0);
        assert_eq!(shard.points()[3].y, -7.0);
        assert_eq!(shard.points()[4].y, 2.0);
        assert_eq!(
            w.value_range(),
            Some(Extrema { min: -7.0, max: 7.0 })
        );
    }

    #[test]
    fn stack_lays_signs_on_separate_baselines() {
        let catalog = catalog(3);
        let mut w = RollingWindow::new(&catalog, &[0, 1, 2], WindowStyle::Stack, ms(400), ms(100)).unwrap();
        w.add(&[2.0, -1.0, 3.0], 1.0, ms(100)).unwrap();

        let p = w.shards()[0].points();
        let pairs: Vec<(f32, f32)> = p[..6].chunks(2).map(|c| (c[0].y, c[1].y)).collect();
        assert_eq!(pairs, vec![(0.0, 2.0), (0.0, -1.0), (2.0, 5.0)]);
        assert_eq!(w.value_range(), Some(Extrema { min: -1.0, max: 5.0 }));
    }

    #[test]
    fn stack_sums_continue_across_shards() {
        let catalog = catalog(3);
        // one variable per shard: 65_535 / (2 × 30_000) = 1
        let window = ms(20_000_000);
        let period = ms(1000);
        assert_eq!(window_capacity(window, period), 30_000);
        let mut w = RollingWindow::new(&catalog, &[0, 1, 2], WindowStyle::Stack, window, period).unwrap();
        assert_eq!(w.shards().len(), 3);

        w.add(&[2.0, -1.0, 3.0], 1.0, period).unwrap();
        let upper_of = |s: usize| w.shards()[s].points()[1].y;
        assert_eq!((upper_of(0), upper_of(1), upper_of(2)), (2.0, -1.0, 5.0));
    }

    #[test]
    fn shards_respect_the_index_ceiling() {
        let catalog = catalog(40);
        let vars: Vec<VarId> = (0..40).collect();
        for (window, style) in [
            (Duration::from_secs(60), WindowStyle::Line),
            (Duration::from_secs(60), WindowStyle::Stack),
            (Duration::from_secs(5), WindowStyle::Stack),
        ] {
            let w = RollingWindow::new(&catalog, &vars, style, window, ms(10)).unwrap();
            let covered: usize = w.shards().iter().map(|s| s.vars().len()).sum();
            assert_eq!(covered, 40);
            for shard in w.shards() {
                assert!(shard.vars().len() * style.points_per_sample() * w.capacity() <= INDEX_WIDTH_LIMIT);
                assert_eq!(shard.points().len(), shard.vars().len() * style.points_per_sample() * w.capacity());
            }
        }
    }

    #[test]
    fn overflowing_a_single_variable_is_an_error() {
        let catalog = catalog(1);
        let err = RollingWindow::new(&catalog, &[0], WindowStyle::Line, Duration::from_secs(1000), ms(10));
        assert!(matches!(err, Err(WindowError::ShardOverflow { capacity: 150_000, .. })));
    }

    #[test]
    fn period_change_rebuilds_and_drops_history() {
        let catalog = catalog(1);
        let mut w = RollingWindow::new(&catalog, &[0], WindowStyle::Line, ms(400), ms(100)).unwrap();
        w.add(&[1.0], 1.0, ms(100)).unwrap();
        w.add(&[2.0], 2.0, ms(100)).unwrap();
        assert_eq!(w.cursor(), 2);

        w.add(&[3.0], 3.0, ms(50)).unwrap();
        assert_eq!(w.capacity(), 12);
        assert_eq!(w.cursor(), 1);
        assert_eq!(w.shards()[0].points()[0].y, 3.0);

        w.set_window(ms(800)).unwrap();
        assert_eq!(w.capacity(), 24);
        assert_eq!(w.cursor(), 0);
        assert_eq!(w.last_timestamp(), None);
    }

    #[test]
    fn short_state_vectors_are_rejected() {
        let catalog = catalog(3);
        let mut w = RollingWindow::new(&catalog, &[2], WindowStyle::Line, ms(400), ms(100)).unwrap();
        assert_eq!(
            w.add(&[1.0, 2.0], 1.0, ms(100)),
            Err(WindowError::SampleTooShort { needed: 2, got: 2 })
        );
        assert_eq!(w.cursor(), 0);
        assert!(matches!(
            RollingWindow::new(&catalog, &[7], WindowStyle::Line, ms(400), ms(100)),
            Err(WindowError::UnknownVariable(7))
        ));
    }

    #[test]
    fn index_lists_close_the_ring() {
        let catalog = catalog(2);
        let w = RollingWindow::new(&catalog, &[0, 1], WindowStyle::Line, ms(400), ms(100)).unwrap();
        let shard = &w.shards()[0];
        let lines = shard.line_indices();
        assert_eq!(lines.len(), 12);
        assert_eq!(lines[0], [0, 2]);
        assert_eq!(lines[1], [1, 3]);
        assert_eq!(lines[10], [0, 10]);
        assert_eq!(shard.element_range(DrawRange::new(3, 3)), 6..12);

        let s = RollingWindow::new(&catalog, &[0, 1], WindowStyle::Stack, ms(400), ms(100)).unwrap();
        let bands = s.shards()[0].band_indices();
        assert_eq!(bands.len(), 24);
        assert_eq!(bands[0], [0, 1, 4]);
        assert_eq!(bands[1], [1, 5, 4]);
        assert_eq!(s.shards()[0].element_range(DrawRange::new(1, 2)), 4..12);
    }

    #[test]
    fn bounds_apply_overrides_and_the_degenerate_guard() {
        let catalog = catalog(1);
        let mut w = RollingWindow::new(&catalog, &[0], WindowStyle::Line, Duration::from_secs(2), ms(100)).unwrap();
        assert_eq!(
            w.bounds(ValueOverride::default()),
            Bounds { min_time: -2.0, max_time: 0.0, min_value: 0.0, max_value: 1.0 }
        );

        w.add(&[4.0], 10.0, ms(100)).unwrap();
        let b = w.bounds(ValueOverride::default());
        assert_eq!((b.min_time, b.max_time), (8.0, 10.0));
        assert_eq!((b.min_value, b.max_value), (4.0, 5.0));

        w.add(&[6.0], 10.1, ms(100)).unwrap();
        let b = w.bounds(ValueOverride { min: Some(-1.0), max: None });
        assert_eq!((b.min_value, b.max_value), (-1.0, 6.0));
    }
}
