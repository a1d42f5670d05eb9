//! # scopeline
//!
//! Multi-rate telemetry conditioning for live plotting.
//!
//! Frames of named variables arrive on their own irregular cadence. Each frame
//! has a sample buffer that rejects stale input and quantizes signal channels;
//! a fixed-rate ticker merges the buffers into one globally indexed state
//! vector; rolling windows keep the recent history as sharded, u16-indexed
//! point arrays a rendering backend can draw incrementally.
//!
//! ## Quick Start
//!
//! ```
//! use scopeline::prelude::*;
//! use std::time::Duration;
//!
//! let catalog = Catalog::builder()
//!     .variable(VariableSpec {
//!         uuid: "load".into(),
//!         topic: "sim".into(),
//!         local_index: 0,
//!         data_type: "float".into(),
//!         ..Default::default()
//!     })
//!     .variable(VariableSpec {
//!         uuid: "time".into(),
//!         topic: "sim".into(),
//!         local_index: 1,
//!         data_type: "float".into(),
//!         ..Default::default()
//!     })
//!     .build()
//!     .unwrap();
//!
//! let buffers = FrameSampleBuffer::for_catalog(&catalog);
//! let mut ticker = Ticker::new(&catalog, buffers.clone());
//! let period = Duration::from_millis(100);
//! let mut window =
//!     RollingWindow::new(&catalog, &[0], WindowStyle::Line, Duration::from_secs(5), period).unwrap();
//!
//! buffers[0].submit(&[0.25, 1.0], 1.0).unwrap();
//! if let Some(state) = ticker.tick() {
//!     window.add(&state.values, state.timestamp, period).unwrap();
//! }
//! assert_eq!(window.cursor(), 1);
//! ```
//!
//! ## Feature Flags
//!
//! - `runtime` (default): tokio session orchestration and message sources
//! - `bytemuck`: `Pod` points for zero-copy upload
//!
//! ## Modules
//!
//! - [`catalog`]: variable and frame descriptors
//! - [`sample`]: frame sample buffers and the global collector
//! - [`ticker`]: fixed-period merge and publish
//! - [`window`]: rolling window buffers and draw ranges
//! - [`capture`]: delayed block capture and scope windows
//! - [`charts`]: per-plot views built from an experiment definition

#[path = "core/catalog.rs"]
pub mod catalog;

#[path = "core/experiment.rs"]
pub mod experiment;

#[path = "core/wire.rs"]
pub mod wire;

#[path = "core/sample.rs"]
pub mod sample;

#[path = "core/ticker.rs"]
pub mod ticker;

#[path = "core/window.rs"]
pub mod window;

#[path = "core/capture.rs"]
pub mod capture;

#[path = "core/charts.rs"]
pub mod charts;

#[cfg(feature = "runtime")]
#[path = "core/transport.rs"]
pub mod transport;

#[cfg(feature = "runtime")]
#[path = "core/session.rs"]
pub mod session;

/// Prelude module for convenient imports.
///
/// ```
/// use scopeline::prelude::*;
/// ```
pub mod prelude {
    pub use crate::capture::{BlockCapture, Capture, DelayedBlock, ScopeWindow};
    pub use crate::catalog::{Catalog, FrameId, ValueKind, VarId, VariableSpec};
    pub use crate::charts::{AlertPanel, Chart, ChartSet, ChartView};
    pub use crate::experiment::{ExperimentDefinition, PlotKind};
    pub use crate::sample::{FrameSample, FrameSampleBuffer, GlobalCollector, StateSnapshot, Submission};
    pub use crate::ticker::Ticker;
    pub use crate::window::{Bounds, DrawRange, Point, RollingWindow, ValueOverride, WindowStyle};
    #[cfg(feature = "runtime")]
    pub use crate::session::{Session, SessionConfig, TimeSource};
    #[cfg(feature = "runtime")]
    pub use crate::transport::{ChannelSource, MessageSource, TcpSource};
}
