//! Session orchestration.
//!
//! One ingestion task per frame decodes messages into the frame's sample
//! buffer (and, for scoped frames, into its block capture). One ticker task
//! merges and publishes on a fixed period. Consumers subscribe to broadcast
//! channels of state snapshots and captured blocks.

use crate::capture::{BlockCapture, Capture, DelayedBlock, DEFAULT_BLOCK_SAMPLES};
use crate::catalog::{Catalog, FrameId};
use crate::sample::{FrameSampleBuffer, StateSnapshot};
use crate::ticker::{Ticker, DEFAULT_SILENCE_THRESHOLD};
use crate::transport::MessageSource;
use crate::wire::decode_frame_message;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Where a sample's timestamp comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeSource {
    /// Slot 1 of the frame payload.
    #[default]
    Source,
    /// Seconds since the session started.
    Local,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub tick_period: Duration,
    pub time_source: TimeSource,
    pub silence_threshold: Duration,
    pub block_samples: usize,
    /// Frames whose raw samples are also captured as blocks.
    pub capture_frames: Vec<FrameId>,
    pub channel_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_millis(33),
            time_source: TimeSource::Source,
            silence_threshold: DEFAULT_SILENCE_THRESHOLD,
            block_samples: DEFAULT_BLOCK_SAMPLES,
            capture_frames: Vec::new(),
            channel_capacity: 64,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SessionError {
    #[error("no frame with id {0}")]
    UnknownFrame(FrameId),
    #[error("frame {0:?} has more than one source")]
    DuplicateSource(String),
    #[error("tick period must be non-zero")]
    ZeroPeriod,
}

#[derive(Debug)]
pub struct Session {
    catalog: Arc<Catalog>,
    buffers: Vec<Arc<FrameSampleBuffer>>,
    states: broadcast::Sender<Arc<StateSnapshot>>,
    blocks: broadcast::Sender<Arc<DelayedBlock>>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Session {
    /// Spawn the ingestion and ticker tasks. Must run inside a tokio runtime.
    ///
    /// Frames without a source stay unpopulated and are never merged.
    pub fn start<S, I>(catalog: Arc<Catalog>, cfg: SessionConfig, sources: I) -> Result<Self, SessionError>
    where
        S: MessageSource,
        I: IntoIterator<Item = (FrameId, S)>,
    {
        if cfg.tick_period.is_zero() {
            return Err(SessionError::ZeroPeriod);
        }
        for &frame in &cfg.capture_frames {
            catalog.frame(frame).ok_or(SessionError::UnknownFrame(frame))?;
        }

        let buffers = FrameSampleBuffer::for_catalog(&catalog);
        let (states, _) = broadcast::channel(cfg.channel_capacity.max(1));
        let (blocks, _) = broadcast::channel(cfg.channel_capacity.max(1));
        let cancel = CancellationToken::new();
        let started = Instant::now();

        let mut ingest = Vec::new();
        let mut taken = vec![false; buffers.len()];
        for (frame, source) in sources {
            let buffer = buffers.get(frame).ok_or(SessionError::UnknownFrame(frame))?;
            if std::mem::replace(&mut taken[frame], true) {
                return Err(SessionError::DuplicateSource(buffer.topic().to_string()));
            }
            let capture = cfg.capture_frames.contains(&frame).then(|| {
                // frame id validated above
                let descriptor = &catalog.frames()[frame];
                BlockCapture::new(frame, descriptor, cfg.block_samples)
            });
            ingest.push(Ingest {
                buffer: Arc::clone(buffer),
                capture,
                blocks: blocks.clone(),
                clock: (cfg.time_source == TimeSource::Local).then_some(started),
                scratch: vec![0.0; buffer.len()],
                source,
            });
        }

        let mut tasks = Vec::with_capacity(ingest.len() + 1);
        for task in ingest {
            tasks.push(tokio::spawn(task.run(cancel.clone())));
        }

        let ticker = Ticker::new(&catalog, buffers.clone()).with_silence_threshold(cfg.silence_threshold);
        tasks.push(tokio::spawn(run_ticker(
            ticker,
            cfg.tick_period,
            states.clone(),
            cancel.clone(),
        )));

        info!(
            "Session started: {} frame(s), {} source(s), tick {:?}",
            buffers.len(),
            tasks.len() - 1,
            cfg.tick_period
        );

        Ok(Self {
            catalog,
            buffers,
            states,
            blocks,
            cancel,
            tasks,
        })
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn buffers(&self) -> &[Arc<FrameSampleBuffer>] {
        &self.buffers
    }

    pub fn subscribe_states(&self) -> broadcast::Receiver<Arc<StateSnapshot>> {
        self.states.subscribe()
    }

    pub fn subscribe_blocks(&self) -> broadcast::Receiver<Arc<DelayedBlock>> {
        self.blocks.subscribe()
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel every task and wait for all of them to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                error!("Session task failed: {}", e);
            }
        }
        info!("Session stopped");
    }
}

struct Ingest<S> {
    source: S,
    buffer: Arc<FrameSampleBuffer>,
    capture: Option<BlockCapture>,
    blocks: broadcast::Sender<Arc<DelayedBlock>>,
    clock: Option<Instant>,
    scratch: Vec<f32>,
}

impl<S: MessageSource> Ingest<S> {
    async fn run(mut self, cancel: CancellationToken) {
        loop {
            let message = tokio::select! {
                _ = cancel.cancelled() => break,
                message = self.source.recv() => message,
            };
            match message {
                Ok(Some(parts)) => self.handle(&parts),
                Ok(None) => {
                    info!("{}: source closed", self.buffer.topic());
                    break;
                }
                Err(e) => {
                    error!("{}: receive failed: {}", self.buffer.topic(), e);
                    break;
                }
            }
        }
        debug!("{}: ingestion stopped", self.buffer.topic());
    }

    fn handle(&mut self, parts: &[Vec<u8>]) {
        let source_time = match decode_frame_message(parts, &mut self.scratch) {
            Ok(t) => t,
            Err(e) => {
                self.buffer.mark_seen(std::time::Instant::now());
                warn!("{}: malformed payload: {}", self.buffer.topic(), e);
                return;
            }
        };

        let timestamp = match self.clock {
            Some(started) => started.elapsed().as_secs_f64(),
            None => match source_time {
                Some(t) => t,
                None => {
                    self.buffer.mark_seen(std::time::Instant::now());
                    warn!("{}: frame has no timestamp slot", self.buffer.topic());
                    return;
                }
            },
        };

        match self.buffer.submit(&self.scratch, timestamp) {
            Ok(_) => {}
            Err(e) => {
                warn!("{}: {}", self.buffer.topic(), e);
                return;
            }
        }

        if let Some(capture) = self.capture.as_mut() {
            match capture.push(&self.scratch, timestamp) {
                Ok(Capture::Complete(block)) => {
                    // No subscribers is fine.
                    let _ = self.blocks.send(Arc::new(block));
                }
                Ok(_) => {}
                Err(e) => warn!("{}: block capture: {}", self.buffer.topic(), e),
            }
        }
    }
}

async fn run_ticker(
    mut ticker: Ticker,
    period: Duration,
    states: broadcast::Sender<Arc<StateSnapshot>>,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                if let Some(snapshot) = ticker.tick() {
                    let _ = states.send(snapshot);
                }
            }
        }
    }
    debug!("Ticker stopped");
}
