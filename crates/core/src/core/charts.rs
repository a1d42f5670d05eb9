//! Chart set: one view per plot of an experiment definition.

use crate::capture::{DelayedBlock, ScopeError, ScopeWindow};
use crate::catalog::{Catalog, FrameId, VarId};
use crate::experiment::{PlotEntry, PlotKind};
use crate::sample::StateSnapshot;
use crate::window::{Bounds, RollingWindow, ValueOverride, WindowError, WindowStyle};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Values above this trip an alert.
pub const ALERT_THRESHOLD: f32 = 0.5;

#[derive(Debug, Error, PartialEq)]
pub enum ChartError {
    #[error("plot {title:?}: {source}")]
    Window { title: String, source: WindowError },
    #[error("plot {title:?}: {source}")]
    Scope { title: String, source: ScopeError },
}

/// Watches signal variables and latches once any of them goes high.
#[derive(Debug, Clone)]
pub struct AlertPanel {
    vars: Vec<VarId>,
    labels: Vec<String>,
    last: Vec<f32>,
    latched: Vec<bool>,
}

impl AlertPanel {
    pub fn new(catalog: &Catalog, vars: &[VarId]) -> Self {
        let labels = vars
            .iter()
            .map(|&id| match catalog.variable(id) {
                Some(v) if !v.legend.is_empty() => v.legend.clone(),
                Some(v) => v.name.clone(),
                None => format!("#{id}"),
            })
            .collect();
        Self {
            vars: vars.to_vec(),
            labels,
            last: vec![0.0; vars.len()],
            latched: vec![false; vars.len()],
        }
    }

    /// Returns the indices (within the panel) that latched on this update.
    pub fn update(&mut self, values: &[f32]) -> Vec<usize> {
        let mut tripped = Vec::new();
        for (i, &id) in self.vars.iter().enumerate() {
            let Some(&v) = values.get(id) else { continue };
            self.last[i] = v;
            if v > ALERT_THRESHOLD && !self.latched[i] {
                self.latched[i] = true;
                tripped.push(i);
            }
        }
        tripped
    }

    pub fn vars(&self) -> &[VarId] {
        &self.vars
    }

    pub fn label(&self, i: usize) -> Option<&str> {
        self.labels.get(i).map(String::as_str)
    }

    pub fn last_value(&self, i: usize) -> Option<f32> {
        self.last.get(i).copied()
    }

    pub fn is_latched(&self, i: usize) -> bool {
        self.latched.get(i).copied().unwrap_or(false)
    }

    pub fn any_latched(&self) -> bool {
        self.latched.iter().any(|&l| l)
    }

    pub fn acknowledge(&mut self) {
        self.latched.iter_mut().for_each(|l| *l = false);
    }
}

#[derive(Debug, Clone)]
pub enum ChartView {
    Window(RollingWindow),
    Scope(ScopeWindow),
    Alert(AlertPanel),
}

#[derive(Debug, Clone)]
pub struct Chart {
    pub title: String,
    pub kind: PlotKind,
    pub overrides: ValueOverride,
    pub view: ChartView,
}

impl Chart {
    /// Display bounds; alert panels have none.
    pub fn bounds(&self) -> Option<Bounds> {
        match &self.view {
            ChartView::Window(w) => Some(w.bounds(self.overrides)),
            ChartView::Scope(s) => Some(s.bounds(self.overrides)),
            ChartView::Alert(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChartSet {
    charts: Vec<Chart>,
}

impl ChartSet {
    /// Build every plot the definition describes.
    ///
    /// Plots of unknown kind, or without a single resolvable variable, are
    /// skipped with a warning. Layout errors are fatal.
    pub fn from_plots(
        catalog: &Catalog,
        plots: &[PlotEntry],
        history: Duration,
        period: Duration,
        block_samples: usize,
    ) -> Result<Self, ChartError> {
        let mut charts = Vec::with_capacity(plots.len());
        for plot in plots {
            let kind = plot.plot_kind();
            if kind == PlotKind::None {
                warn!("Skipping plot {:?}: unsupported type {:?}", plot.title, plot.kind);
                continue;
            }
            let vars = plot.resolve(catalog);
            if vars.is_empty() {
                warn!("Skipping plot {:?}: no known variables", plot.title);
                continue;
            }

            let window = |style: WindowStyle| {
                RollingWindow::new(catalog, &vars, style, history, period)
                    .map(ChartView::Window)
                    .map_err(|source| ChartError::Window {
                        title: plot.title.clone(),
                        source,
                    })
            };
            let view = match kind {
                PlotKind::Line => window(WindowStyle::Line)?,
                PlotKind::Stack => window(WindowStyle::Stack)?,
                PlotKind::Scope => ScopeWindow::new(catalog, &vars, block_samples)
                    .map(ChartView::Scope)
                    .map_err(|source| ChartError::Scope {
                        title: plot.title.clone(),
                        source,
                    })?,
                PlotKind::Alert => ChartView::Alert(AlertPanel::new(catalog, &vars)),
                PlotKind::None => continue,
            };

            debug!("Chart {:?} ({}) with {} variable(s)", plot.title, kind.as_str(), vars.len());
            charts.push(Chart {
                title: plot.title.clone(),
                kind,
                overrides: ValueOverride {
                    min: plot.min_value,
                    max: plot.max_value,
                },
                view,
            });
        }
        Ok(Self { charts })
    }

    pub fn charts(&self) -> &[Chart] {
        &self.charts
    }

    pub fn len(&self) -> usize {
        self.charts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.charts.is_empty()
    }

    /// Frames that need block capture.
    pub fn scope_frames(&self) -> Vec<FrameId> {
        let mut frames: Vec<FrameId> = self
            .charts
            .iter()
            .filter_map(|c| match &c.view {
                ChartView::Scope(s) => Some(s.frame()),
                _ => None,
            })
            .collect();
        frames.sort_unstable();
        frames.dedup();
        frames
    }

    /// Feed a published state vector to every rolling window and alert panel.
    pub fn ingest_state(&mut self, snapshot: &StateSnapshot, period: Duration) -> Result<(), ChartError> {
        for chart in &mut self.charts {
            match &mut chart.view {
                ChartView::Window(w) => w
                    .add(&snapshot.values, snapshot.timestamp, period)
                    .map_err(|source| ChartError::Window {
                        title: chart.title.clone(),
                        source,
                    })?,
                ChartView::Alert(panel) => {
                    for i in panel.update(&snapshot.values) {
                        warn!(
                            "Alert {:?}: {} went high",
                            chart.title,
                            panel.label(i).unwrap_or("?")
                        );
                    }
                }
                ChartView::Scope(_) => {}
            }
        }
        Ok(())
    }

    /// Hand a captured block to the scopes of its frame.
    pub fn ingest_block(&mut self, block: &DelayedBlock) {
        for chart in &mut self.charts {
            if let ChartView::Scope(scope) = &mut chart.view {
                if scope.frame() == block.frame {
                    scope.add(block);
                }
            }
        }
    }

    /// Change the history window of every rolling window.
    pub fn set_history(&mut self, history: Duration) -> Result<(), ChartError> {
        for chart in &mut self.charts {
            if let ChartView::Window(w) = &mut chart.view {
                w.set_window(history).map_err(|source| ChartError::Window {
                    title: chart.title.clone(),
                    source,
                })?;
            }
        }
        Ok(())
    }
}
