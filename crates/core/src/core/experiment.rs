//! Experiment definition document (`experiment.json`).
//!
//! Only the fields the sampling core needs are modelled; layout and styling
//! keys are ignored by serde.

use crate::catalog::{Catalog, CatalogBuilder, CatalogError, VarId, VariableSpec};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::warn;

/// Canonical uuid text: no braces or padding, lower case.
pub fn normalize_uuid(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| c == '{' || c == '}')
        .to_ascii_lowercase()
}

#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("failed to read experiment definition: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse experiment definition: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExperimentDefinition {
    #[serde(default)]
    pub variables: Vec<VariableEntry>,
    #[serde(default)]
    pub plots: Vec<PlotEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VariableEntry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub variable_name: String,
    #[serde(default)]
    pub message_topic: String,
    /// Older exports write the index as a string.
    #[serde(default, deserialize_with = "index_from_number_or_string")]
    pub message_index: usize,
    #[serde(default)]
    pub data_type: String,
    #[serde(default)]
    pub legend_text: String,
    #[serde(default)]
    pub bus_location: String,
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PlotEntry {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    /// Legacy spelling of `type`.
    #[serde(default)]
    pub plot_type: String,
    #[serde(default)]
    pub variables: Vec<PlotVariable>,
    #[serde(default)]
    pub min_value: Option<f32>,
    #[serde(default)]
    pub max_value: Option<f32>,
}

fn default_title() -> String {
    "Untitled".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PlotVariable {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub axis: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlotKind {
    None,
    Line,
    Stack,
    Scope,
    Alert,
}

impl PlotKind {
    /// Case-insensitive prefix match, so `"Line Chart"` is a line plot.
    pub fn parse(text: &str) -> Self {
        let lower = text.trim().to_ascii_lowercase();
        if lower.starts_with("line") {
            PlotKind::Line
        } else if lower.starts_with("stack") {
            PlotKind::Stack
        } else if lower.starts_with("scope") {
            PlotKind::Scope
        } else if lower.starts_with("alert") {
            PlotKind::Alert
        } else {
            PlotKind::None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlotKind::None => "none",
            PlotKind::Line => "line",
            PlotKind::Stack => "stack",
            PlotKind::Scope => "scope",
            PlotKind::Alert => "alert",
        }
    }
}

impl PlotEntry {
    pub fn plot_kind(&self) -> PlotKind {
        if self.kind.is_empty() {
            PlotKind::parse(&self.plot_type)
        } else {
            PlotKind::parse(&self.kind)
        }
    }

    /// Plotted variable uuids; x-axis entries are not series.
    pub fn series_uuids(&self) -> impl Iterator<Item = &str> {
        self.variables
            .iter()
            .filter(|v| !v.axis.starts_with('x'))
            .map(|v| v.id.as_str())
    }

    /// Resolve series uuids to global indices, dropping (and logging) unknown ones.
    pub fn resolve(&self, catalog: &Catalog) -> Vec<VarId> {
        self.series_uuids()
            .filter_map(|uuid| {
                let id = catalog.lookup_uuid(&normalize_uuid(uuid));
                if id.is_none() {
                    warn!("plot {:?}: unknown variable uuid {:?}", self.title, uuid);
                }
                id
            })
            .collect()
    }
}

impl ExperimentDefinition {
    pub fn from_json_str(text: &str) -> Result<Self, DefinitionError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, DefinitionError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn catalog(&self) -> Result<Catalog, CatalogError> {
        let mut builder = CatalogBuilder::new();
        for v in &self.variables {
            builder.push(VariableSpec {
                uuid: normalize_uuid(&v.uuid),
                name: v.variable_name.clone(),
                topic: v.message_topic.clone(),
                local_index: v.message_index,
                data_type: v.data_type.clone(),
                color: v.color.clone(),
                legend: v.legend_text.clone(),
                source_id: v.id.clone(),
            });
        }
        builder.build()
    }
}

fn index_from_number_or_string<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Index {
        Number(usize),
        Text(String),
    }

    match Index::deserialize(deserializer)? {
        Index::Number(n) => Ok(n),
        Index::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}
