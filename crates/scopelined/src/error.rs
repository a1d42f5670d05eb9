use scopeline::catalog::CatalogError;
use scopeline::charts::ChartError;
use scopeline::experiment::DefinitionError;
use scopeline::session::SessionError;
use scopeline::transport::TransportError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("no experiment definition given (argument or SCOPELINE_EXPERIMENT)")]
    NoExperiment,
    #[error("failed to read config {path:?}: {source}")]
    Config {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    ConfigJson(#[from] serde_json::Error),
    #[error("invalid config: {key} = {value} is not a usable duration in seconds")]
    BadDuration { key: &'static str, value: f64 },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Definition(#[from] DefinitionError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Chart(#[from] ChartError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("relay {addr}: {source}")]
    Relay {
        addr: String,
        source: TransportError,
    },
}
