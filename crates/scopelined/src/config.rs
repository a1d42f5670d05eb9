use crate::error::DaemonError;
use scopeline::session::TimeSource;
use scopeline::ticker::{clamp_rate, period_from_rate, tick_period_ms};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Daemon settings: config file, then environment, then command line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Relay the frame subscriptions connect to.
    #[serde(default = "default_relay")]
    pub relay: String,
    /// Address the state stream is published on.
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Output rate in Hz, clamped to 1..=1000.
    #[serde(default = "default_rate_hz")]
    pub rate_hz: u32,
    #[serde(default = "default_history_secs")]
    pub history_secs: f64,
    /// Stamp samples with seconds since start instead of the source time.
    #[serde(default)]
    pub local_clock: bool,
    #[serde(default = "default_silence_secs")]
    pub silence_secs: f64,
    #[serde(default = "default_block_samples")]
    pub block_samples: usize,
    #[serde(default)]
    pub experiment: Option<PathBuf>,
}

fn default_relay() -> String {
    "127.0.0.1:5556".to_string()
}

fn default_listen() -> String {
    "127.0.0.1:9877".to_string()
}

fn default_rate_hz() -> u32 {
    30
}

fn default_history_secs() -> f64 {
    10.0
}

fn default_silence_secs() -> f64 {
    3.0
}

fn default_block_samples() -> usize {
    scopeline::capture::DEFAULT_BLOCK_SAMPLES
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            relay: default_relay(),
            listen: default_listen(),
            rate_hz: default_rate_hz(),
            history_secs: default_history_secs(),
            local_clock: false,
            silence_secs: default_silence_secs(),
            block_samples: default_block_samples(),
            experiment: None,
        }
    }
}

fn parse_flag(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

/// Positive and representable as a `Duration`.
fn seconds(key: &'static str, value: f64) -> Result<Duration, DaemonError> {
    match Duration::try_from_secs_f64(value) {
        Ok(d) if !d.is_zero() => Ok(d),
        _ => Err(DaemonError::BadDuration { key, value }),
    }
}

impl DaemonConfig {
    /// Read `path` if it exists; defaults otherwise.
    pub fn load(path: &Path) -> Result<Self, DaemonError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| DaemonError::Config {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: Self = serde_json::from_str(&text)?;
        cfg.history()?;
        cfg.silence_threshold()?;
        Ok(cfg)
    }

    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    /// Unparseable values are ignored.
    pub fn apply_vars<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // SCOPELINE_RELAY=host:port
        if let Some(v) = var("SCOPELINE_RELAY") {
            self.relay = v.trim().to_string();
        }

        if let Some(v) = var("SCOPELINE_LISTEN") {
            self.listen = v.trim().to_string();
        }

        // SCOPELINE_RATE_HZ=30
        if let Some(v) = var("SCOPELINE_RATE_HZ") {
            if let Ok(n) = v.trim().parse::<u32>() {
                self.rate_hz = n;
            }
        }

        if let Some(v) = var("SCOPELINE_HISTORY_SECS") {
            if let Ok(s) = v.trim().parse::<f64>() {
                if s.is_finite() && s > 0.0 {
                    self.history_secs = s;
                }
            }
        }

        if let Some(flag) = var("SCOPELINE_LOCAL_CLOCK").as_deref().and_then(parse_flag) {
            self.local_clock = flag;
        }

        if let Some(v) = var("SCOPELINE_EXPERIMENT") {
            self.experiment = Some(PathBuf::from(v.trim()));
        }
    }

    /// First positional argument is the experiment definition.
    pub fn apply_args<I: IntoIterator<Item = String>>(&mut self, args: I) {
        if let Some(path) = args.into_iter().find(|a| !a.starts_with('-')) {
            self.experiment = Some(PathBuf::from(path));
        }
    }

    pub fn rate_hz(&self) -> u32 {
        clamp_rate(self.rate_hz)
    }

    pub fn tick_period(&self) -> Duration {
        period_from_rate(self.rate_hz)
    }

    pub fn tick_period_ms(&self) -> u64 {
        tick_period_ms(self.rate_hz)
    }

    pub fn history(&self) -> Result<Duration, DaemonError> {
        seconds("history_secs", self.history_secs)
    }

    pub fn silence_threshold(&self) -> Result<Duration, DaemonError> {
        seconds("silence_secs", self.silence_secs)
    }

    pub fn time_source(&self) -> TimeSource {
        if self.local_clock {
            TimeSource::Local
        } else {
            TimeSource::Source
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn file_fields_default_individually() {
        let cfg: DaemonConfig = serde_json::from_str(r#"{"rate_hz": 50, "local_clock": true}"#).unwrap();
        assert_eq!(cfg.rate_hz, 50);
        assert!(cfg.local_clock);
        assert_eq!(cfg.relay, default_relay());
        assert_eq!(cfg.history().unwrap(), Duration::from_secs(10));
        assert_eq!(cfg.time_source(), TimeSource::Local);
    }

    #[test]
    fn env_overrides_and_ignores_garbage() {
        let env: HashMap<&str, &str> = [
            ("SCOPELINE_RELAY", " relay:7000 "),
            ("SCOPELINE_RATE_HZ", "5000"),
            ("SCOPELINE_HISTORY_SECS", "-3"),
            ("SCOPELINE_LOCAL_CLOCK", "yes"),
            ("SCOPELINE_EXPERIMENT", "/tmp/exp.json"),
        ]
        .into_iter()
        .collect();

        let mut cfg = DaemonConfig::default();
        cfg.apply_vars(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.relay, "relay:7000");
        assert_eq!(cfg.rate_hz(), 1000);
        assert_eq!(cfg.tick_period(), Duration::from_millis(1));
        assert_eq!(cfg.history_secs, 10.0);
        assert!(cfg.local_clock);
        assert_eq!(cfg.experiment, Some(PathBuf::from("/tmp/exp.json")));
    }

    #[test]
    fn positional_argument_wins() {
        let mut cfg = DaemonConfig {
            experiment: Some(PathBuf::from("from-env.json")),
            ..Default::default()
        };
        cfg.apply_args(["--verbose".to_string(), "run.json".to_string()]);
        assert_eq!(cfg.experiment, Some(PathBuf::from("run.json")));
    }

    #[test]
    fn out_of_range_durations_are_errors() {
        let cfg: DaemonConfig = serde_json::from_str(r#"{"history_secs": 1e30}"#).unwrap();
        assert!(matches!(
            cfg.history(),
            Err(DaemonError::BadDuration { key: "history_secs", .. })
        ));

        let cfg: DaemonConfig = serde_json::from_str(r#"{"silence_secs": -1.0}"#).unwrap();
        assert!(cfg.silence_threshold().is_err());
        assert_eq!(cfg.history().unwrap(), Duration::from_secs(10));
    }

    #[test]
    fn load_rejects_unusable_durations() {
        let path = std::env::temp_dir().join(format!("scopelined-{}-bad.json", std::process::id()));
        std::fs::write(&path, r#"{"silence_secs": 1e300}"#).unwrap();
        let loaded = DaemonConfig::load(&path);
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(
            loaded,
            Err(DaemonError::BadDuration { key: "silence_secs", .. })
        ));
    }

    #[test]
    fn missing_file_means_defaults() {
        let cfg = DaemonConfig::load(Path::new("/nonexistent/scopelined.json")).unwrap();
        assert_eq!(cfg, DaemonConfig::default());
    }
}
