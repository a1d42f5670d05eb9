//! Cross-platform application paths

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AppPaths {
    config_dir: PathBuf,
}

impl AppPaths {
    pub fn new() -> Result<Self, String> {
        let config_dir = Self::get_config_dir()?;
        Ok(Self { config_dir })
    }

    fn get_config_dir() -> Result<PathBuf, String> {
        let base = dirs::config_dir().ok_or("Could not determine config directory")?;
        Ok(base.join("scopeline"))
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("scopelined.json")
    }
}
