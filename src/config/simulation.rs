use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_tick_rate")]
    pub tick_rate_hz: f32,
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval: u32,
    #[serde(default = "default_max_snapshots")]
    pub max_snapshots: u32,
    #[serde(default = "default_snapshot_directory")]
    pub snapshot_directory: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// `text` or `json`.
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// Size of the pool ticking games in parallel. 0 uses one per core.
    #[serde(default)]
    pub worker_threads: usize,
}

fn default_tick_rate() -> f32 {
    1.0
}
fn default_snapshot_interval() -> u32 {
    10
}
fn default_max_snapshots() -> u32 {
    10
}
fn default_snapshot_directory() -> String {
    "./snapshots".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            tick_rate_hz: default_tick_rate(),
            snapshot_interval: default_snapshot_interval(),
            max_snapshots: default_max_snapshots(),
            snapshot_directory: default_snapshot_directory(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            worker_threads: 0,
        }
    }
}

impl SimulationConfig {
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Cannot read {}: {}", path.display(), e))?;
        Self::from_toml_str(&content, path)
    }

    pub fn from_toml_str(content: &str, source_path: &Path) -> Result<Self, String> {
        let config: SimulationConfig =
            toml::from_str(content).map_err(|e| format!("{}: {}", source_path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        let mut errors = Vec::new();

        if self.tick_rate_hz <= 0.0 {
            errors.push(format!(
                "tick_rate_hz must be > 0.0, got {}. Example: tick_rate_hz = 1.0",
                self.tick_rate_hz
            ));
        }

        if self.snapshot_interval == 0 {
            errors.push(format!(
                "snapshot_interval must be > 0, got {}. Example: snapshot_interval = 10",
                self.snapshot_interval
            ));
        }

        if self.max_snapshots == 0 {
            errors.push(format!(
                "max_snapshots must be > 0, got {}. Example: max_snapshots = 10",
                self.max_snapshots
            ));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            errors.push(format!(
                "log_level must be one of {:?}, got '{}'. Example: log_level = \"info\"",
                valid_levels, self.log_level
            ));
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.log_format.as_str()) {
            errors.push(format!(
                "log_format must be one of {:?}, got '{}'. Example: log_format = \"json\"",
                valid_formats, self.log_format
            ));
        }

        if self.worker_threads > 1024 {
            errors.push(format!(
                "worker_threads must be 0-1024, got {}. Example: worker_threads = 4",
                self.worker_threads
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("\n"))
        }
    }
}
