use serde::{Deserialize, Serialize};
use std::path::Path;

/// Largest board radius accepted; a radius-64 board already holds 12,481 tiles.
pub const MAX_RADIUS: u32 = 64;

/// Parameters used to create a game board and seat its first players.
/// Stored with the game for reproducibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameParams {
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "default_radius")]
    pub radius: u32,
    #[serde(default = "default_initial_tile_count")]
    pub initial_tile_count: u32,
    #[serde(default = "default_initial_army")]
    pub initial_army: u32,
    /// Players seated when the game is created, in join order.
    #[serde(default)]
    pub players: Vec<String>,
}

fn default_radius() -> u32 {
    8
}

fn default_initial_tile_count() -> u32 {
    10
}

fn default_initial_army() -> u32 {
    10
}

impl Default for GameParams {
    fn default() -> Self {
        GameParams {
            seed: 0,
            radius: default_radius(),
            initial_tile_count: default_initial_tile_count(),
            initial_army: default_initial_army(),
            players: Vec::new(),
        }
    }
}

impl GameParams {
    /// Load game parameters from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Cannot read {}: {}", path.display(), e))?;
        let params: Self = toml::from_str(&content)
            .map_err(|e| format!("Invalid TOML in {}: {}", path.display(), e))?;
        params.validate()?;
        Ok(params)
    }

    /// Validate parameter ranges, reporting every problem at once.
    pub fn validate(&self) -> Result<(), String> {
        let mut errors = Vec::new();

        if self.radius > MAX_RADIUS {
            errors.push(format!(
                "radius must be 0-{}, got {}. Example: radius = 8",
                MAX_RADIUS, self.radius
            ));
        }

        if self.initial_tile_count == 0 {
            errors.push(
                "initial_tile_count must be >= 1, got 0. Example: initial_tile_count = 10"
                    .to_string(),
            );
        }

        let mut seen = std::collections::HashSet::new();
        for name in &self.players {
            if name.trim().is_empty() {
                errors.push("players must not contain empty names".to_string());
            } else if !seen.insert(name.as_str()) {
                errors.push(format!("players lists '{}' more than once", name));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("\n"))
        }
    }
}
