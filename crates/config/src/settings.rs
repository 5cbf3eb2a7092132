// Grid settings
// Loaded from ~/.config/fleetgrid/settings.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSettings {
    // Row supply
    #[serde(rename = "rows.emptyFloor")]
    pub empty_floor: usize,

    #[serde(rename = "rows.graceMs")]
    pub grace_ms: u64,

    #[serde(rename = "rows.debounceMs")]
    pub debounce_ms: u64,

    #[serde(rename = "rows.cooldownMs")]
    pub cooldown_ms: u64,

    // Batch updates
    #[serde(rename = "batch.releaseMs")]
    pub batch_release_ms: u64,

    #[serde(rename = "batch.idleReleaseMs")]
    pub batch_idle_release_ms: u64,

    // Paste
    #[serde(rename = "paste.bulkThreshold")]
    pub bulk_threshold: usize,

    #[serde(rename = "paste.createChunk")]
    pub create_chunk: usize,

    // Virtualized view
    #[serde(rename = "view.rowHeight")]
    pub row_height: f32,

    #[serde(rename = "view.overscan")]
    pub overscan: usize,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            // Row supply
            empty_floor: 5,
            grace_ms: 5_000,
            debounce_ms: 1_000,
            cooldown_ms: 100,
            // Batch
            batch_release_ms: 1_000,
            batch_idle_release_ms: 500,
            // Paste
            bulk_threshold: 10,
            create_chunk: 100,
            // View
            row_height: 52.0,
            overscan: 10,
        }
    }
}

impl GridSettings {
    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fleetgrid");
        config_dir.join("settings.json")
    }

    /// Load settings from the default location, falling back to defaults
    pub fn load() -> Self {
        let path = Self::config_path();

        if !path.exists() {
            let settings = Self::default();
            settings.create_default_file(&path);
            return settings;
        }

        Self::load_from(&path).unwrap_or_else(|e| {
            log::warn!("{}; using default settings", e);
            Self::default()
        })
    }

    /// Load settings from an explicit JSON or TOML file (by extension)
    pub fn load_from(path: &Path) -> Result<Self, String> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("error reading {}: {}", path.display(), e))?;

        let is_toml = path.extension().map_or(false, |ext| ext == "toml");
        if is_toml {
            Self::from_toml(&contents)
        } else {
            Self::from_json(&contents)
        }
    }

    /// Parse JSON, ignoring `//` comment lines
    pub fn from_json(contents: &str) -> Result<Self, String> {
        let cleaned: String = contents
            .lines()
            .filter(|line| !line.trim().starts_with("//"))
            .collect::<Vec<_>>()
            .join("\n");

        let settings: Self = serde_json::from_str(&cleaned)
            .map_err(|e| format!("error parsing settings.json: {}", e))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse TOML using the same dotted keys, quoted
    pub fn from_toml(contents: &str) -> Result<Self, String> {
        let settings: Self = toml::from_str(contents)
            .map_err(|e| format!("error parsing settings TOML: {}", e))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.create_chunk == 0 {
            return Err("paste.createChunk must be at least 1".into());
        }
        if !(self.row_height > 0.0) {
            return Err(format!("view.rowHeight must be positive, got {}", self.row_height));
        }
        Ok(())
    }

    /// Write settings as JSON, creating the directory if needed.
    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        // Ensure directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| e.to_string())?;

        fs::write(path, json).map_err(|e| e.to_string())
    }

    /// Create default settings file with comments
    fn create_default_file(&self, path: &Path) {
        // Ensure directory exists
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                log::warn!("Error creating config directory: {}", e);
                return;
            }
        }

        let default_config = r#"{
    // Trailing empty rows kept for data entry (maintenance grid)
    "rows.emptyFloor": 5,
    // Empty rows younger than this are never auto-deleted
    "rows.graceMs": 5000,
    // Delay before re-checking the empty-row floor after a change
    "rows.debounceMs": 1000,
    "rows.cooldownMs": 100,

    // Batch update guard release
    "batch.releaseMs": 1000,
    "batch.idleReleaseMs": 500,

    // Paste: gaps larger than this create rows in bulk
    "paste.bulkThreshold": 10,
    "paste.createChunk": 100,

    // Virtualized view
    "view.rowHeight": 52,
    "view.overscan": 10
}
"#;

        if let Err(e) = fs::write(path, default_config) {
            log::warn!("Error writing default settings.json: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_grid_behavior() {
        let s = GridSettings::default();
        assert_eq!(s.empty_floor, 5);
        assert_eq!(s.grace_ms, 5_000);
        assert_eq!(s.debounce_ms, 1_000);
        assert_eq!(s.bulk_threshold, 10);
        assert_eq!(s.row_height, 52.0);
    }

    #[test]
    fn json_with_comments_and_partial_keys() {
        let json = r#"{
            // keep more blank rows
            "rows.emptyFloor": 8,
            "view.overscan": 4
        }"#;
        let s = GridSettings::from_json(json).unwrap();
        assert_eq!(s.empty_floor, 8);
        assert_eq!(s.overscan, 4);
        assert_eq!(s.debounce_ms, 1_000);
    }

    #[test]
    fn toml_dotted_keys() {
        let s = GridSettings::from_toml("\"rows.graceMs\" = 2000\n\"paste.createChunk\" = 50\n").unwrap();
        assert_eq!(s.grace_ms, 2_000);
        assert_eq!(s.create_chunk, 50);
    }

    #[test]
    fn zero_chunk_rejected() {
        let err = GridSettings::from_json(r#"{ "paste.createChunk": 0 }"#).unwrap_err();
        assert!(err.contains("createChunk"));
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let mut s = GridSettings::default();
        s.empty_floor = 3;
        s.save_to(&path).unwrap();
        assert_eq!(GridSettings::load_from(&path).unwrap(), s);
    }
}
