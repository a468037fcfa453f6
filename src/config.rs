use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Engine tuning knobs, loadable from a JSON file.
///
/// Every field has a default so a partial (or absent) file still yields a
/// working configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Base URL of the attendance/recognition backend, e.g. `http://host/api`.
    pub api_base_url: String,
    /// Bearer token attached to every backend request, when present.
    pub bearer_token: Option<String>,
    /// Seconds between recognition polls while the camera is on.
    pub poll_interval_secs: u64,
    /// Upper bound on a single capture-and-recognize cycle.
    pub capture_timeout_secs: u64,
    /// Session length used when the teacher does not pick one.
    pub default_duration_minutes: i64,
    /// Perceptual-hash Hamming distance below which two consecutive frames
    /// count as the same scene.
    pub scene_change_threshold: u32,
    pub jpeg_quality: u8,
    pub camera_device: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8000/api".to_string(),
            bearer_token: None,
            poll_interval_secs: 3,
            capture_timeout_secs: 10,
            default_duration_minutes: 45,
            scene_change_threshold: 8,
            jpeg_quality: 80,
            camera_device: "/dev/video0".to_string(),
        }
    }
}

impl EngineConfig {
    /// Read configuration from `path`, falling back to defaults when the
    /// file is missing. A malformed file is an error rather than a silent
    /// reset, so a typo cannot drop a teacher back to localhost defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse config at {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let parsed: EngineConfig =
            serde_json::from_str(r#"{"poll_interval_secs": 5}"#).unwrap();
        assert_eq!(parsed.poll_interval_secs, 5);
        assert_eq!(parsed.default_duration_minutes, 45);
        assert_eq!(parsed.scene_change_threshold, 8);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = EngineConfig::load(Path::new("/nonexistent/rollcall.json")).unwrap();
        assert_eq!(config.poll_interval_secs, 3);
    }
}
