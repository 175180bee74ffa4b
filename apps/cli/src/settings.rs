use std::path::Path;

use analysis::StatsOptions;
use anyhow::{anyhow, Context, Result};
use model::Granularity;
use serde::{Deserialize, Serialize};
use time::UtcOffset;

/// Optional JSON configuration; every field falls back to its default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub stats: StatsOptions,
    pub granularity: Granularity,
    /// Offset used for calendar buckets when the window comes from the data.
    pub utc_offset_minutes: i32,
    pub skip_empty: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            stats: StatsOptions::default(),
            granularity: Granularity::Month,
            utc_offset_minutes: 0,
            skip_empty: false,
        }
    }
}

impl Settings {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let settings: Settings = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        settings.utc_offset()?;
        Ok(settings)
    }

    pub fn utc_offset(&self) -> Result<UtcOffset> {
        let secs = self
            .utc_offset_minutes
            .checked_mul(60)
            .ok_or_else(|| anyhow!("utc_offset_minutes out of range"))?;
        Ok(UtcOffset::from_whole_seconds(secs)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_path_gives_defaults() {
        assert_eq!(Settings::load(None).unwrap(), Settings::default());
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ridestats.json");
        std::fs::write(
            &path,
            r#"{ "granularity": "day", "utc_offset_minutes": 120, "stats": { "stationary_speed_kmh": 2.5 } }"#,
        )
        .unwrap();
        let s = Settings::load(Some(&path)).unwrap();
        assert_eq!(s.granularity, Granularity::Day);
        assert_eq!(s.stats.stationary_speed_kmh, 2.5);
        assert!(!s.skip_empty);
        assert_eq!(s.utc_offset().unwrap().whole_hours(), 2);
    }

    #[test]
    fn test_bad_offset_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ridestats.json");
        std::fs::write(&path, r#"{ "utc_offset_minutes": 100000 }"#).unwrap();
        assert!(Settings::load(Some(&path)).is_err());
    }
}
