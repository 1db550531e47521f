//! Configuration for the tinygd TinyG/g2core driver
//!
//! [`DriverConfig`] holds the planner-buffer watermarks, serial-buffer limit,
//! poll intervals, and initial status-report mask that the driver treats as
//! compile-time constants elsewhere in the design. They are defaults here,
//! overridable at construction and loadable from a TOML file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tinygd_core::{Error, Result};

/// Default set of status-report fields requested during bring-up, all enabled
pub const DEFAULT_STATUS_FIELDS: &[&str] = &[
    "stat", "line", "vel", "feed", "unit", "coor", "momo", "plan", "path", "dist", "admo", "frmo",
    "tool", "posx", "posy", "posz", "posa", "posb", "posc", "mpox", "mpoy", "mpoz", "mpoa", "mpob",
    "mpoc", "spe", "spd", "spc", "sps", "com", "cof",
];

/// Driver-wide configuration, constructed once at startup and immutable thereafter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Planner-buffer count at or below which the Sender blocks
    pub low_water: u32,
    /// Planner-buffer count at or above which a blocked Sender unblocks
    pub high_water: u32,
    /// Assumed planner buffer pool size until the firmware reports its own
    pub planner_buffer_pool_size_default: u32,
    /// Outbound writes during `init_controller` longer than this are dropped
    pub serial_buffer_limit: usize,
    /// QueryTimer tick period
    pub query_timer_period_ms: u64,
    /// Delay after transport open before `init_controller` begins (firmware bootloader)
    pub init_delay_ms: u64,
    /// Grace period after the machine goes idle before an automatic `sender:stop`
    pub finish_grace_ms: u64,
    /// Status-report mask as seeded at startup; cleared bit-by-bit by capability probes
    pub initial_status_mask: BTreeMap<String, bool>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            low_water: 8,
            high_water: 20,
            planner_buffer_pool_size_default: 28,
            serial_buffer_limit: 255,
            query_timer_period_ms: 250,
            init_delay_ms: 1000,
            finish_grace_ms: 500,
            initial_status_mask: DEFAULT_STATUS_FIELDS
                .iter()
                .map(|&f| (f.to_string(), true))
                .collect(),
        }
    }
}

impl DriverConfig {
    /// Load configuration from a TOML file, falling back to defaults for any
    /// field the file omits.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| Error::other(format!("invalid config TOML: {e}")))
    }

    /// Serialize configuration to a TOML file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let text =
            toml::to_string_pretty(self).map_err(|e| Error::other(format!("cannot serialize config: {e}")))?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// The default config-file location (`$XDG_CONFIG_HOME/tinygd/config.toml`
    /// or the platform equivalent via [`dirs::config_dir`]).
    pub fn default_path() -> Option<std::path::PathBuf> {
        dirs::config_dir().map(|d| d.join("tinygd").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_sane_watermarks() {
        let cfg = DriverConfig::default();
        assert!(cfg.low_water < cfg.high_water);
        assert!(cfg.initial_status_mask.get("stat").copied().unwrap_or(false));
    }

    #[test]
    fn round_trips_through_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut cfg = DriverConfig::default();
        cfg.low_water = 3;
        cfg.save_to_file(&path).unwrap();

        let loaded = DriverConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn load_missing_field_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "low_water = 2\n").unwrap();

        let loaded = DriverConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.low_water, 2);
        assert_eq!(loaded.high_water, DriverConfig::default().high_water);
    }
}
