use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use time::macros::time;
use time::Time;

/// Fallback daily cutoff applied when the configured hour/minute is invalid.
const DEFAULT_CUTOFF: Time = time!(16:00);

/// Schedule for the good-for-day sweep.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PruneConfig {
    /// Local hour (24h) of the daily cutoff.
    pub hour: u8,
    /// Local minute of the daily cutoff.
    pub minute: u8,
}

impl Default for PruneConfig {
    fn default() -> Self {
        Self {
            hour: DEFAULT_CUTOFF.hour(),
            minute: DEFAULT_CUTOFF.minute(),
        }
    }
}

impl PruneConfig {
    /// The cutoff as a civil time. Out-of-range values fall back to the
    /// default cutoff rather than failing the whole engine.
    pub fn cutoff(&self) -> Time {
        Time::from_hms(self.hour, self.minute, 0).unwrap_or(DEFAULT_CUTOFF)
    }
}

/// Top-level book configuration wrapper.
///
/// Loaded with the following precedence (lowest to highest):
/// 1) Built-in defaults
/// 2) Optional config file (if present)
/// 3) Environment variables
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BookConfig {
    pub prune: PruneConfig,
}

impl BookConfig {
    pub fn load(config_path: &Path) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(BookConfig::default()));

        if config_path.exists() {
            figment = figment.merge(Toml::file(config_path));
        }
        figment = figment.merge(Env::prefixed("MATCHBOOK_").split("_"));

        let cfg = figment.extract()?;
        Ok(cfg)
    }
}
