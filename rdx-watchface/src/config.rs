//! Defines the configuration for a watch face host and its controller.
//!
//! The struct is deserialized with `serde` through the `config` crate, from a
//! TOML file and `WATCHFACE_*` environment overrides, so a host's policy and
//! patterns can be defined outside the application code.

use crate::controller::TimeController;
use crate::error::Result;
use crate::format::DisplayLocale;
use crate::host::HostEnvironment;
use chrono_tz::Tz;
use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

const ENV_PREFIX: &str = "WATCHFACE";

/// The top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchConfig {
    /// Locale used by the built-in formats and the half-day marker.
    #[serde(default)]
    pub locale: DisplayLocale,

    /// The system 24-hour preference reported by the host.
    #[serde(default)]
    pub use_24_hour: bool,

    /// Request per-second wake-ups while dimmed. Costs battery.
    #[serde(default)]
    pub seconds_in_dim_mode: bool,

    /// Run as a design-time preview; wake requests are suppressed.
    #[serde(default)]
    pub edit_mode: bool,

    #[serde(default)]
    pub format_12_hour: Option<String>,

    #[serde(default)]
    pub format_24_hour: Option<String>,

    /// Pins the display to this zone. Uses IANA names (e.g. "Europe/Paris").
    #[serde(default)]
    pub time_zone: Option<Tz>,

    /// The zone the clock source starts in. Defaults to UTC.
    #[serde(default = "default_system_time_zone")]
    pub system_time_zone: Tz,
}

impl WatchConfig {
    /// Loads the optional TOML file at `path`, then applies environment
    /// overrides such as `WATCHFACE_USE_24_HOUR=true` or
    /// `WATCHFACE_LOCALE__PM=pm`.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        Self::load_with_environment(path, environment_source())
    }

    fn load_with_environment(
        path: Option<&str>,
        environment: Environment,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path));
        }
        builder.add_source(environment).build()?.try_deserialize()
    }

    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    /// The host environment this configuration describes.
    pub fn environment(&self) -> HostEnvironment {
        HostEnvironment {
            locale: self.locale.clone(),
            use_24_hour: self.use_24_hour,
        }
    }

    /// Installs the configured patterns and zone override on `controller`.
    pub fn apply(&self, controller: &TimeController) -> Result<()> {
        if let Some(pattern) = &self.format_12_hour {
            controller.set_twelve_hour_pattern(pattern)?;
        }
        if let Some(pattern) = &self.format_24_hour {
            controller.set_twenty_four_hour_pattern(pattern)?;
        }
        if self.time_zone.is_some() {
            controller.set_time_zone(self.time_zone);
        }
        Ok(())
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            locale: DisplayLocale::default(),
            use_24_hour: false,
            seconds_in_dim_mode: false,
            edit_mode: false,
            format_12_hour: None,
            format_24_hour: None,
            time_zone: None,
            system_time_zone: default_system_time_zone(),
        }
    }
}

/// `WATCHFACE_` prefixes every key; `__` separates nested keys.
fn environment_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

// --- Default value functions for serde ---

fn default_system_time_zone() -> Tz {
    Tz::UTC
}
