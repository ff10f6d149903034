//! Configuration management for the fan_thermald daemon.
//!
//! Handles loading, parsing, and validation of the YAML configuration file
//! that selects the sensor and fan hardware and provides the initial curve.

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::sync::RwLock;

use crate::{
    event::ConfigChangeType,
    fan_curve::{ConfigPackage, FanCurve, FanLevel},
};

/// Environment variable overriding the configuration search path.
pub const CONFIG_ENV: &str = "FAN_THERMALD_CONFIG";

/// Main configuration structure for the fan_thermald daemon.
///
/// Temperatures are in milli-degrees Celsius and speeds in percent.
///
/// # Example
///
/// ```yaml
/// version: 1
/// poll_interval_ms: 2000
/// levels:
///   - { temp: 45000, hyst: 3000, speed: 30 }
///   - { temp: 60000, hyst: 5000, speed: 70 }
///   - { temp: 75000, hyst: 5000, speed: 100 }
/// sensor:
///   kind: thermal-zone
///   zone: cpu-thermal
/// actuator:
///   kind: sysfs-pwm
///   chip: 0
///   channel: 0
///   period_ns: 40000
/// dbus_bus: system
/// enable_broadcast: true
/// broadcast_interval: 5
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Configuration version for compatibility checking.
    pub version: u8,

    /// Time between control cycles in milliseconds.
    #[serde(default = "defaults::poll_interval_ms")]
    pub poll_interval_ms: u32,

    /// Initial fan curve, lowest threshold first.
    #[serde(default)]
    pub levels: Vec<FanLevel>,

    #[serde(default)]
    pub sensor: SensorCfg,

    #[serde(default)]
    pub actuator: ActuatorCfg,

    /// Message bus the control interface is exported on.
    #[serde(default)]
    pub dbus_bus: BusKind,

    /// Whether to emit periodic status signals.
    #[serde(default = "defaults::enable_broadcast")]
    pub enable_broadcast: bool,

    /// Interval between status broadcasts in seconds.
    #[serde(default = "defaults::broadcast_interval")]
    pub broadcast_interval: u16,
}

/// Temperature source variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SensorCfg {
    /// Kernel thermal zone matched by its `type` attribute.
    ThermalZone { zone: String },
}

impl Default for SensorCfg {
    fn default() -> Self {
        Self::ThermalZone {
            zone: defaults::thermal_zone(),
        }
    }
}

/// Fan driver variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ActuatorCfg {
    /// Active-low fan on a `/sys/class/pwm` channel.
    SysfsPwm {
        chip: u32,
        channel: u32,
        /// Period to program when opening the channel.
        #[serde(default)]
        period_ns: Option<u64>,
    },
}

impl Default for ActuatorCfg {
    fn default() -> Self {
        Self::SysfsPwm {
            chip: 0,
            channel: 0,
            period_ns: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    Session,
    #[default]
    System,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: 1,
            poll_interval_ms: defaults::poll_interval_ms(),
            levels: Vec::new(),
            sensor: SensorCfg::default(),
            actuator: ActuatorCfg::default(),
            dbus_bus: BusKind::default(),
            enable_broadcast: defaults::enable_broadcast(),
            broadcast_interval: defaults::broadcast_interval(),
        }
    }
}

impl Config {
    /// Builds the package installed into the store at startup or on reload.
    pub fn package(&self) -> ConfigPackage {
        ConfigPackage::new(
            FanCurve::from_levels_unchecked(self.levels.clone()),
            self.poll_interval_ms,
        )
    }

    /// Validates the configuration for consistency.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use fan_thermald::config::Config;
    ///
    /// let config = Config::default();
    /// config.validate()?;
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn validate(&self) -> Result<()> {
        self.package().validate()?;

        if self.enable_broadcast && self.broadcast_interval == 0 {
            anyhow::bail!("broadcast_interval must be positive when broadcasts are enabled");
        }

        let SensorCfg::ThermalZone { zone } = &self.sensor;
        if zone.trim().is_empty() {
            anyhow::bail!("Thermal zone name cannot be empty");
        }

        Ok(())
    }

    /// Names the sections that cannot be applied without reopening hardware.
    fn hardware_changes(&self, other: &Config) -> Vec<String> {
        let mut changed = Vec::new();
        if self.sensor != other.sensor {
            changed.push("sensor".to_string());
        }
        if self.actuator != other.actuator {
            changed.push("actuator".to_string());
        }
        if self.dbus_bus != other.dbus_bus {
            changed.push("dbus_bus".to_string());
        }
        if self.enable_broadcast != other.enable_broadcast
            || self.broadcast_interval != other.broadcast_interval
        {
            changed.push("broadcast".to_string());
        }
        changed
    }
}

mod defaults {
    use crate::fan_curve::DEFAULT_POLL_INTERVAL_MS;

    pub fn poll_interval_ms() -> u32 {
        DEFAULT_POLL_INTERVAL_MS
    }

    pub fn enable_broadcast() -> bool {
        false
    }

    pub fn broadcast_interval() -> u16 {
        5
    }

    pub fn thermal_zone() -> String {
        "cpu-thermal".to_string()
    }
}

fn locate_config() -> Result<PathBuf> {
    // 2) ENV
    if let Ok(env_path) = env::var(CONFIG_ENV) {
        return Ok(PathBuf::from(env_path));
    }

    // 3) XDG_CONFIG_HOME or $HOME/.config
    if let Some(mut cfg_dir) = env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| env::var_os("HOME").map(|h| Path::new(&h).join(".config")))
    {
        cfg_dir.push("fan_thermald/config.yml");
        if cfg_dir.exists() {
            return Ok(cfg_dir);
        }
    }

    // 4) /etc
    let etc = Path::new("/etc/fan_thermald/config.yml");
    if etc.exists() {
        return Ok(etc.to_path_buf());
    }

    anyhow::bail!("Configuration file not found in any standard location")
}

/// Configuration manager that handles both config data and file operations.
///
/// # Example
///
/// ```no_run
/// use fan_thermald::config::ConfigManager;
/// use std::path::PathBuf;
///
/// # async fn example() -> anyhow::Result<()> {
/// // Load from specific path
/// let config_manager = ConfigManager::load(Some(PathBuf::from("config.yml"))).await?;
///
/// // Load from standard locations
/// let config_manager = ConfigManager::load(None).await?;
///
/// let poll_interval_ms = config_manager.get().await.poll_interval_ms;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: Arc<RwLock<Config>>,
    path: PathBuf,
}

impl ConfigManager {
    pub fn new(config: Config, path: PathBuf) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            path,
        }
    }

    /// Loads configuration from file or standard locations.
    ///
    /// Searches for configuration in the following order:
    /// 1. Provided path parameter
    /// 2. `FAN_THERMALD_CONFIG` environment variable
    /// 3. `$XDG_CONFIG_HOME/fan_thermald/config.yml` or `~/.config/fan_thermald/config.yml`
    /// 4. `/etc/fan_thermald/config.yml`
    pub async fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p,
            None => locate_config().context("No configuration file found")?,
        };

        info!("Loading config from: {}", config_path.display());
        let config = Self::load_config_from_path(&config_path)?;

        Ok(Self::new(config, config_path))
    }

    pub async fn get(&self) -> tokio::sync::RwLockReadGuard<'_, Config> {
        self.config.read().await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-reads the file and classifies the difference.
    ///
    /// Hot-reloadable edits replace the in-memory config. Edits touching
    /// hardware sections leave it untouched and report what changed.
    pub async fn reload(&self) -> Result<ConfigChangeType> {
        info!("Reloading config from: {}", self.path.display());
        let new_config = Self::load_config_from_path(&self.path)?;

        let mut current = self.config.write().await;
        let changed_sections = current.hardware_changes(&new_config);
        if !changed_sections.is_empty() {
            return Ok(ConfigChangeType::ColdRestart { changed_sections });
        }

        *current = new_config;
        info!("Configuration reloaded successfully");
        Ok(ConfigChangeType::HotReload)
    }

    pub async fn validate(&self) -> Result<()> {
        self.config.read().await.validate()
    }

    pub async fn clone_config(&self) -> Config {
        self.config.read().await.clone()
    }

    fn load_config_from_path(path: &Path) -> Result<Config> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML in: {}", path.display()))?;

        if config.version != 1 {
            anyhow::bail!(
                "Unsupported config version {} in file: {}",
                config.version,
                path.display()
            );
        }

        config
            .validate()
            .with_context(|| format!("Configuration validation failed for: {}", path.display()))?;

        Ok(config)
    }
}
