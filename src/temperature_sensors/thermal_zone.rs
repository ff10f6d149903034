use std::{
    fs,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
#[cfg(debug_assertions)]
use log::info;

use crate::{
    error::{FanError, Result},
    sensors::TemperatureSensor,
};

pub const SYSFS_THERMAL_ROOT: &str = "/sys/class/thermal";

/// Kernel thermal zone read through `thermal_zoneN/temp`.
pub struct ThermalZoneSensor {
    zone: String,
    temp_path: PathBuf,
}

impl ThermalZoneSensor {
    /// Finds the zone whose `type` attribute equals `zone`.
    pub fn discover(zone: &str) -> Result<Self> {
        Self::discover_in(SYSFS_THERMAL_ROOT, zone)
    }

    pub fn discover_in(root: impl AsRef<Path>, zone: &str) -> Result<Self> {
        let root = root.as_ref();
        let entries = fs::read_dir(root)
            .map_err(|e| FanError::sensor(zone, format!("{}: {e}", root.display())))?;

        let mut dirs: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with("thermal_zone"))
            })
            .collect();
        dirs.sort();

        let dir = dirs
            .into_iter()
            .find(|dir| {
                fs::read_to_string(dir.join("type")).is_ok_and(|kind| kind.trim() == zone)
            })
            .ok_or_else(|| FanError::sensor(zone, "no thermal zone with this type"))?;

        #[cfg(debug_assertions)]
        {
            info!("Found thermal zone {zone} at {}", dir.display());
        }

        Ok(Self {
            zone: zone.to_string(),
            temp_path: dir.join("temp"),
        })
    }
}

#[async_trait]
impl TemperatureSensor for ThermalZoneSensor {
    async fn read_temperature(&self) -> Result<i32> {
        let raw =
            fs::read_to_string(&self.temp_path).map_err(|e| FanError::sensor(&self.zone, e))?;
        raw.trim()
            .parse()
            .map_err(|e| FanError::sensor(&self.zone, format!("bad reading {raw:?}: {e}")))
    }

    fn sensor_name(&self) -> String {
        self.zone.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fake_zones(zones: &[(&str, &str)]) -> TempDir {
        let root = TempDir::new().unwrap();
        for (idx, (kind, temp)) in zones.iter().enumerate() {
            let dir = root.path().join(format!("thermal_zone{idx}"));
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("type"), format!("{kind}\n")).unwrap();
            fs::write(dir.join("temp"), format!("{temp}\n")).unwrap();
        }
        fs::create_dir_all(root.path().join("cooling_device0")).unwrap();
        root
    }

    #[tokio::test]
    async fn discovers_zone_by_type() {
        let root = fake_zones(&[("gpu-thermal", "41000"), ("cpu-thermal", "52500")]);
        let sensor = ThermalZoneSensor::discover_in(root.path(), "cpu-thermal").unwrap();
        assert_eq!(sensor.sensor_name(), "cpu-thermal");
        assert_eq!(sensor.read_temperature().await.unwrap(), 52_500);
    }

    #[test]
    fn unknown_zone_is_a_sensor_error() {
        let root = fake_zones(&[("gpu-thermal", "41000")]);
        let err = ThermalZoneSensor::discover_in(root.path(), "cpu-thermal")
            .err()
            .unwrap();
        assert!(matches!(err, FanError::SensorRead { .. }));
    }

    #[tokio::test]
    async fn garbage_reading_is_a_sensor_error() {
        let root = fake_zones(&[("cpu-thermal", "n/a")]);
        let sensor = ThermalZoneSensor::discover_in(root.path(), "cpu-thermal").unwrap();
        assert!(sensor.read_temperature().await.is_err());
    }

    #[tokio::test]
    async fn vanished_zone_fails_the_read_only() {
        let root = fake_zones(&[("cpu-thermal", "30000")]);
        let sensor = ThermalZoneSensor::discover_in(root.path(), "cpu-thermal").unwrap();
        fs::remove_file(root.path().join("thermal_zone0/temp")).unwrap();
        assert!(sensor.read_temperature().await.is_err());
    }

    #[tokio::test]
    async fn negative_readings_parse() {
        let root = fake_zones(&[("ambient", "-5000")]);
        let sensor = ThermalZoneSensor::discover_in(root.path(), "ambient").unwrap();
        assert_eq!(sensor.read_temperature().await.unwrap(), -5000);
    }
}
