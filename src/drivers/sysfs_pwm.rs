//! PWM channel driven through the Linux `/sys/class/pwm` interface.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use log::{info, warn};

use crate::{
    actuator::{PwmDevice, PwmState},
    error::{FanError, Result},
};

pub const SYSFS_PWM_ROOT: &str = "/sys/class/pwm";

/// One exported channel of a PWM chip.
///
/// The channel directory is `<root>/pwmchip<chip>/pwm<channel>`; it is
/// exported on first use if it does not exist yet.
#[derive(Debug, Clone)]
pub struct SysfsPwm {
    chip_dir: PathBuf,
    channel: u32,
    name: String,
}

impl SysfsPwm {
    pub fn new(chip: u32, channel: u32) -> Self {
        Self::with_root(SYSFS_PWM_ROOT, chip, channel)
    }

    pub fn with_root(root: impl AsRef<Path>, chip: u32, channel: u32) -> Self {
        Self {
            chip_dir: root.as_ref().join(format!("pwmchip{chip}")),
            channel,
            name: format!("pwmchip{chip}/pwm{channel}"),
        }
    }

    pub fn channel_dir(&self) -> PathBuf {
        self.chip_dir.join(format!("pwm{}", self.channel))
    }

    /// Exports the channel if needed and optionally seeds its period.
    pub async fn open(&self, period_ns: Option<u64>) -> Result<()> {
        if !self.chip_dir.is_dir() {
            return Err(FanError::actuator(
                &self.name,
                format!("{} does not exist", self.chip_dir.display()),
            ));
        }

        if !self.channel_dir().is_dir() {
            info!("Exporting PWM channel {}", self.name);
            fs::write(self.chip_dir.join("export"), self.channel.to_string())
                .map_err(|e| FanError::actuator(&self.name, format!("export failed: {e}")))?;
            // udev needs a moment to fix permissions on the new attributes
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        if let Some(period_ns) = period_ns {
            let mut state = self.read_sync()?;
            if state.period_ns != period_ns {
                state.period_ns = period_ns;
                state.duty_cycle_ns = state.duty_cycle_ns.min(period_ns);
                self.apply_sync(state)?;
            }
        }

        Ok(())
    }

    fn attr(&self, attr: &str) -> PathBuf {
        self.channel_dir().join(attr)
    }

    fn read_attr(&self, attr: &str) -> Result<u64> {
        let path = self.attr(attr);
        let raw = fs::read_to_string(&path)
            .map_err(|e| FanError::actuator(&self.name, format!("{}: {e}", path.display())))?;
        raw.trim().parse().map_err(|e| {
            FanError::actuator(&self.name, format!("{}: bad value {raw:?}: {e}", path.display()))
        })
    }

    fn write_attr(&self, attr: &str, value: u64) -> Result<()> {
        let path = self.attr(attr);
        fs::write(&path, value.to_string())
            .map_err(|e| FanError::actuator(&self.name, format!("{}: {e}", path.display())))
    }

    fn read_sync(&self) -> Result<PwmState> {
        Ok(PwmState {
            period_ns: self.read_attr("period")?,
            duty_cycle_ns: self.read_attr("duty_cycle")?,
            enabled: self.read_attr("enable")? != 0,
        })
    }

    fn apply_sync(&self, state: PwmState) -> Result<()> {
        let current_period = self.read_attr("period").unwrap_or(0);

        // The kernel rejects a duty cycle longer than the period in effect.
        if state.period_ns != current_period && state.duty_cycle_ns > current_period {
            self.write_attr("period", state.period_ns)?;
            self.write_attr("duty_cycle", state.duty_cycle_ns)?;
        } else {
            self.write_attr("duty_cycle", state.duty_cycle_ns)?;
            if state.period_ns != current_period {
                self.write_attr("period", state.period_ns)?;
            }
        }

        self.write_attr("enable", u64::from(state.enabled))
    }
}

#[async_trait]
impl PwmDevice for SysfsPwm {
    async fn read_state(&self) -> Result<PwmState> {
        self.read_sync()
    }

    async fn apply_state(&self, state: PwmState) -> Result<()> {
        self.apply_sync(state).inspect_err(|e| warn!("{e}"))
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::{FanActuator, PwmFanActuator};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn fake_channel(period: u64, duty: u64, enable: u64) -> (TempDir, SysfsPwm) {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("pwmchip0/pwm1");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("period"), format!("{period}\n")).unwrap();
        fs::write(dir.join("duty_cycle"), format!("{duty}\n")).unwrap();
        fs::write(dir.join("enable"), format!("{enable}\n")).unwrap();
        let pwm = SysfsPwm::with_root(root.path(), 0, 1);
        (root, pwm)
    }

    fn read(pwm: &SysfsPwm, attr: &str) -> String {
        fs::read_to_string(pwm.attr(attr)).unwrap().trim().to_string()
    }

    #[tokio::test]
    async fn reads_state_from_attributes() {
        let (_root, pwm) = fake_channel(40_000, 12_000, 1);
        let state = pwm.read_state().await.unwrap();
        assert_eq!(
            state,
            PwmState {
                period_ns: 40_000,
                duty_cycle_ns: 12_000,
                enabled: true
            }
        );
        assert_eq!(pwm.name(), "pwmchip0/pwm1");
    }

    #[tokio::test]
    async fn actuator_writes_inverted_duty_and_enables() {
        let (_root, pwm) = fake_channel(40_000, 0, 0);
        let actuator = PwmFanActuator::new(pwm);

        actuator.set_speed(70).await.unwrap();

        assert_eq!(read(actuator.device(), "duty_cycle"), "12000");
        assert_eq!(read(actuator.device(), "period"), "40000");
        assert_eq!(read(actuator.device(), "enable"), "1");
    }

    #[tokio::test]
    async fn zero_period_channel_gets_default_period() {
        let (_root, pwm) = fake_channel(0, 0, 0);
        let actuator = PwmFanActuator::new(pwm);

        actuator.set_speed(0).await.unwrap();

        assert_eq!(read(actuator.device(), "period"), "40000");
        assert_eq!(read(actuator.device(), "duty_cycle"), "40000");
    }

    #[tokio::test]
    async fn missing_channel_reports_actuator_error() {
        let root = TempDir::new().unwrap();
        let pwm = SysfsPwm::with_root(root.path(), 3, 0);
        let err = pwm.read_state().await.unwrap_err();
        assert!(matches!(err, FanError::ActuatorApply { .. }));
    }

    #[tokio::test]
    async fn open_exports_channel_when_missing() {
        let root = TempDir::new().unwrap();
        let chip = root.path().join("pwmchip2");
        fs::create_dir_all(&chip).unwrap();
        fs::write(chip.join("export"), "").unwrap();

        let pwm = SysfsPwm::with_root(root.path(), 2, 0);
        // Nothing creates the channel directory here, so only the export write is observable
        assert!(pwm.open(None).await.is_ok());
        assert_eq!(fs::read_to_string(chip.join("export")).unwrap(), "0");
    }

    #[tokio::test(start_paused = true)]
    async fn export_settle_delay_yields_to_other_tasks() {
        let root = TempDir::new().unwrap();
        let chip = root.path().join("pwmchip2");
        fs::create_dir_all(&chip).unwrap();
        fs::write(chip.join("export"), "").unwrap();

        let ran = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = ran.clone();
        tokio::spawn(async move { flag.store(true, std::sync::atomic::Ordering::SeqCst) });

        let pwm = SysfsPwm::with_root(root.path(), 2, 0);
        pwm.open(None).await.unwrap();
        assert!(ran.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn open_fails_without_chip() {
        let root = TempDir::new().unwrap();
        let pwm = SysfsPwm::with_root(root.path(), 9, 0);
        assert!(pwm.open(None).await.is_err());
    }

    #[tokio::test]
    async fn open_seeds_configured_period() {
        let (_root, pwm) = fake_channel(0, 0, 0);
        pwm.open(Some(50_000)).await.unwrap();
        assert_eq!(read(&pwm, "period"), "50000");
    }
}
