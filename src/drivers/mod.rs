//! Hardware backends for the actuator seam.

pub mod sysfs_pwm;

pub use sysfs_pwm::SysfsPwm;
