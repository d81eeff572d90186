//! # Monitor Configuration
//!
//! Settings fixed at attach time. Hosts either build a [`MonitorConfig`] in
//! code or pass the string parameters they read from their platform
//! description to [`MonitorConfig::from_params`].

use alloc::collections::BTreeMap;
use alloc::string::String;

use sdwatch_hal::Nanoseconds;

use crate::busy::DEFAULT_BUSY_TIMEOUT;
use crate::card::SlotType;
use crate::classifier::Thresholds;
use crate::{MonitorError, MonitorResult};

/// Default name reported in change events
pub const DEFAULT_DEVICE_NAME: &str = "sdcard";

/// Monitor configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Name reported as `DEVNAME` and used as log prefix
    pub device_name: String,
    /// Notification thresholds
    pub thresholds: Thresholds,
    /// Time without a real command before a busy card counts as stuck
    pub busy_timeout: Nanoseconds,
    /// Slot type from the platform description, if it has one
    pub slot_type: Option<SlotType>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            device_name: String::from(DEFAULT_DEVICE_NAME),
            thresholds: Thresholds::DEFAULT,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            slot_type: None,
        }
    }
}

impl MonitorConfig {
    /// Set the device name
    pub fn with_device_name(mut self, name: &str) -> Self {
        self.device_name = String::from(name);
        self
    }

    /// Set the notification thresholds
    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Set the busy timeout
    pub fn with_busy_timeout(mut self, timeout: Nanoseconds) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Set the slot type
    pub fn with_slot_type(mut self, slot_type: SlotType) -> Self {
        self.slot_type = Some(slot_type);
        self
    }

    /// Build from string parameters
    ///
    /// Recognized keys: `device-name`, `slot-type`, `busy-timeout-ms`,
    /// `ge-threshold`, `ecc-threshold`, `wp-threshold`, `oor-threshold`.
    /// Unknown keys are ignored; missing keys keep their defaults.
    pub fn from_params(params: &BTreeMap<String, String>) -> MonitorResult<Self> {
        let mut config = Self::default();

        for (key, value) in params {
            let value = value.trim();
            match key.as_str() {
                "device-name" => {
                    if value.is_empty() {
                        return Err(MonitorError::InvalidConfig("device-name"));
                    }
                    config.device_name = String::from(value);
                }
                "slot-type" => {
                    config.slot_type = Some(SlotType::from_raw(parse_u32("slot-type", value)?));
                }
                "busy-timeout-ms" => {
                    let ms = parse_nonzero("busy-timeout-ms", value)?;
                    config.busy_timeout = Nanoseconds::from_millis(u64::from(ms));
                }
                "ge-threshold" => {
                    config.thresholds.general_error = parse_nonzero("ge-threshold", value)?;
                }
                "ecc-threshold" => {
                    config.thresholds.ecc_error = parse_nonzero("ecc-threshold", value)?;
                }
                "wp-threshold" => {
                    config.thresholds.write_protect = parse_nonzero("wp-threshold", value)?;
                }
                "oor-threshold" => {
                    config.thresholds.out_of_range = parse_nonzero("oor-threshold", value)?;
                }
                other => log::debug!("ignoring unknown monitor parameter '{}'", other),
            }
        }

        Ok(config)
    }
}

fn parse_u32(key: &'static str, value: &str) -> MonitorResult<u32> {
    value.parse().map_err(|_| MonitorError::InvalidConfig(key))
}

fn parse_nonzero(key: &'static str, value: &str) -> MonitorResult<u32> {
    match parse_u32(key, value)? {
        0 => Err(MonitorError::InvalidConfig(key)),
        v => Ok(v),
    }
}
