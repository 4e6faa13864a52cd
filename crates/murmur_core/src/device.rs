//! Audio Device Enumeration and Lookup

use std::fmt;

use cpal::traits::{DeviceTrait, HostTrait};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};

/// Sample rates probed when summarizing a device
const COMMON_RATES: [u32; 6] = [44100, 48000, 88200, 96000, 176400, 192000];

/// Direction of an audio device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceType {
    Input,
    Output,
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceType::Input => write!(f, "input"),
            DeviceType::Output => write!(f, "output"),
        }
    }
}

/// Serializable summary of a capture or playback device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioDevice {
    /// Human-readable device name, also used to select it
    pub name: String,

    pub device_type: DeviceType,

    /// Whether this is the system default for its direction
    pub is_default: bool,

    /// Common sample rates the device accepts (empty if the query failed)
    pub sample_rates: Vec<u32>,

    pub max_channels: u16,
}

impl fmt::Display for AudioDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = if self.is_default { "*" } else { " " };
        write!(
            f,
            "{} [{}] {} ({} ch",
            marker, self.device_type, self.name, self.max_channels
        )?;
        if !self.sample_rates.is_empty() {
            let rates: Vec<String> = self.sample_rates.iter().map(u32::to_string).collect();
            write!(f, ", {} Hz", rates.join("/"))?;
        }
        write!(f, ")")
    }
}

impl AudioDevice {
    /// Enumerate every input and output device on the default host
    pub fn enumerate_all() -> EngineResult<Vec<AudioDevice>> {
        let host = cpal::default_host();

        let default_input = host.default_input_device().and_then(|d| d.name().ok());
        let default_output = host.default_output_device().and_then(|d| d.name().ok());

        let mut devices = Vec::new();

        if let Ok(inputs) = host.input_devices() {
            devices.extend(inputs.filter_map(|device| {
                Self::summarize(&device, DeviceType::Input, default_input.as_deref()).ok()
            }));
        }

        if let Ok(outputs) = host.output_devices() {
            devices.extend(outputs.filter_map(|device| {
                Self::summarize(&device, DeviceType::Output, default_output.as_deref()).ok()
            }));
        }

        if devices.is_empty() {
            return Err(EngineError::NoDevicesFound);
        }

        debug!("Found {} audio devices", devices.len());
        Ok(devices)
    }

    pub fn enumerate_inputs() -> EngineResult<Vec<AudioDevice>> {
        Ok(Self::enumerate_all()?
            .into_iter()
            .filter(|d| d.device_type == DeviceType::Input)
            .collect())
    }

    pub fn enumerate_outputs() -> EngineResult<Vec<AudioDevice>> {
        Ok(Self::enumerate_all()?
            .into_iter()
            .filter(|d| d.device_type == DeviceType::Output)
            .collect())
    }

    pub fn default_input() -> EngineResult<AudioDevice> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or(EngineError::NoDevicesFound)?;
        let mut summary = Self::summarize(&device, DeviceType::Input, None)?;
        summary.is_default = true;
        Ok(summary)
    }

    pub fn default_output() -> EngineResult<AudioDevice> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or(EngineError::NoDevicesFound)?;
        let mut summary = Self::summarize(&device, DeviceType::Output, None)?;
        summary.is_default = true;
        Ok(summary)
    }

    fn summarize(
        device: &cpal::Device,
        device_type: DeviceType,
        default_name: Option<&str>,
    ) -> EngineResult<Self> {
        let name = device
            .name()
            .map_err(|e| EngineError::DeviceNotFound(e.to_string()))?;
        let is_default = default_name == Some(name.as_str());

        let (sample_rates, max_channels) = match device_type {
            DeviceType::Input => device
                .supported_input_configs()
                .map(|configs| rate_and_channel_support(configs))
                .unwrap_or_default(),
            DeviceType::Output => device
                .supported_output_configs()
                .map(|configs| rate_and_channel_support(configs))
                .unwrap_or_default(),
        };

        Ok(AudioDevice {
            name,
            device_type,
            is_default,
            sample_rates,
            max_channels,
        })
    }
}

/// Common rates covered by any range, plus the widest channel count
fn rate_and_channel_support(
    configs: impl Iterator<Item = cpal::SupportedStreamConfigRange>,
) -> (Vec<u32>, u16) {
    let mut sample_rates = Vec::new();
    let mut max_channels = 0u16;

    for config in configs {
        max_channels = max_channels.max(config.channels());

        let (min, max) = (config.min_sample_rate().0, config.max_sample_rate().0);
        for rate in COMMON_RATES {
            if (min..=max).contains(&rate) && !sample_rates.contains(&rate) {
                sample_rates.push(rate);
            }
        }
    }

    sample_rates.sort_unstable();
    (sample_rates, max_channels)
}

/// Capture device by name, or the host default when `name` is `None`
pub fn find_input_device(name: Option<&str>) -> EngineResult<cpal::Device> {
    let host = cpal::default_host();
    let device = match name {
        None => host.default_input_device().ok_or(EngineError::NoDevicesFound)?,
        Some(wanted) => host
            .input_devices()
            .map_err(|e| EngineError::DeviceNotFound(e.to_string()))?
            .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
            .ok_or_else(|| EngineError::DeviceNotFound(wanted.to_string()))?,
    };
    info!("Using input device: {}", device.name().unwrap_or_default());
    Ok(device)
}

/// Playback device by name, or the host default when `name` is `None`
pub fn find_output_device(name: Option<&str>) -> EngineResult<cpal::Device> {
    let host = cpal::default_host();
    let device = match name {
        None => host
            .default_output_device()
            .ok_or(EngineError::NoDevicesFound)?,
        Some(wanted) => host
            .output_devices()
            .map_err(|e| EngineError::DeviceNotFound(e.to_string()))?
            .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
            .ok_or_else(|| EngineError::DeviceNotFound(wanted.to_string()))?,
    };
    info!("Using output device: {}", device.name().unwrap_or_default());
    Ok(device)
}
