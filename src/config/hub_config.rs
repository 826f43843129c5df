use crate::errors::{ConfigError, ConfigResult};
use crate::mux::MUX_CHANNELS;
use crate::report::ReportFormat;
use crate::topology::BulbMask;
use serde::Deserialize;
use std::fs;

/// Root of `hub.toml`. Every field has a default, an empty file is valid.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub bus: BusSection,
    pub discovery: DiscoverySection,
    pub polling: PollingSection,
    pub report: ReportSection,
    /// Per-channel overrides, one `[[channel]]` table each
    #[serde(rename = "channel")]
    pub channels: Vec<ChannelOverride>,
}

/// `[bus]` - transport and fixed device addresses
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BusSection {
    pub path: String,
    pub mux_address: u8,
    pub sensor_address: u8,
    pub button_address: u8,
    /// Delay between virtual register handshake polls
    pub handshake_poll_ms: u64,
}

impl Default for BusSection {
    fn default() -> Self {
        Self {
            path: "/dev/i2c-1".to_string(),
            mux_address: 0x70,
            sensor_address: 0x49,
            button_address: 0x6F,
            handshake_poll_ms: 5,
        }
    }
}

/// `[discovery]` - one-time bring-up settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscoverySection {
    pub integration_time: u8,
    pub measurement_mode: u8,
    pub bulb_current: u8,
    pub triad_bulb_current: u8,
    pub triad_integration_cycles: u8,
    pub button_debounce_ms: u16,
    /// Extra attempts at selecting a mux port before giving up on it
    pub select_retries: u8,
    pub default_bulb_mask: u8,
}

impl Default for DiscoverySection {
    fn default() -> Self {
        Self {
            integration_time: 150,
            measurement_mode: 3,
            bulb_current: 0b11,
            triad_bulb_current: 0,
            triad_integration_cycles: 150,
            button_debounce_ms: 20,
            select_retries: 2,
            default_bulb_mask: BulbMask::ALL.bits(),
        }
    }
}

/// `[polling]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollingSection {
    pub interval_ms: u64,
    pub indicator_brightness: u8,
    pub device_id: String,
}

impl Default for PollingSection {
    fn default() -> Self {
        Self {
            interval_ms: 50,
            indicator_brightness: 100,
            device_id: "spectro_hub".to_string(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportOutput {
    #[default]
    Stdout,
    Serial,
}

/// `[report]` - where readings go
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportSection {
    pub output: ReportOutput,
    pub format: ReportFormat,
    pub serial_path: String,
    pub baud: u32,
}

impl Default for ReportSection {
    fn default() -> Self {
        Self {
            output: ReportOutput::Stdout,
            format: ReportFormat::Json,
            serial_path: "/dev/ttyACM0".to_string(),
            baud: 115_200,
        }
    }
}

/// One `[[channel]]` entry
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChannelOverride {
    pub index: u8,
    pub bulb_mask: Option<u8>,
    pub led_current: Option<u8>,
    pub integration: Option<u8>,
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.into(),
    }
}

fn check_level(field: &str, value: u8) -> ConfigResult<()> {
    if value > 0b11 {
        return Err(invalid(field, format!("{} is not a 2-bit level", value)));
    }
    Ok(())
}

fn check_mask(field: &str, value: u8) -> ConfigResult<()> {
    if BulbMask::from_bits(value).is_none() {
        return Err(invalid(field, format!("{:#b} is wider than 3 bits", value)));
    }
    Ok(())
}

impl HubConfig {
    /// Parse and validate TOML text
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let parsed: HubConfig = toml::from_str(content)?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        check_level("discovery.measurement_mode", self.discovery.measurement_mode)?;
        check_level("discovery.bulb_current", self.discovery.bulb_current)?;
        check_level("discovery.triad_bulb_current", self.discovery.triad_bulb_current)?;
        check_mask("discovery.default_bulb_mask", self.discovery.default_bulb_mask)?;
        if self.polling.interval_ms == 0 {
            return Err(invalid("polling.interval_ms", "must be greater than zero"));
        }

        for ch in &self.channels {
            if ch.index >= MUX_CHANNELS {
                return Err(invalid("channel.index", format!("{} is out of range 0-7", ch.index)));
            }
            if let Some(mask) = ch.bulb_mask {
                check_mask("channel.bulb_mask", mask)?;
            }
            if let Some(level) = ch.led_current {
                check_level("channel.led_current", level)?;
            }
        }
        Ok(())
    }
}

/// Loads config from TOML file
pub fn load_hub_config(path: &str) -> ConfigResult<HubConfig> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::LoadError {
        path: path.to_string(),
        source,
    })?;
    HubConfig::from_toml_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let cfg = HubConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.bus.mux_address, 0x70);
        assert_eq!(cfg.bus.sensor_address, 0x49);
        assert_eq!(cfg.discovery.integration_time, 150);
        assert_eq!(cfg.discovery.button_debounce_ms, 20);
        assert_eq!(cfg.report.output, ReportOutput::Stdout);
        assert!(cfg.channels.is_empty());
    }

    #[test]
    fn test_full_config() {
        let cfg = HubConfig::from_toml_str(
            r#"
            [bus]
            path = "/dev/i2c-3"
            mux_address = 0x71

            [discovery]
            select_retries = 0

            [report]
            output = "serial"
            format = "text"
            serial_path = "/dev/ttyUSB0"

            [[channel]]
            index = 2
            bulb_mask = 0b101
            led_current = 1

            [[channel]]
            index = 5
            integration = 80
            "#,
        )
        .unwrap();

        assert_eq!(cfg.bus.path, "/dev/i2c-3");
        assert_eq!(cfg.bus.mux_address, 0x71);
        assert_eq!(cfg.discovery.select_retries, 0);
        assert_eq!(cfg.report.output, ReportOutput::Serial);
        assert_eq!(cfg.report.format, ReportFormat::Text);
        assert_eq!(cfg.channels.len(), 2);
        assert_eq!(cfg.channels[0].bulb_mask, Some(0b101));
        assert_eq!(cfg.channels[1].integration, Some(80));
        assert_eq!(cfg.channels[1].led_current, None);
    }

    #[test]
    fn test_rejects_out_of_range_channel() {
        let err = HubConfig::from_toml_str("[[channel]]\nindex = 8\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "channel.index"));
    }

    #[test]
    fn test_rejects_wide_bulb_mask() {
        assert!(HubConfig::from_toml_str("[[channel]]\nindex = 1\nbulb_mask = 8\n").is_err());
        assert!(HubConfig::from_toml_str("[discovery]\ndefault_bulb_mask = 15\n").is_err());
    }

    #[test]
    fn test_rejects_bad_toml() {
        assert!(matches!(
            HubConfig::from_toml_str("[bus\n"),
            Err(ConfigError::FormatError(_))
        ));
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let cfg = load_hub_config(concat!(env!("CARGO_MANIFEST_DIR"), "/config/hub.toml")).unwrap();
        assert_eq!(cfg.bus.path, "/dev/i2c-1");
        assert_eq!(cfg.channels.len(), 2);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            load_hub_config("/nonexistent/hub.toml"),
            Err(ConfigError::LoadError { .. })
        ));
    }
}
