// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Configuration file support for iqduo-server.
//!
//! Config is loaded from the `[iqduo-server]` section of `iqduo.toml`.
//! Default search order:
//! 1. Path specified via `--config` CLI argument
//! 2. `./iqduo.toml`
//! 3. `~/.config/iqduo/iqduo.toml`
//! 4. `/etc/iqduo/iqduo.toml`

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use iqduo_app::{ConfigError, ConfigFile};
use iqduo_core::{ChainConfig, ChannelMode, OutputRate};
use iqduo_protocol::linrad::{CONTROL_PORT, RAW16_PORT, TIMF2_PORT};
use iqduo_protocol::PcmLayout;

/// Top-level server configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub general: GeneralConfig,
    /// Resampling chain and LO settings
    pub dsp: DspConfig,
    /// Which output buffers are filled
    pub output: OutputConfig,
    /// UDP datagram export
    pub network: NetworkConfig,
    /// Synthetic IF source
    pub capture: CaptureConfig,
    /// A/B phase analysis
    pub phase: PhaseConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DspConfig {
    /// Complex output rate, 96000 or 192000
    pub sample_rate: u32,
    /// "off", "a" or "ab"
    pub mode: String,
    /// Send channel A on the B network stream as well
    pub duplicate_a: bool,
    /// Mirror the network passband about fs/2
    pub reposition: bool,
    /// Admission polling period in milliseconds
    pub tick_ms: u64,
    /// Initial LO start phases
    pub phase_a_deg: f64,
    pub phase_b_deg: f64,
}

impl Default for DspConfig {
    fn default() -> Self {
        Self {
            sample_rate: 96_000,
            mode: "a".to_string(),
            duplicate_a: false,
            reposition: false,
            tick_ms: 20,
            phase_a_deg: 0.0,
            phase_b_deg: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Fill the network-format buffers
    pub network: bool,
    /// Fill the soundcard-format buffers
    pub soundcard: bool,
    /// 2 (I/Q of one channel) or 4 (both channels)
    pub soundcard_channels: u16,
    /// With two soundcard channels, carry B instead of A
    pub soundcard_select_b: bool,
    /// Append soundcard-format PCM to this file
    pub pcm_path: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            network: true,
            soundcard: false,
            soundcard_channels: 2,
            soundcard_select_b: false,
            pcm_path: None,
        }
    }
}

impl OutputConfig {
    pub fn pcm_layout(&self) -> PcmLayout {
        if self.soundcard_channels == 4 {
            PcmLayout::Quad
        } else {
            PcmLayout::Stereo
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkFormat {
    /// Linrad float I/Q from the network buffers
    #[default]
    Timf2,
    /// Linrad 16-bit I/Q from the soundcard buffers
    Raw16,
}

impl NetworkFormat {
    pub fn default_port(self) -> u16 {
        match self {
            Self::Timf2 => TIMF2_PORT,
            Self::Raw16 => RAW16_PORT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub enabled: bool,
    pub format: NetworkFormat,
    /// Destination host for datagrams
    pub host: String,
    /// Destination port; the format's Linrad port when unset
    pub port: Option<u16>,
    /// Passband centre announced in TIMF2 headers
    pub centre_khz: f64,
    /// Bind address of the RAW16 control listener
    pub control_listen: IpAddr,
    pub control_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            format: NetworkFormat::Timf2,
            host: "127.0.0.1".to_string(),
            port: None,
            centre_khz: 10_125.0,
            control_listen: IpAddr::from([127, 0, 0, 1]),
            control_port: CONTROL_PORT,
        }
    }
}

impl NetworkConfig {
    pub fn resolved_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.format.default_port())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub enabled: bool,
    /// Test tone offset from the 450 kHz LO
    pub tone_offset_hz: f64,
    /// Peak amplitude in ADC counts
    pub amplitude: f64,
    /// Phase of the B tone relative to A
    pub b_phase_deg: f64,
    /// Uniform noise amplitude in ADC counts
    pub noise: f64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tone_offset_hz: 1_000.0,
            amplitude: 8_000.0,
            b_phase_deg: 0.0,
            noise: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseConfig {
    /// Desired A - B phase after correction
    pub required_deg: f64,
    /// Retune B once the measured spread is tight enough
    pub auto_cal: bool,
}

impl ServerConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        validate_log_level(self.general.log_level.as_deref())?;

        OutputRate::try_from(self.dsp.sample_rate)
            .map_err(|_| "[dsp].sample_rate must be 96000 or 192000".to_string())?;
        let mode: ChannelMode = self.dsp.mode.parse().map_err(|_| {
            format!(
                "[dsp].mode '{}' is invalid (expected one of: off, a, ab)",
                self.dsp.mode
            )
        })?;
        if self.dsp.tick_ms == 0 {
            return Err("[dsp].tick_ms must be > 0".to_string());
        }
        if self.dsp.duplicate_a && mode.is_dual() {
            return Err("[dsp].duplicate_a only applies to mode 'a'".to_string());
        }

        if !matches!(self.output.soundcard_channels, 2 | 4) {
            return Err("[output].soundcard_channels must be 2 or 4".to_string());
        }
        if self.output.pcm_path.is_some() && !self.output.soundcard {
            return Err("[output].pcm_path requires [output].soundcard = true".to_string());
        }

        if self.network.enabled {
            if self.network.host.trim().is_empty() {
                return Err("[network].host must be set when network is enabled".to_string());
            }
            if self.network.resolved_port() == 0 {
                return Err("[network].port must be > 0".to_string());
            }
            match self.network.format {
                NetworkFormat::Timf2 if !self.output.network => {
                    return Err(
                        "[network].format 'timf2' requires [output].network = true".to_string()
                    )
                }
                NetworkFormat::Raw16 if !self.output.soundcard => {
                    return Err(
                        "[network].format 'raw16' requires [output].soundcard = true".to_string()
                    )
                }
                NetworkFormat::Raw16 if self.network.control_port == 0 => {
                    return Err("[network].control_port must be > 0".to_string())
                }
                _ => {}
            }
        }

        if self.capture.enabled {
            if !(0.0..=f64::from(i16::MAX)).contains(&self.capture.amplitude) {
                return Err("[capture].amplitude must be in range 0..=32767".to_string());
            }
            if self.capture.noise < 0.0 {
                return Err("[capture].noise must be >= 0".to_string());
            }
        }

        Ok(())
    }

    /// Chain parameters derived from `[dsp]` and `[output]`.
    pub fn chain_config(&self) -> Result<ChainConfig, String> {
        Ok(ChainConfig {
            sample_rate: OutputRate::try_from(self.dsp.sample_rate).map_err(|e| e.to_string())?,
            mode: self.dsp.mode.parse().map_err(|e: iqduo_core::DspError| e.to_string())?,
            duplicate_a: self.dsp.duplicate_a,
            reposition: self.dsp.reposition,
            network_output: self.output.network,
            soundcard_output: self.output.soundcard,
        })
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        <Self as ConfigFile>::load_from_file(path)
    }

    /// Load configuration from the default search paths.
    /// Returns default config if no config file is found.
    pub fn load_from_default_paths() -> Result<(Self, Option<PathBuf>), ConfigError> {
        <Self as ConfigFile>::load_from_default_paths()
    }

    /// Generate an example configuration wrapped under the `[iqduo-server]`
    /// section header, suitable for use in a combined `iqduo.toml` file.
    pub fn example_combined_toml() -> String {
        #[derive(serde::Serialize)]
        struct Wrapper {
            #[serde(rename = "iqduo-server")]
            inner: ServerConfig,
        }
        let example = ServerConfig {
            general: GeneralConfig {
                log_level: Some("info".to_string()),
            },
            dsp: DspConfig {
                mode: "ab".to_string(),
                ..DspConfig::default()
            },
            output: OutputConfig::default(),
            network: NetworkConfig {
                enabled: true,
                port: Some(TIMF2_PORT),
                ..NetworkConfig::default()
            },
            capture: CaptureConfig {
                b_phase_deg: 30.0,
                ..CaptureConfig::default()
            },
            phase: PhaseConfig {
                required_deg: 0.0,
                auto_cal: true,
            },
        };
        toml::to_string_pretty(&Wrapper { inner: example }).unwrap_or_default()
    }
}

fn validate_log_level(level: Option<&str>) -> Result<(), String> {
    if let Some(level) = level {
        match level {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(format!(
                    "[general].log_level '{}' is invalid (expected one of: trace, debug, info, warn, error)",
                    level
                ))
            }
        }
    }
    Ok(())
}

impl ConfigFile for ServerConfig {
    fn section_key() -> &'static str {
        "iqduo-server"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.dsp.sample_rate, 96_000);
        assert_eq!(config.dsp.mode, "a");
        assert_eq!(config.dsp.tick_ms, 20);
        assert!(config.output.network);
        assert!(!config.output.soundcard);
        assert!(!config.network.enabled);
        assert_eq!(config.network.resolved_port(), 50004);
        assert_eq!(config.network.control_port, 49812);
        assert!(config.capture.enabled);
        assert!(!config.phase.auto_cal);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
[general]
log_level = "debug"

[dsp]
sample_rate = 192000
mode = "ab"
reposition = true
tick_ms = 10
phase_b_deg = 45.0

[output]
network = true
soundcard = true
soundcard_channels = 4

[network]
enabled = true
format = "raw16"
host = "192.168.1.20"

[capture]
tone_offset_hz = 2500.0
b_phase_deg = 90.0

[phase]
required_deg = 180.0
auto_cal = true
"#;

        let config: ServerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.log_level.as_deref(), Some("debug"));
        assert_eq!(config.dsp.sample_rate, 192_000);
        assert_eq!(config.dsp.tick_ms, 10);
        assert_eq!(config.output.pcm_layout(), PcmLayout::Quad);
        assert_eq!(config.network.format, NetworkFormat::Raw16);
        assert_eq!(config.network.resolved_port(), 50000);
        assert_eq!(config.capture.b_phase_deg, 90.0);
        assert!(config.phase.auto_cal);
        assert!(config.validate().is_ok());

        let chain = config.chain_config().unwrap();
        assert_eq!(chain.sample_rate, OutputRate::Hz192000);
        assert_eq!(chain.mode, ChannelMode::Ab);
        assert!(chain.reposition);
        assert!(chain.soundcard_output);
    }

    #[test]
    fn test_validate_rejects_bad_rate() {
        let mut config = ServerConfig::default();
        config.dsp.sample_rate = 48_000;
        assert_eq!(
            config.validate().unwrap_err(),
            "[dsp].sample_rate must be 96000 or 192000"
        );
    }

    #[test]
    fn test_validate_rejects_bad_mode() {
        let mut config = ServerConfig::default();
        config.dsp.mode = "stereo".to_string();
        assert!(config.validate().unwrap_err().starts_with("[dsp].mode"));
    }

    #[test]
    fn test_validate_format_needs_buffers() {
        let mut config = ServerConfig::default();
        config.network.enabled = true;
        config.network.format = NetworkFormat::Raw16;
        assert!(config.validate().unwrap_err().contains("[output].soundcard"));
        config.output.soundcard = true;
        assert!(config.validate().is_ok());

        config.network.format = NetworkFormat::Timf2;
        config.output.network = false;
        assert!(config.validate().unwrap_err().contains("[output].network"));
    }

    #[test]
    fn test_validate_soundcard_channels() {
        let mut config = ServerConfig::default();
        config.output.soundcard_channels = 3;
        assert_eq!(
            config.validate().unwrap_err(),
            "[output].soundcard_channels must be 2 or 4"
        );
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = ServerConfig::default();
        config.general.log_level = Some("verbose".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_a_only_single() {
        let mut config = ServerConfig::default();
        config.dsp.mode = "ab".to_string();
        config.dsp.duplicate_a = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_example_toml_round_trips() {
        let example = ServerConfig::example_combined_toml();
        assert!(example.contains("[iqduo-server"));
        let table: toml::Table = toml::from_str(&example).unwrap();
        let section = toml::to_string(&table["iqduo-server"]).unwrap();
        let parsed: ServerConfig = toml::from_str(&section).unwrap();
        assert_eq!(parsed.dsp.mode, "ab");
        assert!(parsed.phase.auto_cal);
        assert!(parsed.validate().is_ok());
    }
}
