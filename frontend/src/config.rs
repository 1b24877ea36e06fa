use std::path::{Path, PathBuf};

use serde::Deserialize;
use sftester_core::device::n25q::N25qTiming;
use sftester_core::device::sf3::{FlashGeometry, SequencerConfig};
use sftester_core::device::spi_master::{MIN_TX_FIFO_DEPTH, SpiMasterConfig};
use sftester_machines::pmod_sf3::BoardConfig;
use sftester_machines::tester_fsm::TesterConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Contents of `config.toml`. Every key is optional.
///
/// ```toml
/// total-bytes = 33554432
/// frame-ticks = 100000
///
/// [spi]
/// half-period-ticks = 2
/// guard-cycles = 4
///
/// [sequencer]
/// poll-limit = 100000
///
/// [tester]
/// dwell-ticks = 300
/// ```
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
pub struct FrontendConfig {
    pub total_bytes: Option<u32>,
    pub frame_ticks: Option<u64>,
    pub spi: SpiSection,
    pub flash: FlashSection,
    pub sequencer: SequencerSection,
    pub tester: TesterSection,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
pub struct SpiSection {
    pub half_period_ticks: Option<u32>,
    pub guard_cycles: Option<u32>,
    pub tx_fifo_depth: Option<usize>,
    pub rx_fifo_depth: Option<usize>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
pub struct FlashSection {
    pub erase_busy_ticks: Option<u32>,
    pub program_busy_ticks: Option<u32>,
    pub write_status_busy_ticks: Option<u32>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
pub struct SequencerSection {
    pub boot_status_value: Option<u8>,
    pub poll_limit: Option<u32>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
pub struct TesterSection {
    pub dwell_ticks: Option<u32>,
    pub refresh_ticks: Option<u32>,
}

impl FrontendConfig {
    pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    /// Explicit path if given, else the per-user file if it exists, else
    /// defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match default_path() {
            Some(path) if path.is_file() => {
                log::info!("using config {}", path.display());
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Overlay onto the reference board. `small` selects the reduced
    /// geometry unless the file sets `total-bytes`.
    pub fn board_config(&self, small: bool) -> Result<BoardConfig, ConfigError> {
        let defaults = if small {
            BoardConfig::small()
        } else {
            BoardConfig::default()
        };

        let geometry = match self.total_bytes {
            Some(bytes) => {
                let geometry = FlashGeometry::new(bytes);
                if geometry.total_bytes() != bytes {
                    return Err(ConfigError::Invalid(format!(
                        "total-bytes {bytes} is not a multiple of {}",
                        FlashGeometry::small().total_bytes()
                    )));
                }
                geometry
            }
            None => defaults.geometry,
        };

        let spi = SpiMasterConfig {
            half_period_ticks: self.spi.half_period_ticks.unwrap_or(defaults.spi.half_period_ticks),
            guard_cycles: self.spi.guard_cycles.unwrap_or(defaults.spi.guard_cycles),
            tx_fifo_depth: self.spi.tx_fifo_depth.unwrap_or(defaults.spi.tx_fifo_depth),
            rx_fifo_depth: self.spi.rx_fifo_depth.unwrap_or(defaults.spi.rx_fifo_depth),
        };
        if spi.half_period_ticks < 2 {
            return Err(ConfigError::Invalid(
                "spi.half-period-ticks must be at least 2".into(),
            ));
        }
        if spi.tx_fifo_depth < MIN_TX_FIFO_DEPTH {
            return Err(ConfigError::Invalid(format!(
                "spi.tx-fifo-depth must be at least {MIN_TX_FIFO_DEPTH}"
            )));
        }

        let flash = N25qTiming {
            erase_busy_ticks: self.flash.erase_busy_ticks.unwrap_or(defaults.flash.erase_busy_ticks),
            program_busy_ticks: self
                .flash
                .program_busy_ticks
                .unwrap_or(defaults.flash.program_busy_ticks),
            write_status_busy_ticks: self
                .flash
                .write_status_busy_ticks
                .unwrap_or(defaults.flash.write_status_busy_ticks),
        };

        let sequencer = SequencerConfig {
            boot_status_value: self
                .sequencer
                .boot_status_value
                .unwrap_or(defaults.sequencer.boot_status_value),
            poll_limit: self.sequencer.poll_limit.or(defaults.sequencer.poll_limit),
        };
        if sequencer.poll_limit == Some(0) {
            return Err(ConfigError::Invalid("sequencer.poll-limit must be non-zero".into()));
        }

        let tester = TesterConfig {
            dwell_ticks: self.tester.dwell_ticks.unwrap_or(defaults.tester.dwell_ticks),
            refresh_ticks: self.tester.refresh_ticks.unwrap_or(defaults.tester.refresh_ticks),
        };

        Ok(BoardConfig {
            geometry,
            spi,
            sequencer,
            flash,
            tester,
            frame_ticks: self.frame_ticks.unwrap_or(defaults.frame_ticks),
        })
    }
}

/// `<config dir>/sftester/config.toml`.
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("sftester").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<FrontendConfig, ConfigError> {
        FrontendConfig::parse(text, Path::new("test.toml"))
    }

    #[test]
    fn empty_file_gives_reference_board() {
        let config = parse("").unwrap();
        assert_eq!(config, FrontendConfig::default());
        assert_eq!(config.board_config(false).unwrap(), BoardConfig::default());
        assert_eq!(config.board_config(true).unwrap(), BoardConfig::small());
    }

    #[test]
    fn sections_override_defaults() {
        let config = parse(
            r#"
            frame-ticks = 500

            [spi]
            half-period-ticks = 4

            [sequencer]
            poll-limit = 10

            [tester]
            dwell-ticks = 3
            "#,
        )
        .unwrap();
        let board = config.board_config(true).unwrap();
        assert_eq!(board.frame_ticks, 500);
        assert_eq!(board.spi.half_period_ticks, 4);
        assert_eq!(board.spi.guard_cycles, 4);
        assert_eq!(board.sequencer.poll_limit, Some(10));
        assert_eq!(board.tester.dwell_ticks, 3);
        assert_eq!(board.geometry, FlashGeometry::small());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            parse("[spi]\nclock-hz = 5\n"),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn odd_device_size_is_invalid() {
        let config = parse("total-bytes = 1000000\n").unwrap();
        assert!(matches!(
            config.board_config(false),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn fast_bus_clock_is_invalid() {
        let config = parse("[spi]\nhalf-period-ticks = 1\n").unwrap();
        assert!(config.board_config(false).is_err());
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = FrontendConfig::load(Path::new("/nonexistent/sftester.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
