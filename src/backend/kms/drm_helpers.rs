// SPDX-License-Identifier: GPL-3.0-only

use smithay::reexports::drm::control::{connector, Mode, ModeFlags};
use std::num::ParseIntError;

/// Name used for logging, e.g. `HDMI-A-1`.
pub fn output_name(interface: connector::Interface, interface_id: u32) -> String {
    format!("{}-{}", interface.as_str(), interface_id)
}

/// Environment variable holding the mode override for a connector,
/// e.g. `platsch_hdmi_a0_mode`.
pub fn mode_variable(interface: connector::Interface, interface_id: u32) -> String {
    let normalized = interface.as_str().to_lowercase().replace('-', "_");
    format!("platsch_{}{}_mode", normalized, interface_id)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeOverride {
    pub width: u16,
    pub height: u16,
    pub format: Option<String>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ModeOverrideError {
    #[error("expected WIDTHxHEIGHT[@FORMAT], got `{0}`")]
    Malformed(String),
    #[error("invalid dimension in `{value}`: {source}")]
    Dimension {
        value: String,
        source: ParseIntError,
    },
}

/// Parses `WIDTHxHEIGHT[@FORMAT]`.
pub fn parse_mode_override(value: &str) -> Result<ModeOverride, ModeOverrideError> {
    let value = value.trim();
    let (resolution, format) = match value.split_once('@') {
        Some((resolution, format)) => (resolution, Some(format)),
        None => (value, None),
    };
    let (width, height) = resolution
        .split_once('x')
        .ok_or_else(|| ModeOverrideError::Malformed(value.to_string()))?;
    let dimension = |s: &str| {
        s.parse::<u16>().map_err(|source| ModeOverrideError::Dimension {
            value: value.to_string(),
            source,
        })
    };

    Ok(ModeOverride {
        width: dimension(width)?,
        height: dimension(height)?,
        format: format
            .filter(|format| !format.is_empty())
            .map(str::to_string),
    })
}

// Returns refresh rate in millihertz
pub fn calculate_refresh_rate(mode: Mode) -> u32 {
    let htotal = mode.hsync().2 as u32;
    let vtotal = mode.vsync().2 as u32;
    if htotal == 0 || vtotal == 0 {
        return 0;
    }
    let mut refresh =
        (mode.clock() as u64 * 1000000_u64 / htotal as u64 + vtotal as u64 / 2) / vtotal as u64;

    if mode.flags().contains(ModeFlags::INTERLACE) {
        refresh *= 2;
    }
    if mode.flags().contains(ModeFlags::DBLSCAN) {
        refresh /= 2;
    }
    if mode.vscan() > 1 {
        refresh /= mode.vscan() as u64;
    }

    refresh as u32
}

#[cfg(test)]
mod test {
    use super::*;
    use smithay::reexports::drm::control::connector::Interface;

    #[test]
    fn variable_names() {
        assert_eq!(mode_variable(Interface::HDMIA, 0), "platsch_hdmi_a0_mode");
        assert_eq!(mode_variable(Interface::DisplayPort, 1), "platsch_dp1_mode");
        assert_eq!(mode_variable(Interface::EmbeddedDisplayPort, 1), "platsch_edp1_mode");
        assert_eq!(mode_variable(Interface::DVII, 2), "platsch_dvi_i2_mode");
        assert_eq!(mode_variable(Interface::Unknown, 3), "platsch_unknown3_mode");
        assert_eq!(mode_variable(Interface::SPI, 1), "platsch_spi1_mode");
        assert_eq!(mode_variable(Interface::USB, 1), "platsch_usb1_mode");
        assert_eq!(mode_variable(Interface::Writeback, 0), "platsch_writeback0_mode");
    }

    #[test]
    fn output_names() {
        assert_eq!(output_name(Interface::HDMIA, 1), "HDMI-A-1");
        assert_eq!(output_name(Interface::LVDS, 1), "LVDS-1");
        assert_eq!(output_name(Interface::SPI, 1), "SPI-1");
        assert_eq!(output_name(Interface::USB, 2), "USB-2");
    }

    #[test]
    fn parse_overrides() {
        assert_eq!(
            parse_mode_override("1920x1080@XRGB8888"),
            Ok(ModeOverride {
                width: 1920,
                height: 1080,
                format: Some("XRGB8888".into()),
            })
        );
        assert_eq!(
            parse_mode_override("800x480"),
            Ok(ModeOverride {
                width: 800,
                height: 480,
                format: None,
            })
        );
        // an empty suffix is the same as no suffix
        assert_eq!(parse_mode_override("800x480@").unwrap().format, None);
        // unknown formats are resolved later, parsing keeps them
        assert_eq!(
            parse_mode_override("640x480@YUYV").unwrap().format.as_deref(),
            Some("YUYV")
        );
    }

    #[test]
    fn reject_malformed_overrides() {
        assert!(matches!(
            parse_mode_override("1920"),
            Err(ModeOverrideError::Malformed(_))
        ));
        assert!(matches!(
            parse_mode_override("axb"),
            Err(ModeOverrideError::Dimension { .. })
        ));
        assert!(matches!(
            parse_mode_override("1920x1080junk@RGB565"),
            Err(ModeOverrideError::Dimension { .. })
        ));
        assert!(parse_mode_override("").is_err());
    }
}
