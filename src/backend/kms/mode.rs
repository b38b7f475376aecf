// SPDX-License-Identifier: GPL-3.0-only

use tracing::{debug, warn};

use super::{
    device::{ConnectorInfo, ModeInfo},
    drm_helpers::{mode_variable, parse_mode_override},
    format::PixelFormat,
    OutputError,
};

/// Resolves the mode and pixel format to drive `conn` with.
///
/// `lookup` resolves an environment variable name, an override named after
/// the connector (see [`mode_variable`]) takes precedence over the first
/// advertised mode.
pub fn select_mode<M: Copy>(
    conn: &ConnectorInfo<M>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(ModeInfo<M>, &'static PixelFormat), OutputError> {
    let Some(preferred) = conn.modes.first() else {
        return Err(OutputError::NoModes);
    };

    let name = mode_variable(conn.interface, conn.interface_id);
    let requested = match lookup(&name).map(|value| parse_mode_override(&value)) {
        Some(Ok(requested)) => requested,
        Some(Err(err)) => {
            warn!(?err, "Ignoring {}", name);
            return Ok((*preferred, PixelFormat::default_format()));
        }
        None => return Ok((*preferred, PixelFormat::default_format())),
    };

    let mode = conn
        .modes
        .iter()
        .find(|mode| mode.width == requested.width && mode.height == requested.height)
        .ok_or(OutputError::ModeNotFound {
            width: requested.width,
            height: requested.height,
        })?;

    let format = match requested.format.as_deref().map(PixelFormat::by_name) {
        Some(Ok(format)) => format,
        Some(Err(err)) => {
            warn!("{}, using {}", err, PixelFormat::default_format());
            PixelFormat::default_format()
        }
        None => PixelFormat::default_format(),
    };

    debug!(
        "{} requests {}x{} in {}",
        name, mode.width, mode.height, format
    );
    Ok((*mode, format))
}
