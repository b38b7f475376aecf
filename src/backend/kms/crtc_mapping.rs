// SPDX-License-Identifier: GPL-3.0-only

use smithay::reexports::drm::control::crtc;
use tracing::{debug, warn};

use std::collections::HashSet;

use super::{
    device::{ConnectorInfo, KmsDevice},
    OutputError, PresentState,
};

/// Picks a CRTC for `conn` that is not in `taken`.
///
/// We expect the previous drm master (usually the bootloader or firmware
/// console) to leave a sensible configuration behind, so an established
/// encoder/CRTC binding is kept if possible. Such outputs can be flipped
/// right away, everything else needs a full mode-set first.
///
/// `crtcs` must be the device's CRTC list in kernel order, the encoders'
/// capability bitmasks index into it.
pub fn assign_crtc<D: KmsDevice>(
    device: &D,
    crtcs: &[crtc::Handle],
    conn: &ConnectorInfo<D::Mode>,
    taken: &HashSet<crtc::Handle>,
) -> Result<(crtc::Handle, PresentState), OutputError> {
    if let Some(enc) = conn.current_encoder {
        match device.encoder_info(enc) {
            Ok(info) => match info.crtc {
                Some(crtc) if !taken.contains(&crtc) => {
                    debug!(connector = ?conn.handle, ?crtc, "Keeping active CRTC");
                    return Ok((crtc, PresentState::FlipReady));
                }
                Some(crtc) => debug!(connector = ?conn.handle, ?crtc, "Active CRTC already taken"),
                None => {}
            },
            Err(err) => warn!(?err, encoder = ?enc, "Failed to query active encoder"),
        }
    }

    // But just in case we try every encoder the connector can use.
    for enc in &conn.encoders {
        let info = match device.encoder_info(*enc) {
            Ok(info) => info,
            Err(err) => {
                warn!(?err, encoder = ?enc, "Failed to query encoder");
                continue;
            }
        };

        let free = crtcs
            .iter()
            .take(u32::BITS as usize)
            .enumerate()
            .filter(|(i, _)| info.possible_crtcs & (1 << i) != 0)
            .map(|(_, crtc)| *crtc)
            .find(|crtc| !taken.contains(crtc));

        if let Some(crtc) = free {
            debug!(connector = ?conn.handle, encoder = ?enc, ?crtc, "Assigned free CRTC");
            return Ok((crtc, PresentState::NeedsModeSet));
        }
    }

    Err(OutputError::NoCrtc)
}
