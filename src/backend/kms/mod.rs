// SPDX-License-Identifier: GPL-3.0-only

use smithay::reexports::drm::control::{connector, crtc, framebuffer};
use tracing::{debug, info, warn};

use std::{collections::HashSet, io};

mod crtc_mapping;
pub mod device;
pub mod drm_helpers;
mod dumb;
pub mod format;
mod mode;
#[cfg(test)]
pub(crate) mod testing;

use device::{DumbBuffer, KmsDevice, ModeInfo};
use format::PixelFormat;

/// How the next [`Session::present`] reaches the screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentState {
    /// The CRTC has to be bound to connector, framebuffer and mode first.
    NeedsModeSet,
    /// The CRTC already scans out for this connector, a page flip is enough.
    FlipReady,
}

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("no usable DRM device found ({candidates} nodes probed)")]
    NoDevice { candidates: u32 },
    #[error("no display output could be configured")]
    NoOutputs,
}

/// Reasons a single connector could not be turned into an [`Output`].
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("connector is not connected")]
    NotConnected,
    #[error("connector advertises no modes")]
    NoModes,
    #[error("no {width}x{height} mode on connector")]
    ModeNotFound { width: u16, height: u16 },
    #[error("no suitable CRTC left")]
    NoCrtc,
    #[error("failed to set up framebuffer")]
    Framebuffer(#[source] io::Error),
    #[error("failed to query device")]
    Query(#[source] io::Error),
}

/// A configured display output and the scan-out buffer it owns.
pub struct Output<D: KmsDevice> {
    pub connector: connector::Handle,
    pub name: String,
    pub crtc: crtc::Handle,
    pub mode: ModeInfo<D::Mode>,
    pub format: &'static PixelFormat,
    /// Bytes per row, as reported by the kernel.
    pub pitch: u32,
    /// Size of the allocation, as reported by the kernel.
    pub size: u64,
    buffer: Option<DumbBuffer>,
    fb: Option<framebuffer::Handle>,
    map: Option<D::Map>,
    state: PresentState,
}

impl<D: KmsDevice> Output<D> {
    pub fn width(&self) -> u32 {
        self.mode.width as u32
    }

    pub fn height(&self) -> u32 {
        self.mode.height as u32
    }

    pub fn state(&self) -> PresentState {
        self.state
    }

    pub fn framebuffer(&self) -> Option<framebuffer::Handle> {
        self.fb
    }

    pub fn pixels(&self) -> Option<&[u8]> {
        self.map.as_deref()
    }

    pub fn pixels_mut(&mut self) -> Option<&mut [u8]> {
        self.map.as_deref_mut()
    }

    fn present(&mut self, device: &D) -> io::Result<()> {
        let fb = self.fb.ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "output has no framebuffer")
        })?;

        match self.state {
            PresentState::NeedsModeSet => {
                device.commit_mode(self.crtc, fb, self.connector, self.mode.timing)?;
                debug!(output = %self.name, crtc = ?self.crtc, "Mode set");
                self.state = PresentState::FlipReady;
            }
            PresentState::FlipReady => device.queue_flip(self.crtc, fb)?,
        }
        Ok(())
    }

    /// Unmaps and releases everything still held. Safe to call repeatedly.
    fn release(&mut self, device: &D) {
        drop(self.map.take());
        if let Some(fb) = self.fb.take() {
            if let Err(err) = device.remove_framebuffer(fb) {
                warn!(?err, output = %self.name, "Failed to remove framebuffer");
            }
        }
        if let Some(buffer) = self.buffer.take() {
            if let Err(err) = device.destroy_dumb(&buffer) {
                warn!(?err, output = %self.name, "Failed to destroy dumb buffer");
            }
        }
    }
}

/// The open device and every output configured on it.
///
/// Outputs are kept in discovery order and their indices stay valid
/// for the lifetime of the session.
pub struct Session<D: KmsDevice> {
    device: D,
    outputs: Vec<Output<D>>,
    master: bool,
}

impl<D: KmsDevice> Session<D> {
    pub fn new(device: D) -> Session<D> {
        Session {
            device,
            outputs: Vec::new(),
            master: true,
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn outputs(&self) -> &[Output<D>] {
        &self.outputs
    }

    pub fn outputs_mut(&mut self) -> &mut [Output<D>] {
        &mut self.outputs
    }

    /// Configures every usable connector. Connectors that fail are logged and
    /// skipped, the number of configured outputs is returned.
    ///
    /// `lookup` resolves mode override variables.
    pub fn discover_outputs(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<usize, OutputError> {
        let res = self.device.resources().map_err(OutputError::Query)?;
        let mut taken: HashSet<crtc::Handle> = self.outputs.iter().map(|o| o.crtc).collect();
        let before = self.outputs.len();

        for conn in res.connectors {
            match self.configure_output(&res.crtcs, conn, &taken, &lookup) {
                Ok(output) => {
                    info!(
                        "{}: {}x{}@{}.{:03}Hz {} on {:?} ({:?})",
                        output.name,
                        output.mode.width,
                        output.mode.height,
                        output.mode.refresh / 1000,
                        output.mode.refresh % 1000,
                        output.format,
                        output.crtc,
                        output.state,
                    );
                    taken.insert(output.crtc);
                    self.outputs.push(output);
                }
                Err(OutputError::NotConnected) => {
                    debug!(connector = ?conn, "Skipping disconnected connector")
                }
                Err(err) => warn!(?err, connector = ?conn, "Skipping connector: {}", err),
            }
        }

        Ok(self.outputs.len() - before)
    }

    fn configure_output(
        &self,
        crtcs: &[crtc::Handle],
        conn: connector::Handle,
        taken: &HashSet<crtc::Handle>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Output<D>, OutputError> {
        let info = self
            .device
            .connector_info(conn)
            .map_err(OutputError::Query)?;
        if !info.connected {
            return Err(OutputError::NotConnected);
        }

        let (mode, format) = mode::select_mode(&info, lookup)?;
        let (crtc, state) = crtc_mapping::assign_crtc(&self.device, crtcs, &info, taken)?;
        let fb = dumb::create_framebuffer(&self.device, mode.size(), format)
            .map_err(OutputError::Framebuffer)?;

        Ok(Output {
            connector: conn,
            name: info.name(),
            crtc,
            mode,
            format,
            pitch: fb.buffer.pitch,
            size: fb.buffer.size,
            buffer: Some(fb.buffer),
            fb: Some(fb.fb),
            map: Some(fb.map),
            state,
        })
    }

    /// Puts the current buffer contents of output `index` on screen.
    pub fn present(&mut self, index: usize) -> io::Result<()> {
        let output = self.outputs.get_mut(index).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no output {}", index))
        })?;
        output.present(&self.device)
    }

    /// Presents every output, returns how many succeeded.
    pub fn present_all(&mut self) -> usize {
        let mut presented = 0;
        for output in &mut self.outputs {
            match output.present(&self.device) {
                Ok(()) => presented += 1,
                Err(err) => warn!(?err, output = %output.name, "Failed to present"),
            }
        }
        presented
    }

    pub fn is_master(&self) -> bool {
        self.master
    }

    /// Gives up DRM master so the next program can take over the device.
    pub fn drop_master(&mut self) -> io::Result<()> {
        if self.master {
            self.device.drop_master()?;
            self.master = false;
            debug!("Dropped DRM master");
        }
        Ok(())
    }

    pub fn teardown(mut self) {
        self.release();
    }

    fn release(&mut self) {
        for mut output in self.outputs.drain(..) {
            output.release(&self.device);
        }
        if let Err(err) = self.drop_master() {
            warn!(?err, "Failed to drop DRM master");
            self.master = false;
        }
    }
}

impl<D: KmsDevice> Drop for Session<D> {
    fn drop(&mut self) {
        self.release();
    }
}
