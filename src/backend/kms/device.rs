// SPDX-License-Identifier: GPL-3.0-only

use rustix::mm::{mmap, munmap, MapFlags, ProtFlags};
use smithay::reexports::drm::{
    self,
    buffer::{self, DrmFourcc, DrmModifier, PlanarBuffer},
    control::{
        connector, crtc, encoder, framebuffer, from_u32, Device as ControlDevice, FbCmd2Flags,
        PageFlipFlags,
    },
    Device as BasicDevice,
};
use tracing::{debug, info, warn};

use std::{
    fmt,
    fs::{File, OpenOptions},
    io,
    ops::{Deref, DerefMut},
    os::fd::{AsFd, BorrowedFd},
    path::{Path, PathBuf},
    ptr::{self, NonNull},
};

use super::{drm_helpers, format::PixelFormat, DeviceError};

/// Directory the card nodes live in.
pub const DRM_DIR: &str = "/dev/dri";
/// Number of `cardN` nodes tried before giving up.
pub const CARD_CANDIDATES: u32 = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resources {
    pub connectors: Vec<connector::Handle>,
    /// In kernel order, the bit positions of `EncoderInfo::possible_crtcs` refer to this list.
    pub crtcs: Vec<crtc::Handle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeInfo<M> {
    pub width: u16,
    pub height: u16,
    /// millihertz
    pub refresh: u32,
    pub timing: M,
}

impl<M> ModeInfo<M> {
    pub fn size(&self) -> (u32, u32) {
        (self.width as u32, self.height as u32)
    }
}

#[derive(Debug, Clone)]
pub struct ConnectorInfo<M> {
    pub handle: connector::Handle,
    pub interface: connector::Interface,
    pub interface_id: u32,
    pub connected: bool,
    pub modes: Vec<ModeInfo<M>>,
    pub current_encoder: Option<encoder::Handle>,
    pub encoders: Vec<encoder::Handle>,
}

impl<M> ConnectorInfo<M> {
    pub fn name(&self) -> String {
        drm_helpers::output_name(self.interface, self.interface_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderInfo {
    pub handle: encoder::Handle,
    pub crtc: Option<crtc::Handle>,
    pub possible_crtcs: u32,
}

/// A kernel allocated, CPU mappable buffer as reported by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumbBuffer {
    pub handle: u32,
    pub pitch: u32,
    pub size: u64,
}

/// Mode-setting primitives the display code is written against.
pub trait KmsDevice {
    /// Opaque mode timing, handed back unchanged on mode-set.
    type Mode: Copy + fmt::Debug;
    /// A CPU mapping of a dumb buffer, unmapped on drop.
    type Map: DerefMut<Target = [u8]>;

    fn resources(&self) -> io::Result<Resources>;
    fn connector_info(&self, handle: connector::Handle) -> io::Result<ConnectorInfo<Self::Mode>>;
    fn encoder_info(&self, handle: encoder::Handle) -> io::Result<EncoderInfo>;

    fn create_dumb(&self, size: (u32, u32), bpp: u32) -> io::Result<DumbBuffer>;
    fn destroy_dumb(&self, buffer: &DumbBuffer) -> io::Result<()>;
    fn register_framebuffer(
        &self,
        buffer: &DumbBuffer,
        size: (u32, u32),
        format: &PixelFormat,
    ) -> io::Result<framebuffer::Handle>;
    fn remove_framebuffer(&self, fb: framebuffer::Handle) -> io::Result<()>;
    fn map_dumb(&self, buffer: &DumbBuffer) -> io::Result<Self::Map>;

    fn commit_mode(
        &self,
        crtc: crtc::Handle,
        fb: framebuffer::Handle,
        conn: connector::Handle,
        mode: Self::Mode,
    ) -> io::Result<()>;
    fn queue_flip(&self, crtc: crtc::Handle, fb: framebuffer::Handle) -> io::Result<()>;
    fn drop_master(&self) -> io::Result<()>;
}

/// An open `/dev/dri/cardN` node.
pub struct Card {
    file: File,
    path: PathBuf,
}

impl fmt::Debug for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Card").field("path", &self.path).finish()
    }
}

impl AsFd for Card {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl drm::Device for Card {}
impl ControlDevice for Card {}

impl Card {
    /// Opens a node and makes sure it answers mode-setting resource queries.
    pub fn open(path: &Path) -> io::Result<Card> {
        // std opens with O_CLOEXEC
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let card = Card {
            file,
            path: path.to_path_buf(),
        };
        let res = card.resource_handles()?;
        info!(
            "DRM resources on {}: connectors={}, crtcs={}, encoders={}",
            path.display(),
            res.connectors().len(),
            res.crtcs().len(),
            res.encoders().len(),
        );
        Ok(card)
    }
}

struct PlanarDumb<'a> {
    buffer: &'a DumbBuffer,
    size: (u32, u32),
    format: DrmFourcc,
}

impl PlanarBuffer for PlanarDumb<'_> {
    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn format(&self) -> DrmFourcc {
        self.format
    }

    fn modifier(&self) -> Option<DrmModifier> {
        None
    }

    fn pitches(&self) -> [u32; 4] {
        [self.buffer.pitch, 0, 0, 0]
    }

    fn handles(&self) -> [Option<buffer::Handle>; 4] {
        [from_u32(self.buffer.handle), None, None, None]
    }

    fn offsets(&self) -> [u32; 4] {
        [0; 4]
    }
}

impl KmsDevice for Card {
    type Mode = drm::control::Mode;
    type Map = MappedRegion;

    fn resources(&self) -> io::Result<Resources> {
        let res = self.resource_handles()?;
        Ok(Resources {
            connectors: res.connectors().to_vec(),
            crtcs: res.crtcs().to_vec(),
        })
    }

    fn connector_info(&self, handle: connector::Handle) -> io::Result<ConnectorInfo<Self::Mode>> {
        let info = self.get_connector(handle, true)?;
        Ok(ConnectorInfo {
            handle,
            interface: info.interface(),
            interface_id: info.interface_id(),
            connected: info.state() == connector::State::Connected,
            modes: info
                .modes()
                .iter()
                .map(|mode| ModeInfo {
                    width: mode.size().0,
                    height: mode.size().1,
                    refresh: drm_helpers::calculate_refresh_rate(*mode),
                    timing: *mode,
                })
                .collect(),
            current_encoder: info.current_encoder(),
            encoders: info.encoders().to_vec(),
        })
    }

    fn encoder_info(&self, handle: encoder::Handle) -> io::Result<EncoderInfo> {
        let info = self.get_encoder(handle)?;
        let res = self.resource_handles()?;
        let allowed = res.filter_crtcs(info.possible_crtcs());
        let possible_crtcs = res
            .crtcs()
            .iter()
            .enumerate()
            .filter(|(_, crtc)| allowed.contains(crtc))
            .fold(0u32, |mask, (i, _)| mask | 1u32.checked_shl(i as u32).unwrap_or(0));

        Ok(EncoderInfo {
            handle,
            crtc: info.crtc(),
            possible_crtcs,
        })
    }

    fn create_dumb(&self, (width, height): (u32, u32), bpp: u32) -> io::Result<DumbBuffer> {
        let created = drm_ffi::mode::dumbbuffer::create(self.as_fd(), width, height, bpp, 0)?;
        Ok(DumbBuffer {
            handle: created.handle,
            pitch: created.pitch,
            size: created.size,
        })
    }

    fn destroy_dumb(&self, buffer: &DumbBuffer) -> io::Result<()> {
        drm_ffi::mode::dumbbuffer::destroy(self.as_fd(), buffer.handle)?;
        Ok(())
    }

    fn register_framebuffer(
        &self,
        buffer: &DumbBuffer,
        size: (u32, u32),
        format: &PixelFormat,
    ) -> io::Result<framebuffer::Handle> {
        let planar = PlanarDumb {
            buffer,
            size,
            format: format.fourcc,
        };
        self.add_planar_framebuffer(&planar, FbCmd2Flags::empty())
    }

    fn remove_framebuffer(&self, fb: framebuffer::Handle) -> io::Result<()> {
        self.destroy_framebuffer(fb)
    }

    fn map_dumb(&self, buffer: &DumbBuffer) -> io::Result<MappedRegion> {
        let len = usize::try_from(buffer.size)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "dumb buffer too large"))?;
        let offset = drm_ffi::mode::dumbbuffer::map(self.as_fd(), buffer.handle, 0, 0)?.offset;

        // SAFETY: a fresh shared mapping of a kernel object, nothing else aliases it
        let ptr = unsafe {
            mmap(
                ptr::null_mut(),
                len,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                self.as_fd(),
                offset,
            )
        }?;

        NonNull::new(ptr.cast::<u8>())
            .map(|ptr| MappedRegion { ptr, len })
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "mmap returned null"))
    }

    fn commit_mode(
        &self,
        crtc: crtc::Handle,
        fb: framebuffer::Handle,
        conn: connector::Handle,
        mode: Self::Mode,
    ) -> io::Result<()> {
        self.set_crtc(crtc, Some(fb), (0, 0), &[conn], Some(mode))
    }

    fn queue_flip(&self, crtc: crtc::Handle, fb: framebuffer::Handle) -> io::Result<()> {
        self.page_flip(crtc, fb, PageFlipFlags::empty(), None)
    }

    fn drop_master(&self) -> io::Result<()> {
        self.release_master_lock()
    }
}

/// Shared read/write mapping of a dumb buffer.
pub struct MappedRegion {
    ptr: NonNull<u8>,
    len: usize,
}

impl fmt::Debug for MappedRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedRegion")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

impl Deref for MappedRegion {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // SAFETY: ptr/len describe a live mapping owned by self
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl DerefMut for MappedRegion {
    fn deref_mut(&mut self) -> &mut [u8] {
        // SAFETY: see Deref, and we hold the only reference
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        // SAFETY: the mapping was created by `map_dumb` with exactly this length
        if let Err(err) = unsafe { munmap(self.ptr.as_ptr().cast(), self.len) } {
            warn!(?err, "Failed to unmap dumb buffer");
        }
    }
}

pub fn card_path(index: u32) -> PathBuf {
    Path::new(DRM_DIR).join(format!("card{}", index))
}

/// Opens the first card node that answers mode-setting queries.
pub fn probe() -> Result<Card, DeviceError> {
    probe_with(Card::open)
}

pub fn probe_with<D>(mut open: impl FnMut(&Path) -> io::Result<D>) -> Result<D, DeviceError> {
    for index in 0..CARD_CANDIDATES {
        let path = card_path(index);
        match open(&path) {
            Ok(device) => {
                info!("Using DRM device {}", path.display());
                return Ok(device);
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => debug!(?err, "Skipping {}", path.display()),
        }
    }

    Err(DeviceError::NoDevice {
        candidates: CARD_CANDIDATES,
    })
}
