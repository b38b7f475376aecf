// SPDX-License-Identifier: GPL-3.0-only

use smithay::reexports::drm::control::{connector, crtc, encoder, framebuffer, from_u32};

use std::{
    cell::{Cell, RefCell},
    collections::{HashMap, HashSet},
    io,
    ops::{Deref, DerefMut},
    rc::Rc,
};

use super::{
    device::{ConnectorInfo, DumbBuffer, EncoderInfo, KmsDevice, ModeInfo, Resources},
    format::PixelFormat,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateDumb { size: (u32, u32), bpp: u32 },
    DestroyDumb(u32),
    AddFb(u32),
    RemoveFb(framebuffer::Handle),
    Map(u32),
    Commit {
        crtc: crtc::Handle,
        fb: framebuffer::Handle,
        conn: connector::Handle,
        mode: u32,
    },
    Flip {
        crtc: crtc::Handle,
        fb: framebuffer::Handle,
    },
    DropMaster,
}

#[derive(Debug, Default)]
pub struct Failures {
    pub create_dumb: bool,
    pub add_fb: bool,
    pub map: bool,
    pub flip: bool,
    pub drop_master: bool,
    pub commit: HashSet<crtc::Handle>,
    pub connector_query: HashSet<connector::Handle>,
    pub encoder_query: HashSet<encoder::Handle>,
}

/// Records every successful kernel call and hands out sequential handles.
/// Mode timings are the index into the connector's mode list.
#[derive(Debug, Default)]
pub struct FakeDevice {
    pub crtcs: Vec<crtc::Handle>,
    pub connectors: Vec<connector::Handle>,
    pub connector_info: HashMap<connector::Handle, ConnectorInfo<u32>>,
    pub encoder_info: HashMap<encoder::Handle, EncoderInfo>,
    pub calls: RefCell<Vec<Call>>,
    pub fail: RefCell<Failures>,
    /// Extra bytes the kernel reports on top of `pitch * height`.
    pub size_slack: u64,
    pub unmapped: Rc<Cell<usize>>,
    next_id: Cell<u32>,
}

fn handle<T: From<smithay::reexports::drm::control::RawResourceHandle>>(id: u32) -> T {
    from_u32(id).unwrap()
}

impl FakeDevice {
    pub fn new() -> FakeDevice {
        FakeDevice::default()
    }

    fn next(&self) -> u32 {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        id
    }

    pub fn add_crtc(&mut self) -> crtc::Handle {
        let crtc = handle(self.next());
        self.crtcs.push(crtc);
        crtc
    }

    pub fn add_encoder(&mut self, possible_crtcs: u32, crtc: Option<crtc::Handle>) -> encoder::Handle {
        let encoder = handle(self.next());
        self.encoder_info.insert(
            encoder,
            EncoderInfo {
                handle: encoder,
                crtc,
                possible_crtcs,
            },
        );
        encoder
    }

    /// Adds a connected connector advertising `modes`, bound to `current` if given.
    pub fn add_connector(
        &mut self,
        interface: connector::Interface,
        interface_id: u32,
        modes: &[(u16, u16)],
        encoders: &[encoder::Handle],
        current: Option<encoder::Handle>,
    ) -> connector::Handle {
        let conn = handle(self.next());
        self.connectors.push(conn);
        self.connector_info.insert(
            conn,
            ConnectorInfo {
                handle: conn,
                interface,
                interface_id,
                connected: true,
                modes: modes
                    .iter()
                    .enumerate()
                    .map(|(i, &(width, height))| ModeInfo {
                        width,
                        height,
                        refresh: 60_000,
                        timing: i as u32,
                    })
                    .collect(),
                current_encoder: current,
                encoders: encoders.to_vec(),
            },
        );
        conn
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }

    fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.borrow().iter().filter(|call| pred(call)).count()
    }

    /// Every dumb buffer and framebuffer created was released again.
    pub fn balanced(&self) -> bool {
        self.count(|c| matches!(c, Call::CreateDumb { .. }))
            == self.count(|c| matches!(c, Call::DestroyDumb(_)))
            && self.count(|c| matches!(c, Call::AddFb(_)))
                == self.count(|c| matches!(c, Call::RemoveFb(_)))
            && self.count(|c| matches!(c, Call::Map(_))) == self.unmapped.get()
    }
}

fn injected() -> io::Error {
    io::Error::from_raw_os_error(libc::EINVAL)
}

#[derive(Debug)]
pub struct FakeMap {
    bytes: Vec<u8>,
    unmapped: Rc<Cell<usize>>,
}

impl Deref for FakeMap {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

impl DerefMut for FakeMap {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

impl Drop for FakeMap {
    fn drop(&mut self) {
        self.unmapped.set(self.unmapped.get() + 1);
    }
}

impl KmsDevice for FakeDevice {
    type Mode = u32;
    type Map = FakeMap;

    fn resources(&self) -> io::Result<Resources> {
        Ok(Resources {
            connectors: self.connectors.clone(),
            crtcs: self.crtcs.clone(),
        })
    }

    fn connector_info(&self, handle: connector::Handle) -> io::Result<ConnectorInfo<u32>> {
        if self.fail.borrow().connector_query.contains(&handle) {
            return Err(injected());
        }
        self.connector_info
            .get(&handle)
            .cloned()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }

    fn encoder_info(&self, handle: encoder::Handle) -> io::Result<EncoderInfo> {
        if self.fail.borrow().encoder_query.contains(&handle) {
            return Err(injected());
        }
        self.encoder_info
            .get(&handle)
            .copied()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }

    fn create_dumb(&self, size: (u32, u32), bpp: u32) -> io::Result<DumbBuffer> {
        if self.fail.borrow().create_dumb {
            return Err(injected());
        }
        self.record(Call::CreateDumb { size, bpp });
        // pad rows to 64 bytes like many drivers do
        let pitch = (size.0 * bpp / 8).next_multiple_of(64);
        Ok(DumbBuffer {
            handle: self.next(),
            pitch,
            size: pitch as u64 * size.1 as u64 + self.size_slack,
        })
    }

    fn destroy_dumb(&self, buffer: &DumbBuffer) -> io::Result<()> {
        self.record(Call::DestroyDumb(buffer.handle));
        Ok(())
    }

    fn register_framebuffer(
        &self,
        buffer: &DumbBuffer,
        _size: (u32, u32),
        _format: &PixelFormat,
    ) -> io::Result<framebuffer::Handle> {
        if self.fail.borrow().add_fb {
            return Err(injected());
        }
        self.record(Call::AddFb(buffer.handle));
        Ok(handle(self.next()))
    }

    fn remove_framebuffer(&self, fb: framebuffer::Handle) -> io::Result<()> {
        self.record(Call::RemoveFb(fb));
        Ok(())
    }

    fn map_dumb(&self, buffer: &DumbBuffer) -> io::Result<FakeMap> {
        if self.fail.borrow().map {
            return Err(injected());
        }
        self.record(Call::Map(buffer.handle));
        Ok(FakeMap {
            // stale contents, the framebuffer code has to clear them
            bytes: vec![0xaa; buffer.size as usize],
            unmapped: self.unmapped.clone(),
        })
    }

    fn commit_mode(
        &self,
        crtc: crtc::Handle,
        fb: framebuffer::Handle,
        conn: connector::Handle,
        mode: u32,
    ) -> io::Result<()> {
        self.record(Call::Commit {
            crtc,
            fb,
            conn,
            mode,
        });
        if self.fail.borrow().commit.contains(&crtc) {
            return Err(injected());
        }
        Ok(())
    }

    fn queue_flip(&self, crtc: crtc::Handle, fb: framebuffer::Handle) -> io::Result<()> {
        self.record(Call::Flip { crtc, fb });
        if self.fail.borrow().flip {
            return Err(injected());
        }
        Ok(())
    }

    fn drop_master(&self) -> io::Result<()> {
        self.record(Call::DropMaster);
        if self.fail.borrow().drop_master {
            return Err(injected());
        }
        Ok(())
    }
}
