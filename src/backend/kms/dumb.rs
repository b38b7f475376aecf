// SPDX-License-Identifier: GPL-3.0-only

use smithay::reexports::drm::control::framebuffer;
use tracing::{trace, warn};

use std::io;

use super::{
    device::{DumbBuffer, KmsDevice},
    format::PixelFormat,
};

/// A mapped scan-out buffer and the framebuffer object registered for it.
#[derive(Debug)]
pub struct Framebuffer<M> {
    pub buffer: DumbBuffer,
    pub fb: framebuffer::Handle,
    pub map: M,
}

/// Releases whatever was acquired so far, newest first, unless disarmed.
struct Unwind<'a, D: KmsDevice> {
    device: &'a D,
    buffer: Option<DumbBuffer>,
    fb: Option<framebuffer::Handle>,
}

impl<D: KmsDevice> Unwind<'_, D> {
    fn disarm(mut self) {
        self.fb = None;
        self.buffer = None;
    }
}

impl<D: KmsDevice> Drop for Unwind<'_, D> {
    fn drop(&mut self) {
        if let Some(fb) = self.fb.take() {
            if let Err(err) = self.device.remove_framebuffer(fb) {
                warn!(?err, ?fb, "Failed to remove framebuffer");
            }
        }
        if let Some(buffer) = self.buffer.take() {
            if let Err(err) = self.device.destroy_dumb(&buffer) {
                warn!(?err, handle = buffer.handle, "Failed to destroy dumb buffer");
            }
        }
    }
}

/// Allocates, registers and maps a zeroed buffer of `size` pixels in `format`.
///
/// The mapping covers the size the kernel reported for the allocation,
/// which can be larger than `pitch * height`.
pub fn create_framebuffer<D: KmsDevice>(
    device: &D,
    size: (u32, u32),
    format: &'static PixelFormat,
) -> io::Result<Framebuffer<D::Map>> {
    let mut guard = Unwind {
        device,
        buffer: None,
        fb: None,
    };

    let buffer = device.create_dumb(size, format.bpp)?;
    guard.buffer = Some(buffer);
    trace!(
        handle = buffer.handle,
        pitch = buffer.pitch,
        size = buffer.size,
        "Created dumb buffer"
    );

    let fb = device.register_framebuffer(&buffer, size, format)?;
    guard.fb = Some(fb);

    let mut map = device.map_dumb(&buffer)?;
    map.fill(0);

    guard.disarm();
    Ok(Framebuffer { buffer, fb, map })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backend::kms::testing::{Call, FakeDevice};

    #[test]
    fn zeroed_and_kernel_sized() {
        let mut device = FakeDevice::new();
        device.size_slack = 4096;
        let format = PixelFormat::by_name("XRGB8888").unwrap();

        let fb = create_framebuffer(&device, (100, 10), format).unwrap();
        // 400 bytes per row, padded to 448 by the fake driver
        assert_eq!(fb.buffer.pitch, 448);
        assert_eq!(fb.buffer.size, 448 * 10 + 4096);
        assert_eq!(fb.map.len() as u64, fb.buffer.size);
        assert!(fb.map.iter().all(|b| *b == 0));

        assert_eq!(
            device.calls(),
            vec![
                Call::CreateDumb {
                    size: (100, 10),
                    bpp: 32
                },
                Call::AddFb(fb.buffer.handle),
                Call::Map(fb.buffer.handle),
            ]
        );
    }

    #[test]
    fn unwinds_when_registering_fails() {
        let device = FakeDevice::new();
        device.fail.borrow_mut().add_fb = true;

        let err = create_framebuffer(&device, (64, 64), PixelFormat::default_format()).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EINVAL));

        let calls = device.calls();
        assert!(matches!(calls[..], [Call::CreateDumb { .. }, Call::DestroyDumb(_)]));
        assert!(device.balanced());
    }

    #[test]
    fn unwinds_in_reverse_order_when_mapping_fails() {
        let device = FakeDevice::new();
        device.fail.borrow_mut().map = true;

        assert!(create_framebuffer(&device, (64, 64), PixelFormat::default_format()).is_err());

        let calls = device.calls();
        assert_eq!(calls.len(), 4);
        let Call::AddFb(handle) = calls[1] else {
            panic!("unexpected calls {:?}", calls);
        };
        assert!(matches!(calls[2], Call::RemoveFb(_)));
        assert_eq!(calls[3], Call::DestroyDumb(handle));
        assert!(device.balanced());
    }

    #[test]
    fn nothing_to_unwind_when_allocation_fails() {
        let device = FakeDevice::new();
        device.fail.borrow_mut().create_dumb = true;

        assert!(create_framebuffer(&device, (64, 64), PixelFormat::default_format()).is_err());
        assert!(device.calls().is_empty());
    }
}
