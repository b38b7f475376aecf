// SPDX-License-Identifier: GPL-3.0-only

use smithay::reexports::drm::buffer::DrmFourcc;
use std::fmt;

/// How an opaque RGB color is laid out in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packing {
    /// 5/6/5 bits, little endian
    Rgb565,
    /// B, G, R, X bytes
    Xrgb8888,
}

/// A pixel layout a scan-out buffer can be allocated in.
#[derive(Debug, PartialEq, Eq)]
pub struct PixelFormat {
    pub fourcc: DrmFourcc,
    pub packing: Packing,
    pub bpp: u32,
    pub name: &'static str,
}

/// Supported formats. The first entry is used whenever nothing else was asked for.
pub static FORMATS: [PixelFormat; 2] = [
    PixelFormat {
        fourcc: DrmFourcc::Rgb565,
        packing: Packing::Rgb565,
        bpp: 16,
        name: "RGB565",
    },
    PixelFormat {
        fourcc: DrmFourcc::Xrgb8888,
        packing: Packing::Xrgb8888,
        bpp: 32,
        name: "XRGB8888",
    },
];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown pixel format `{0}`")]
pub struct UnknownFormat(pub String);

impl PixelFormat {
    pub fn default_format() -> &'static PixelFormat {
        &FORMATS[0]
    }

    pub fn by_name(name: &str) -> Result<&'static PixelFormat, UnknownFormat> {
        FORMATS
            .iter()
            .find(|format| format.name == name)
            .ok_or_else(|| UnknownFormat(name.to_string()))
    }

    pub fn bytes_per_pixel(&self) -> usize {
        (self.bpp / 8) as usize
    }

    /// Writes one opaque pixel into `dst`, which must be `bytes_per_pixel()` long.
    pub fn pack(&self, [r, g, b]: [u8; 3], dst: &mut [u8]) {
        match self.packing {
            Packing::Rgb565 => {
                let value =
                    ((r as u16 >> 3) << 11) | ((g as u16 >> 2) << 5) | (b as u16 >> 3);
                dst.copy_from_slice(&value.to_le_bytes());
            }
            Packing::Xrgb8888 => dst.copy_from_slice(&[b, g, r, 0xff]),
        }
    }

    /// Reads back one pixel written by [`PixelFormat::pack`].
    pub fn unpack(&self, src: &[u8]) -> [u8; 3] {
        match self.packing {
            Packing::Rgb565 => {
                let value = u16::from_le_bytes([src[0], src[1]]);
                let r = (value >> 11) as u8;
                let g = (value >> 5) as u8 & 0x3f;
                let b = value as u8 & 0x1f;
                // replicate the high bits so full intensity stays 0xff
                [(r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2)]
            }
            Packing::Xrgb8888 => [src[2], src[1], src[0]],
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
