// SPDX-License-Identifier: GPL-3.0-only

use tiny_skia::{ColorU8, Pixmap};
use tracing::{debug, warn};

use std::{io, path::PathBuf};

use crate::{
    backend::kms::{device::KmsDevice, format::PixelFormat, Output},
    config::Config,
};

pub mod image;
pub mod raw;
pub mod text;

use self::text::{TextOverlay, TextRenderer};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("{} does not exist", .0.display())]
    NotFound(PathBuf),
    #[error("unsupported image {}: {reason}", path.display())]
    Unsupported { path: PathBuf, reason: String },
    #[error("failed to decode {}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: png::DecodingError,
    },
    #[error("could only read {read}/{expected} bytes from {}", path.display())]
    ShortRead {
        read: usize,
        expected: usize,
        path: PathBuf,
    },
    #[error("failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("output has no mapped buffer")]
    Unmapped,
}

/// Converts `pixmap` into `format` rows of `pitch` bytes.
/// Pixels outside either side are left alone.
pub fn blit(pixmap: &Pixmap, format: &PixelFormat, pitch: u32, dst: &mut [u8]) {
    let bpp = format.bytes_per_pixel();
    let rows = pixmap
        .pixels()
        .chunks_exact(pixmap.width() as usize)
        .zip(dst.chunks_mut(pitch as usize));

    for (src_row, dst_row) in rows {
        for (src, px) in src_row.iter().zip(dst_row.chunks_exact_mut(bpp)) {
            // premultiplied, so this is the image composed onto black
            format.pack([src.red(), src.green(), src.blue()], px);
        }
    }
}

/// Reads `width`x`height` pixels of `format` rows back into an opaque pixmap.
pub fn snapshot(
    src: &[u8],
    format: &PixelFormat,
    pitch: u32,
    width: u32,
    height: u32,
) -> Option<Pixmap> {
    let mut pixmap = Pixmap::new(width, height)?;
    let bpp = format.bytes_per_pixel();
    let rows = pixmap
        .pixels_mut()
        .chunks_exact_mut(width as usize)
        .zip(src.chunks(pitch as usize));

    for (dst_row, src_row) in rows {
        for (dst, px) in dst_row.iter_mut().zip(src_row.chunks_exact(bpp)) {
            let [r, g, b] = format.unpack(px);
            *dst = ColorU8::from_rgba(r, g, b, 0xff).premultiply();
        }
    }
    Some(pixmap)
}

/// What `output` currently shows.
pub fn output_snapshot<D: KmsDevice>(output: &Output<D>) -> Option<Pixmap> {
    snapshot(
        output.pixels()?,
        output.format,
        output.pitch,
        output.width(),
        output.height(),
    )
}

/// Draws `overlay` on top of the buffer contents of `output`.
/// Returns whether any text was drawn.
pub fn draw_overlay<D: KmsDevice>(
    output: &mut Output<D>,
    renderer: &mut TextRenderer,
    overlay: &TextOverlay,
) -> Result<bool, LoadError> {
    let mut pixmap = output_snapshot(output).ok_or(LoadError::Unmapped)?;
    if !renderer.draw(&mut pixmap, overlay) {
        return Ok(false);
    }

    let (format, pitch) = (output.format, output.pitch);
    let pixels = output.pixels_mut().ok_or(LoadError::Unmapped)?;
    blit(&pixmap, format, pitch, pixels);
    Ok(true)
}

/// Fills the buffer of `output` with the configured splash image and
/// returns the file it came from.
///
/// A PNG is preferred, a raw dump matching the output's geometry and format
/// is the fallback. On error the buffer keeps whatever the raw dump could
/// provide, which is black unless a short read happened.
pub fn draw<D: KmsDevice>(output: &mut Output<D>, config: &Config) -> Result<PathBuf, LoadError> {
    let size = (output.width(), output.height());
    let (pitch, format) = (output.pitch, output.format);
    let pixels = output.pixels_mut().ok_or(LoadError::Unmapped)?;

    let png_path = image::image_path(&config.directory, &config.basename);
    match image::load_scaled(&png_path, size.0, size.1) {
        Ok(pixmap) => {
            blit(&pixmap, format, pitch, pixels);
            return Ok(png_path);
        }
        Err(LoadError::NotFound(_)) => debug!("No {}", png_path.display()),
        Err(err) => warn!(?err, "Failed to load {}", png_path.display()),
    }

    let raw_path = raw::dump_path(&config.directory, &config.basename, size, format);
    raw::load(&raw_path, pixels)?;
    Ok(raw_path)
}
