// SPDX-License-Identifier: GPL-3.0-only

use tiny_skia::{ColorU8, FilterQuality, Pixmap, PixmapPaint, Transform};

use std::{
    fs::File,
    io::{self, BufReader},
    path::{Path, PathBuf},
};

use super::LoadError;

pub fn image_path(directory: &Path, basename: &str) -> PathBuf {
    directory.join(format!("{}.png", basename))
}

/// Decodes a PNG into a premultiplied pixmap.
pub fn load(path: &Path) -> Result<Pixmap, LoadError> {
    let file = File::open(path).map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => LoadError::NotFound(path.to_path_buf()),
        _ => LoadError::Io {
            path: path.to_path_buf(),
            source: err,
        },
    })?;
    let decoding = |source| LoadError::Decode {
        path: path.to_path_buf(),
        source,
    };

    let mut decoder = png::Decoder::new(BufReader::new(file));
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut reader = decoder.read_info().map_err(decoding)?;
    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader.next_frame(&mut buf).map_err(decoding)?;
    let bytes = &buf[..info.buffer_size()];

    let unsupported = |reason: String| LoadError::Unsupported {
        path: path.to_path_buf(),
        reason,
    };
    if info.bit_depth != png::BitDepth::Eight {
        return Err(unsupported(format!("bit depth {:?}", info.bit_depth)));
    }
    let mut pixmap = Pixmap::new(info.width, info.height)
        .ok_or_else(|| unsupported(format!("size {}x{}", info.width, info.height)))?;

    let channels = info.color_type.samples();
    let to_rgba: fn(&[u8]) -> ColorU8 = match info.color_type {
        png::ColorType::Grayscale => |px| ColorU8::from_rgba(px[0], px[0], px[0], 0xff),
        png::ColorType::GrayscaleAlpha => |px| ColorU8::from_rgba(px[0], px[0], px[0], px[1]),
        png::ColorType::Rgb => |px| ColorU8::from_rgba(px[0], px[1], px[2], 0xff),
        png::ColorType::Rgba => |px| ColorU8::from_rgba(px[0], px[1], px[2], px[3]),
        png::ColorType::Indexed => return Err(unsupported("unexpanded palette".into())),
    };

    for (dst, src) in pixmap
        .pixels_mut()
        .iter_mut()
        .zip(bytes.chunks_exact(channels))
    {
        *dst = to_rgba(src).premultiply();
    }

    Ok(pixmap)
}

/// Stretches `image` to exactly `width`x`height`.
pub fn scale(image: &Pixmap, width: u32, height: u32) -> Option<Pixmap> {
    if image.width() == width && image.height() == height {
        return Some(image.clone());
    }

    let mut target = Pixmap::new(width, height)?;
    let transform = Transform::from_scale(
        width as f32 / image.width() as f32,
        height as f32 / image.height() as f32,
    );
    let paint = PixmapPaint {
        quality: FilterQuality::Bilinear,
        ..Default::default()
    };
    target.draw_pixmap(0, 0, image.as_ref(), &paint, transform, None);
    Some(target)
}

pub fn load_scaled(path: &Path, width: u32, height: u32) -> Result<Pixmap, LoadError> {
    let image = load(path)?;
    scale(&image, width, height).ok_or_else(|| LoadError::Unsupported {
        path: path.to_path_buf(),
        reason: format!("cannot scale to {}x{}", width, height),
    })
}
