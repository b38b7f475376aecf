// SPDX-License-Identifier: GPL-3.0-only

use std::{
    fs::File,
    io::{self, Read},
    path::{Path, PathBuf},
};

use crate::backend::kms::format::PixelFormat;

use super::LoadError;

/// `<dir>/<base>-<width>x<height>-<format>.bin`
pub fn dump_path(
    directory: &Path,
    basename: &str,
    (width, height): (u32, u32),
    format: &PixelFormat,
) -> PathBuf {
    directory.join(format!("{}-{}x{}-{}.bin", basename, width, height, format))
}

/// Reads until `buf` is full or the reader is exhausted, retrying interrupted reads.
pub fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

/// Copies a raw pixel dump into `buf`, which has to be filled completely.
pub fn load(path: &Path, buf: &mut [u8]) -> Result<(), LoadError> {
    let io_error = |source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = File::open(path).map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => LoadError::NotFound(path.to_path_buf()),
        _ => io_error(err),
    })?;

    let read = read_full(&mut file, buf).map_err(io_error)?;
    if read < buf.len() {
        return Err(LoadError::ShortRead {
            read,
            expected: buf.len(),
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    /// Hands out at most `step` bytes per call and fails every other call with EINTR.
    struct Choppy<'a> {
        data: &'a [u8],
        step: usize,
        interrupt: bool,
    }

    impl Read for Choppy<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.interrupt = !self.interrupt;
            if self.interrupt {
                return Err(io::Error::from(io::ErrorKind::Interrupted));
            }
            let n = self.step.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    #[test]
    fn dump_names() {
        let path = dump_path(
            Path::new("/usr/share/platsch"),
            "splash",
            (800, 480),
            PixelFormat::default_format(),
        );
        assert_eq!(
            path,
            Path::new("/usr/share/platsch/splash-800x480-RGB565.bin")
        );
    }

    #[test]
    fn read_full_retries_interrupts() {
        let data: Vec<u8> = (0..=255).collect();
        let mut reader = Choppy {
            data: &data,
            step: 7,
            interrupt: false,
        };
        let mut buf = [0u8; 200];
        assert_eq!(read_full(&mut reader, &mut buf).unwrap(), 200);
        assert_eq!(&buf[..], &data[..200]);
    }

    #[test]
    fn read_full_stops_at_eof() {
        let data = [1u8; 10];
        let mut buf = [0u8; 16];
        assert_eq!(read_full(&mut &data[..], &mut buf).unwrap(), 10);
    }

    #[test]
    fn short_dump_names_the_shortfall() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("splash-4x4-RGB565.bin");
        std::fs::write(&path, [0x42u8; 20]).unwrap();

        let mut buf = [0x11u8; 32];
        let err = load(&path, &mut buf).unwrap_err();
        assert!(matches!(
            err,
            LoadError::ShortRead {
                read: 20,
                expected: 32,
                ..
            }
        ));
        assert!(err.to_string().contains("20/32"));
        assert!(buf[..20].iter().all(|b| *b == 0x42));
        assert!(buf[20..].iter().all(|b| *b == 0x11));
    }

    #[test]
    fn full_dump() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("splash.bin");
        std::fs::write(&path, [0x42u8; 64]).unwrap();

        let mut buf = [0u8; 32];
        load(&path, &mut buf).unwrap();
        assert!(buf.iter().all(|b| *b == 0x42));
        assert!(matches!(
            load(&dir.path().join("missing.bin"), &mut buf),
            Err(LoadError::NotFound(_))
        ));
    }
}
