// SPDX-License-Identifier: GPL-3.0-only

use tracing::{debug, warn};

use crate::backend::render::text::{TextOverlay, DEFAULT_FONT};

use std::{
    fs, io,
    path::{Path, PathBuf},
    str::FromStr,
};

pub const CONFIG_FILE: &str = "spinner.conf";
pub const DEFAULT_SYMBOL: &str = "/usr/share/platsch/spinner.png";
pub const DEFAULT_FPS: u32 = 20;
pub const DEFAULT_TEXT: &str = "Now loading...";

/// Animation parameters. Its presence turns the animation on.
#[derive(Debug, Clone, PartialEq)]
pub struct SpinnerConfig {
    pub symbol: PathBuf,
    pub fps: u32,
    /// Drawn onto the background once.
    pub text: TextOverlay,
}

impl Default for SpinnerConfig {
    fn default() -> Self {
        SpinnerConfig {
            symbol: PathBuf::from(DEFAULT_SYMBOL),
            fps: DEFAULT_FPS,
            text: TextOverlay {
                text: DEFAULT_TEXT.to_string(),
                x: 100,
                y: 100,
                size: 30.,
                font: DEFAULT_FONT.to_string(),
            },
        }
    }
}

impl SpinnerConfig {
    /// Reads `<directory>/spinner.conf`, `None` if there is none.
    pub fn load(directory: &Path) -> io::Result<Option<SpinnerConfig>> {
        let path = directory.join(CONFIG_FILE);
        match fs::read_to_string(&path) {
            Ok(contents) => {
                debug!("Loading {}", path.display());
                Ok(Some(SpinnerConfig::parse(&contents)))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Parses `key=value` lines. Unknown keys and bad values are skipped.
    pub fn parse(contents: &str) -> SpinnerConfig {
        let mut config = SpinnerConfig::default();

        for line in contents.lines() {
            if line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = unquote(value);
            if value.is_empty() {
                continue;
            }

            match key.trim() {
                "symbol" => config.symbol = PathBuf::from(value),
                "fps" => match value.parse::<u32>() {
                    Ok(fps) if fps > 0 => config.fps = fps,
                    _ => warn!("Ignoring invalid fps `{}`", value),
                },
                "text" => config.text.text = value.to_string(),
                "text_font" => config.text.font = value.to_string(),
                "text_x" => set_number(&mut config.text.x, key, value),
                "text_y" => set_number(&mut config.text.y, key, value),
                "text_size" => match value.parse::<u32>() {
                    Ok(size) if size > 0 => config.text.size = size as f32,
                    _ => warn!("Ignoring invalid text_size `{}`", value),
                },
                _ => {}
            }
        }

        config
    }
}

fn set_number<T: FromStr>(target: &mut T, key: &str, value: &str) {
    match value.parse() {
        Ok(number) => *target = number,
        Err(_) => warn!("Ignoring invalid {} `{}`", key.trim(), value),
    }
}

fn unquote(value: &str) -> &str {
    let value = value.trim();
    let value = value.strip_prefix('"').unwrap_or(value);
    value.strip_suffix('"').unwrap_or(value).trim()
}
