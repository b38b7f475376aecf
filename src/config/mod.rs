// SPDX-License-Identifier: GPL-3.0-only

use clap_lex::RawArgs;
use tracing::{debug, warn};

use std::{ffi::OsStr, path::PathBuf};

use crate::{backend::render::text::TextOverlay, utils::env};

pub mod spinner;

pub const DEFAULT_DIRECTORY: &str = "/usr/share/platsch";
pub const DEFAULT_BASENAME: &str = "splash";

/// Where the splash images are looked up and what is drawn on top.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub directory: PathBuf,
    pub basename: String,
    /// From `platsch_overlay_text`.
    pub overlay: Option<TextOverlay>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            directory: PathBuf::from(DEFAULT_DIRECTORY),
            basename: DEFAULT_BASENAME.to_string(),
            overlay: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Run,
    Help,
    Version,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ArgsError {
    #[error("unknown option `{0}`")]
    UnknownOption(String),
    #[error("unexpected argument `{0}`")]
    Unexpected(String),
    #[error("option `{0}` requires a value")]
    MissingValue(&'static str),
    #[error("value of `{0}` is not valid UTF-8")]
    NotUnicode(&'static str),
}

impl Config {
    /// Defaults, overridden by `platsch_directory`, `platsch_basename`
    /// and `platsch_overlay_text`.
    pub fn from_env() -> Config {
        Config::with_lookup(env::var)
    }

    pub fn with_lookup(lookup: impl Fn(&str) -> Option<String>) -> Config {
        let mut config = Config::default();
        if let Some(directory) = lookup("platsch_directory") {
            config.directory = PathBuf::from(directory);
        }
        if let Some(basename) = lookup("platsch_basename") {
            config.basename = basename;
        }
        if let Some(value) = lookup("platsch_overlay_text") {
            match TextOverlay::parse(&value) {
                Ok(overlay) => config.overlay = Some(overlay),
                Err(err) => warn!(?err, "Ignoring platsch_overlay_text"),
            }
        }
        config
    }

    /// Applies `-d/--directory` and `-b/--basename`.
    /// The first argument is taken to be the program name.
    pub fn parse_args(&mut self, raw_args: &RawArgs) -> Result<Command, ArgsError> {
        let mut cursor = raw_args.cursor();
        let _ = raw_args.next_os(&mut cursor);

        while let Some(arg) = raw_args.next(&mut cursor) {
            if arg.is_escape() {
                return match raw_args.next_os(&mut cursor) {
                    Some(value) => Err(ArgsError::Unexpected(value.to_string_lossy().into())),
                    None => Ok(Command::Run),
                };
            }

            if let Some((long, inline)) = arg.to_long() {
                let option = match long {
                    Ok("help") => return Ok(Command::Help),
                    Ok("version") => return Ok(Command::Version),
                    Ok("directory") => Opt::Directory,
                    Ok("basename") => Opt::Basename,
                    _ => {
                        return Err(ArgsError::UnknownOption(
                            arg.to_value_os().to_string_lossy().into(),
                        ))
                    }
                };
                let value = match inline {
                    Some(value) => value,
                    None => raw_args
                        .next_os(&mut cursor)
                        .ok_or(ArgsError::MissingValue(option.name()))?,
                };
                self.set(option, value)?;
            } else if let Some(mut shorts) = arg.to_short() {
                while let Some(flag) = shorts.next_flag() {
                    let option = match flag {
                        Ok('h') => return Ok(Command::Help),
                        Ok('V') => return Ok(Command::Version),
                        Ok('d') => Opt::Directory,
                        Ok('b') => Opt::Basename,
                        Ok(c) => return Err(ArgsError::UnknownOption(format!("-{}", c))),
                        Err(rest) => {
                            return Err(ArgsError::UnknownOption(rest.to_string_lossy().into()))
                        }
                    };
                    // `-dfoo` or `-d foo`
                    let value = match shorts.next_value_os().filter(|v| !v.is_empty()) {
                        Some(value) => value,
                        None => raw_args
                            .next_os(&mut cursor)
                            .ok_or(ArgsError::MissingValue(option.name()))?,
                    };
                    self.set(option, value)?;
                    break;
                }
            } else {
                return Err(ArgsError::Unexpected(
                    arg.to_value_os().to_string_lossy().into(),
                ));
            }
        }

        Ok(Command::Run)
    }

    fn set(&mut self, option: Opt, value: &OsStr) -> Result<(), ArgsError> {
        match option {
            Opt::Directory => self.directory = PathBuf::from(value),
            Opt::Basename => {
                self.basename = value
                    .to_str()
                    .ok_or(ArgsError::NotUnicode(option.name()))?
                    .to_string()
            }
        }
        debug!("{} = {:?}", option.name(), value);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Opt {
    Directory,
    Basename,
}

impl Opt {
    fn name(self) -> &'static str {
        match self {
            Opt::Directory => "--directory",
            Opt::Basename => "--basename",
        }
    }
}
