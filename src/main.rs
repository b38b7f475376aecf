// SPDX-License-Identifier: GPL-3.0-only

use anyhow::{Context, Result};
use clap_lex::RawArgs;
use std::{env, mem, process};
use tracing::{debug, error, info, warn};

use crate::{
    backend::{
        kms::{
            device::{self, Card},
            DeviceError, OutputError, Session,
        },
        render::{self, text::TextRenderer},
    },
    config::{spinner::SpinnerConfig, ArgsError, Command, Config},
    init::Fork,
    spinner::Spinner,
};

pub mod backend;
pub mod config;
pub mod init;
mod logger;
pub mod spinner;
pub mod utils;

fn main() {
    if let Err(err) = main_inner() {
        error!("Error occured in main(): {:?}", err);
        process::exit(exit_code(&err));
    }
}

fn main_inner() -> Result<()> {
    let pid1 = init::is_pid1();
    let git_hash = option_env!("GIT_HASH").unwrap_or("unknown");
    let mut config = Config::from_env();

    // as PID 1 the command line belongs to init
    if !pid1 {
        match config.parse_args(&RawArgs::from_args()) {
            Ok(Command::Run) => {}
            Ok(Command::Help) => {
                print_help(env!("CARGO_PKG_VERSION"), git_hash);
                return Ok(());
            }
            Ok(Command::Version) => {
                println!(
                    "platsch {} (git commit {})",
                    env!("CARGO_PKG_VERSION"),
                    git_hash
                );
                return Ok(());
            }
            Err(err) => {
                eprintln!("platsch: {}, see --help", err);
                return Err(err.into());
            }
        }
    }

    logger::init_logger()?;
    info!("platsch starting up{}", if pid1 { " as init" } else { "" });

    let spinner_config = SpinnerConfig::load(&config.directory).unwrap_or_else(|err| {
        warn!(?err, "Failed to read spinner configuration");
        None
    });

    let mut session = Session::new(device::probe()?);
    let count = session
        .discover_outputs(utils::env::var)
        .context("Failed to enumerate outputs")?;
    if count == 0 {
        return Err(DeviceError::NoOutputs.into());
    }

    // loading the fonts is not free, only do it when there is text to draw
    let mut renderer = None;
    for output in session.outputs_mut() {
        match render::draw(output, &config) {
            Ok(path) => info!("{}: showing {}", output.name, path.display()),
            Err(err) => warn!(?err, "{}: no splash image, staying black", output.name),
        }
        if let Some(overlay) = config.overlay.as_ref() {
            let renderer = renderer.get_or_insert_with(TextRenderer::new);
            match render::draw_overlay(output, renderer, overlay) {
                Ok(true) => debug!("{}: drew {}", output.name, overlay),
                Ok(false) => warn!("{}: nothing drawn for {}", output.name, overlay),
                Err(err) => warn!(?err, "{}: failed to draw overlay text", output.name),
            }
        }
    }
    session.present_all();

    let animation = spinner_config.as_ref().map(|spinner_config| {
        let renderer = renderer.get_or_insert_with(TextRenderer::new);
        (
            spinner::spinners(&session, spinner_config, renderer),
            spinner_config.fps,
        )
    });
    drop(renderer);
    if animation.is_none() {
        if let Err(err) = session.drop_master() {
            warn!(?err, "Failed to drop DRM master");
        }
    }

    match init::fork() {
        Ok(Fork::Child) => {
            if let Err(err) = init::redirect_stdio() {
                warn!(?err, "Failed to detach from console");
            }
            keep_alive(session, animation);
        }
        Ok(Fork::Parent(pid)) => debug!(pid, "Display is kept by child"),
        Err(err) => {
            error!(?err, "Failed to fork");
            if !pid1 {
                keep_alive(session, animation);
            }
        }
    }
    // tearing down would take the child's framebuffers off screen
    mem::forget(session);

    if pid1 {
        return Err(init::exec_init(env::args_os().skip(1)));
    }
    Ok(())
}

fn keep_alive(mut session: Session<Card>, animation: Option<(Vec<Spinner>, u32)>) -> ! {
    match animation {
        Some((mut spinners, fps)) => spinner::run(&mut session, &mut spinners, fps),
        None => init::hold(),
    }
}

fn exit_code(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<ArgsError>().is_some() {
        return 1;
    }
    match err.downcast_ref::<DeviceError>() {
        Some(DeviceError::NoDevice { .. }) => 2,
        Some(DeviceError::NoOutputs) => 3,
        None if err.downcast_ref::<OutputError>().is_some() => 3,
        None => 4,
    }
}

fn print_help(version: &str, git_rev: &str) {
    println!(
        r#"platsch {version} (git commit {git_rev})

Shows a splash image on every connected display and hands over to
/sbin/init when started as PID 1.

Usage: platsch [OPTIONS]

Options:
  -d, --directory <DIR>   Directory holding the images [default: /usr/share/platsch]
  -b, --basename <NAME>   Image file name without extension [default: splash]
  -h, --help              Show this message
  -V, --version           Show the version of platsch

Environment:
  platsch_directory, platsch_basename
                          Defaults for the options above
  platsch_overlay_text=(X,Y,SIZE):TEXT
                          Black text drawn on top of the splash image
  platsch_<type><index>_mode=WIDTHxHEIGHT[@FORMAT]
                          Mode of one output, e.g. platsch_hdmi_a0_mode=1920x1080@XRGB8888"#
    );
}
