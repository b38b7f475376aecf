// SPDX-License-Identifier: GPL-3.0-only

use tiny_skia::{IntRect, Pixmap, PixmapPaint, Transform};
use tracing::{debug, info, warn};

use std::{
    f32::consts::PI,
    thread,
    time::{Duration, Instant},
};

use crate::{
    backend::{
        kms::{device::KmsDevice, Output, Session},
        render::{
            self, image,
            text::{TextOverlay, TextRenderer},
        },
    },
    config::spinner::SpinnerConfig,
};

/// Radians per frame.
const ROTATION_STEP: f32 = 0.1;

#[derive(Debug)]
enum Animation {
    /// The symbol spins around the output center.
    Rotation { symbol: Pixmap, angle: f32 },
    /// The symbol is a horizontal strip of square frames shown one after another.
    Sequence { frames: Vec<Pixmap>, current: usize },
}

impl Animation {
    fn new(symbol: Pixmap) -> Option<Animation> {
        let (width, height) = (symbol.width(), symbol.height());
        if width / height <= 2 {
            return Some(Animation::Rotation { symbol, angle: 0. });
        }

        let frames = (0..width / height)
            .map(|i| {
                IntRect::from_xywh((i * height) as i32, 0, height, height)
                    .and_then(|rect| symbol.clone_rect(rect))
            })
            .collect::<Option<Vec<_>>>()?;
        Some(Animation::Sequence { frames, current: 0 })
    }

    /// Draws the next frame centered on `canvas`.
    fn draw(&mut self, canvas: &mut Pixmap) {
        let (cx, cy) = (canvas.width() as f32 / 2., canvas.height() as f32 / 2.);
        let paint = PixmapPaint::default();

        match self {
            Animation::Rotation { symbol, angle } => {
                let transform = Transform::from_rotate_at(angle.to_degrees(), cx, cy).pre_translate(
                    cx - symbol.width() as f32 / 2.,
                    cy - symbol.height() as f32 / 2.,
                );
                canvas.draw_pixmap(0, 0, symbol.as_ref(), &paint, transform, None);

                *angle += ROTATION_STEP;
                if *angle > 2. * PI {
                    *angle = 0.;
                }
            }
            Animation::Sequence { frames, current } => {
                let frame = &frames[*current];
                canvas.draw_pixmap(
                    (cx - frame.width() as f32 / 2.) as i32,
                    (cy - frame.height() as f32 / 2.) as i32,
                    frame.as_ref(),
                    &paint,
                    Transform::identity(),
                    None,
                );
                *current = (*current + 1) % frames.len();
            }
        }
    }
}

/// Animation state of one output.
#[derive(Debug)]
pub struct Spinner {
    output: usize,
    background: Pixmap,
    canvas: Pixmap,
    animation: Option<Animation>,
    failing: bool,
}

impl Spinner {
    /// Without a background the spinner turns on black.
    pub fn new(
        output: usize,
        width: u32,
        height: u32,
        background: Option<Pixmap>,
        symbol: Option<Pixmap>,
    ) -> Option<Spinner> {
        let background = match background {
            Some(background) => background,
            None => Pixmap::new(width, height)?,
        };
        Some(Spinner {
            output,
            canvas: background.clone(),
            background,
            animation: symbol.and_then(Animation::new),
            failing: false,
        })
    }

    /// Animates on top of whatever the output shows right now,
    /// be it the PNG, the raw dump or black.
    pub fn for_output<D: KmsDevice>(
        index: usize,
        output: &Output<D>,
        symbol: Option<&Pixmap>,
    ) -> Option<Spinner> {
        let background = render::output_snapshot(output);
        if background.is_none() {
            debug!("{} has no mapped buffer, animating on black", output.name);
        }
        Spinner::new(index, output.width(), output.height(), background, symbol.cloned())
    }

    /// Puts `text` into the background, so it shows in every frame.
    pub fn draw_text(&mut self, renderer: &mut TextRenderer, text: &TextOverlay) -> bool {
        renderer.draw(&mut self.background, text)
    }

    /// Renders the next frame off-screen.
    pub fn tick(&mut self) -> &Pixmap {
        self.canvas.data_mut().copy_from_slice(self.background.data());
        if let Some(animation) = self.animation.as_mut() {
            animation.draw(&mut self.canvas);
        }
        &self.canvas
    }

    fn frame<D: KmsDevice>(&mut self, session: &mut Session<D>) {
        let Some(output) = session.outputs_mut().get_mut(self.output) else {
            return;
        };
        let (format, pitch) = (output.format, output.pitch);
        let pixmap = self.tick();
        if let Some(pixels) = output.pixels_mut() {
            render::blit(pixmap, format, pitch, pixels);
        }

        match session.present(self.output) {
            Ok(()) => self.failing = false,
            Err(err) if !self.failing => {
                warn!(?err, output = self.output, "Failed to present spinner frame");
                self.failing = true;
            }
            Err(_) => {}
        }
    }
}

/// Builds a spinner for every output of `session`.
pub fn spinners<D: KmsDevice>(
    session: &Session<D>,
    spinner_config: &SpinnerConfig,
    renderer: &mut TextRenderer,
) -> Vec<Spinner> {
    let symbol = image::load(&spinner_config.symbol)
        .map_err(|err| warn!(?err, "Failed to load spinner symbol"))
        .ok();

    session
        .outputs()
        .iter()
        .enumerate()
        .filter_map(|(index, output)| {
            let mut spinner = Spinner::for_output(index, output, symbol.as_ref())?;
            if !spinner.draw_text(renderer, &spinner_config.text) {
                debug!("No spinner text on {}", output.name);
            }
            Some(spinner)
        })
        .collect()
}

/// Duration of one frame at `fps`.
pub fn frame_budget(fps: u32) -> Duration {
    Duration::from_secs(1) / fps.max(1)
}

/// Time left to sleep after a frame took `elapsed`, nothing if it overran.
pub fn remaining(budget: Duration, elapsed: Duration) -> Option<Duration> {
    budget.checked_sub(elapsed).filter(|rest| !rest.is_zero())
}

/// Draws and presents frames forever at `fps`.
pub fn run<D: KmsDevice>(session: &mut Session<D>, spinners: &mut [Spinner], fps: u32) -> ! {
    let budget = frame_budget(fps);
    info!("Animating {} outputs at {} fps", spinners.len(), fps);

    loop {
        let start = Instant::now();
        for spinner in spinners.iter_mut() {
            spinner.frame(session);
        }
        if let Some(rest) = remaining(budget, start.elapsed()) {
            thread::sleep(rest);
        }
    }
}
