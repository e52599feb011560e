//! Drawing the annotated preview: the camera frame with hand landmarks and status text on top.

use std::convert::Infallible;
use std::path::PathBuf;

use embedded_graphics::{
    mono_font::{ascii::FONT_10X20, MonoTextStyle},
    pixelcolor::Rgb888,
    prelude::*,
    primitives::{Circle, Line, PrimitiveStyle, Rectangle},
    text::{Alignment, Text},
};
use image::imageops::FilterType;
use image::{Rgb, RgbImage};
use log::warn;
use shared::{CaptureError, HandDetection};

use crate::encode;
use crate::video::Frame;

/// Landmark index pairs forming the hand skeleton (MediaPipe topology).
pub const HAND_CONNECTIONS: &[(usize, usize)] = &[
    (0, 1), (1, 2), (2, 3), (3, 4),
    (0, 5), (5, 6), (6, 7), (7, 8),
    (5, 9), (9, 10), (10, 11), (11, 12),
    (9, 13), (13, 14), (14, 15), (15, 16),
    (13, 17), (0, 17), (17, 18), (18, 19), (19, 20),
];

pub const CONNECTOR_COLOR: Rgb888 = Rgb888::new(0x25, 0x63, 0xEB);
pub const LANDMARK_COLOR: Rgb888 = Rgb888::new(0xDC, 0x26, 0x26);
pub const TEXT_COLOR: Rgb888 = Rgb888::new(0x1F, 0x29, 0x37);
pub const PLACEHOLDER_COLOR: Rgb888 = Rgb888::new(0x6B, 0x72, 0x80);

const CONNECTOR_WIDTH: u32 = 3;
const LANDMARK_RADIUS: u32 = 4;

/// The surface the annotated frames are rendered onto.
///
/// Optionally mirrors every `preview_every`-th rendered frame to a JPEG file so an external
/// viewer can display it.
pub struct DisplaySurface {
    canvas: RgbImage,
    preview_path: Option<PathBuf>,
    preview_every: u32,
    presented: u64,
}

impl DisplaySurface {
    pub fn new(
        width: u32,
        height: u32,
        preview_path: Option<PathBuf>,
        preview_every: u32,
    ) -> Result<Self, CaptureError> {
        if width == 0 || height == 0 {
            return Err(CaptureError::Initialization(format!(
                "display surface has no area ({}x{})",
                width, height
            )));
        }
        if let Some(path) = &preview_path {
            let dir = path.parent().filter(|dir| !dir.as_os_str().is_empty());
            if let Some(dir) = dir {
                if !dir.is_dir() {
                    return Err(CaptureError::Initialization(format!(
                        "preview directory {:?} does not exist",
                        dir
                    )));
                }
            }
        }
        Ok(Self {
            canvas: RgbImage::new(width, height),
            preview_path,
            preview_every: preview_every.max(1),
            presented: 0,
        })
    }

    pub fn width(&self) -> u32 {
        self.canvas.width()
    }

    pub fn height(&self) -> u32 {
        self.canvas.height()
    }

    pub fn canvas(&self) -> &RgbImage {
        &self.canvas
    }

    /// Replaces the canvas contents with `frame`, scaled to the surface size.
    pub fn draw_frame(&mut self, frame: &Frame) {
        if frame.image.dimensions() == self.canvas.dimensions() {
            self.canvas.copy_from_slice(frame.image.as_raw());
        } else {
            self.canvas = image::imageops::resize(
                &*frame.image,
                self.canvas.width(),
                self.canvas.height(),
                FilterType::Triangle,
            );
        }
    }

    /// Draws the connectors and landmark points of one hand.
    pub fn draw_hand(&mut self, hand: &HandDetection) {
        let (width, height) = (self.canvas.width() as f32, self.canvas.height() as f32);
        let point = |index: usize| {
            hand.landmarks
                .get(index)
                .filter(|lm| lm.x.is_finite() && lm.y.is_finite())
                .map(|lm| Point::new(project(lm.x, width), project(lm.y, height)))
        };

        let connector = PrimitiveStyle::with_stroke(CONNECTOR_COLOR, CONNECTOR_WIDTH);
        for &(a, b) in HAND_CONNECTIONS {
            if let (Some(a), Some(b)) = (point(a), point(b)) {
                draw(Line::new(a, b).into_styled(connector), &mut self.canvas);
            }
        }

        let marker = PrimitiveStyle::with_fill(LANDMARK_COLOR);
        for index in 0..hand.landmarks.len() {
            if let Some(center) = point(index) {
                draw(
                    Circle::with_center(center, LANDMARK_RADIUS * 2).into_styled(marker),
                    &mut self.canvas,
                );
            }
        }
    }

    /// Draws a line of text with its baseline at `y`.
    pub fn draw_text(&mut self, x: i32, y: i32, text: &str, color: Rgb888, alignment: Alignment) {
        let style = MonoTextStyle::new(&FONT_10X20, color);
        draw(
            Text::with_alignment(text, Point::new(x, y), style, alignment),
            &mut self.canvas,
        );
    }

    /// Marks the current canvas as shown, mirroring it to the preview file when due.
    pub fn present(&mut self) {
        self.presented += 1;
        let Some(path) = self.preview_path.clone() else {
            return;
        };
        if self.presented % u64::from(self.preview_every) != 0 {
            return;
        }
        let canvas = self.canvas.clone();
        tokio::task::spawn_blocking(move || {
            let result = encode::encode_jpeg(&canvas, 80).and_then(|jpeg| {
                let partial = path.with_extension("jpg.part");
                std::fs::write(&partial, jpeg)?;
                std::fs::rename(&partial, &path)?;
                Ok(())
            });
            if let Err(e) = result {
                warn!("Failed to write preview {:?}: {}", path, e);
            }
        });
    }
}

/// Pixels a projected landmark may lie beyond the canvas edge.
const DRAW_MARGIN: f32 = 64.0;

/// Maps a normalized coordinate onto `extent` pixels, clamped to within [`DRAW_MARGIN`] of the
/// canvas.
fn project(normalized: f32, extent: f32) -> i32 {
    (normalized * extent).clamp(-DRAW_MARGIN, extent + DRAW_MARGIN) as i32
}

fn draw<D: Drawable<Color = Rgb888>>(drawable: D, canvas: &mut RgbImage) {
    match drawable.draw(&mut Target(canvas)) {
        Ok(_) => {}
        Err(infallible) => match infallible {},
    }
}

/// Adapts an [`RgbImage`] to an `embedded-graphics` draw target, clipping at the edges.
struct Target<'a>(&'a mut RgbImage);

impl Dimensions for Target<'_> {
    fn bounding_box(&self) -> Rectangle {
        let (width, height) = self.0.dimensions();
        Rectangle {
            top_left: Point { x: 0, y: 0 },
            size: Size { width, height },
        }
    }
}

impl DrawTarget for Target<'_> {
    type Color = Rgb888;

    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let (width, height) = self.0.dimensions();
        for Pixel(point, color) in pixels {
            if point.x >= 0 && (point.x as u32) < width && point.y >= 0 && (point.y as u32) < height {
                self.0
                    .put_pixel(point.x as u32, point.y as u32, Rgb([color.r(), color.g(), color.b()]));
            }
        }
        Ok(())
    }
}
