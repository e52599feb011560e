//! Frame sources.

use anyhow::{Context, Result};
use async_trait::async_trait;
use image::imageops::FilterType;
use image::RgbImage;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time::{Interval, MissedTickBehavior};

/// A decoded video frame. Cloning is cheap, the pixels are shared.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: Arc<RgbImage>,
    pub sequence: u64,
    pub captured_at: SystemTime,
}

impl Frame {
    pub fn new(image: RgbImage, sequence: u64) -> Self {
        Self {
            image: Arc::new(image),
            sequence,
            captured_at: SystemTime::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Supplies frames one at a time, in order.
#[async_trait]
pub trait VideoSource: Send {
    /// Waits for the next frame. `Ok(None)` means the source has ended.
    async fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Replays the still images of a directory as a looping video at a fixed frame rate.
pub struct DirectorySource {
    frames: Vec<Arc<RgbImage>>,
    next: usize,
    sequence: u64,
    pacing: Interval,
}

impl DirectorySource {
    /// Decodes every image in `dir` (sorted by file name) and scales it to `width`x`height`.
    pub async fn open(dir: &Path, fps: u32, width: u32, height: u32) -> Result<Self> {
        let paths = image_paths(dir)?;
        if paths.is_empty() {
            anyhow::bail!("No images found in {:?}", dir);
        }
        info!("Loading {} frames from {:?}", paths.len(), dir);

        let frames = tokio::task::spawn_blocking(move || -> Result<Vec<Arc<RgbImage>>> {
            let mut frames = Vec::with_capacity(paths.len());
            for path in paths {
                let decoded = match image::open(&path) {
                    Ok(decoded) => decoded,
                    Err(e) => {
                        warn!("Skipping unreadable frame {:?}: {}", path, e);
                        continue;
                    }
                };
                let mut rgb = decoded.to_rgb8();
                if rgb.dimensions() != (width, height) {
                    rgb = image::imageops::resize(&rgb, width, height, FilterType::Triangle);
                }
                frames.push(Arc::new(rgb));
            }
            Ok(frames)
        })
        .await??;

        if frames.is_empty() {
            anyhow::bail!("None of the images in {:?} could be decoded", dir);
        }

        let period = Duration::from_secs_f64(1.0 / f64::from(fps.max(1)));
        let mut pacing = tokio::time::interval(period);
        pacing.set_missed_tick_behavior(MissedTickBehavior::Skip);

        Ok(Self {
            frames,
            next: 0,
            sequence: 0,
            pacing,
        })
    }
}

fn image_paths(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("Cannot read {:?}", dir))? {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "jpg" | "jpeg" | "png"))
            .unwrap_or(false);
        if is_image {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

#[async_trait]
impl VideoSource for DirectorySource {
    async fn next_frame(&mut self) -> Result<Option<Frame>> {
        self.pacing.tick().await;

        let image = Arc::clone(&self.frames[self.next]);
        self.next = (self.next + 1) % self.frames.len();
        self.sequence += 1;
        debug!("Frame {}", self.sequence);

        Ok(Some(Frame {
            image,
            sequence: self.sequence,
            captured_at: SystemTime::now(),
        }))
    }
}
