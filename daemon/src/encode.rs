use anyhow::Result;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

use crate::video::Frame;

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100)).encode_image(image)?;
    Ok(jpeg)
}

/// Encodes a frame on the blocking pool, keeping the caller's task responsive.
pub async fn snapshot(frame: &Frame, quality: u8) -> Result<Vec<u8>> {
    let image = frame.image.clone();
    tokio::task::spawn_blocking(move || encode_jpeg(&image, quality)).await?
}
