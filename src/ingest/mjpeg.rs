use anyhow::{anyhow, Context, Result};
use image::GenericImageView;

use crate::frame::Frame;

const MAX_JPEG_BYTES: usize = 8 * 1024 * 1024;

/// Decode one MJPEG buffer into an RGB24 frame.
///
/// V4L2 drivers hand back whole mmap buffers; only the first `bytesused` bytes
/// hold the JPEG, and some drivers pad with zeros past the EOI marker, so the
/// buffer is trimmed to the last EOI before decoding.
pub fn decode_mjpeg(bytes: &[u8], sequence: u64) -> Result<Frame> {
    if bytes.is_empty() {
        return Err(anyhow!("empty MJPEG buffer"));
    }
    if bytes.len() > MAX_JPEG_BYTES {
        return Err(anyhow!(
            "MJPEG buffer too large: {} bytes (max {})",
            bytes.len(),
            MAX_JPEG_BYTES
        ));
    }
    if bytes.len() < 2 || bytes[0] != 0xFF || bytes[1] != 0xD8 {
        return Err(anyhow!("buffer does not start with a JPEG SOI marker"));
    }
    let end = find_eoi(bytes).unwrap_or(bytes.len());

    let image = image::load_from_memory_with_format(&bytes[..end], image::ImageFormat::Jpeg)
        .context("decode jpeg")?;
    let (width, height) = image.dimensions();
    let rgb = image.into_rgb8();
    Frame::from_rgb(rgb.into_raw(), width, height, sequence)
}

fn find_eoi(buffer: &[u8]) -> Option<usize> {
    (1..buffer.len())
        .rev()
        .find(|&i| buffer[i - 1] == 0xFF && buffer[i] == 0xD9)
        .map(|i| i + 1)
}
