//! Decoded camera frames.
//!
//! A `Frame` is produced by a `FrameSource`, handed to the detector and the
//! display surface for the duration of one tick, then dropped. Frames are never
//! retained across ticks.

use anyhow::{anyhow, Result};

/// Decoded RGB24 frame.
pub struct Frame {
    /// Packed RGB pixels, row-major, 3 bytes per pixel.
    pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Capture sequence number assigned by the source (starts at 1).
    pub sequence: u64,
}

impl Frame {
    /// Build a frame from packed RGB24 pixels.
    ///
    /// Fails when the buffer length does not match `width * height * 3`.
    pub fn from_rgb(pixels: Vec<u8>, width: u32, height: u32, sequence: u64) -> Result<Self> {
        let expected = rgb_len(width, height)?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                pixels.len()
            ));
        }
        Ok(Self {
            pixels,
            width,
            height,
            sequence,
        })
    }

    /// Solid-colour frame, mostly useful for synthetic sources and tests.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3], sequence: u64) -> Result<Self> {
        let len = rgb_len(width, height)?;
        let pixels = rgb.iter().copied().cycle().take(len).collect();
        Self::from_rgb(pixels, width, height, sequence)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// RGB triple at `(x, y)`. Caller guarantees the coordinate is in bounds.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        [self.pixels[idx], self.pixels[idx + 1], self.pixels[idx + 2]]
    }

    /// Mean luma in 0..=255, sampled sparsely.
    pub fn mean_luma(&self) -> f32 {
        let mut total = 0u64;
        let mut count = 0u64;
        for px in self.pixels.chunks_exact(3).step_by(97) {
            // BT.601 integer approximation
            total += (299 * px[0] as u64 + 587 * px[1] as u64 + 114 * px[2] as u64) / 1000;
            count += 1;
        }
        if count == 0 {
            0.0
        } else {
            total as f32 / count as f32
        }
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

pub(crate) fn rgb_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rgb_validates_length() {
        assert!(Frame::from_rgb(vec![0u8; 11], 2, 2, 1).is_err());
        assert!(Frame::from_rgb(vec![0u8; 12], 2, 2, 1).is_ok());
    }

    #[test]
    fn filled_frame_has_uniform_pixels() -> Result<()> {
        let frame = Frame::filled(4, 3, [10, 20, 30], 7)?;
        assert_eq!(frame.pixels().len(), 36);
        assert_eq!(frame.pixel(3, 2), [10, 20, 30]);
        assert_eq!(frame.sequence, 7);
        Ok(())
    }

    #[test]
    fn mean_luma_tracks_brightness() -> Result<()> {
        let dark = Frame::filled(16, 16, [0, 0, 0], 1)?;
        let bright = Frame::filled(16, 16, [255, 255, 255], 2)?;
        assert_eq!(dark.mean_luma(), 0.0);
        assert!(bright.mean_luma() > 250.0);
        Ok(())
    }
}
