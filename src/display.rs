//! Diagnostic display surface.
//!
//! The node can hand each frame, with its detections drawn on top, to a
//! `DisplaySurface` for a human to look at. This path never influences what is
//! published and its failures never abort a tick.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};

use crate::detect::Detection;
use crate::frame::Frame;

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BEST_BOX_COLOR: Rgb<u8> = Rgb([255, 200, 0]);
const BOX_THICKNESS: u32 = 3;

/// Somewhere annotated frames can be shown.
pub trait DisplaySurface {
    fn show(&mut self, frame: &Frame, detections: &[Detection], best: Option<&Detection>)
        -> Result<()>;

    /// Close the surface. Calls after the first do nothing.
    fn close(&mut self);
}

impl<D: DisplaySurface + ?Sized> DisplaySurface for Box<D> {
    fn show(
        &mut self,
        frame: &Frame,
        detections: &[Detection],
        best: Option<&Detection>,
    ) -> Result<()> {
        (**self).show(frame, detections, best)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Writes the latest annotated frame to a JPEG file, replacing it each tick.
pub struct SnapshotDisplay {
    path: PathBuf,
    closed: bool,
}

impl SnapshotDisplay {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            closed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DisplaySurface for SnapshotDisplay {
    fn show(
        &mut self,
        frame: &Frame,
        detections: &[Detection],
        best: Option<&Detection>,
    ) -> Result<()> {
        if self.closed {
            return Err(anyhow!("display {} is closed", self.path.display()));
        }
        let image = annotate(frame, detections, best)?;
        // Write then rename so viewers never read a half-written JPEG.
        let tmp = self.path.with_extension("jpg.tmp");
        image
            .save_with_format(&tmp, image::ImageFormat::Jpeg)
            .with_context(|| format!("write snapshot {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replace snapshot {}", self.path.display()))?;
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            log::info!("SnapshotDisplay: closed {}", self.path.display());
        }
    }
}

/// Copy the frame into an image and draw one rectangle per detection.
///
/// The best detection, when given, is drawn last in a distinct colour.
pub fn annotate(frame: &Frame, detections: &[Detection], best: Option<&Detection>) -> Result<RgbImage> {
    let mut image = RgbImage::from_raw(frame.width, frame.height, frame.pixels().to_vec())
        .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", frame.width, frame.height))?;
    let dims = image.dimensions();

    for det in detections {
        if let Some(bbox) = normalize_box(det.bbox, dims) {
            draw_rect(&mut image, bbox, BOX_COLOR, BOX_THICKNESS);
        }
    }
    if let Some(bbox) = best.and_then(|det| normalize_box(det.bbox, dims)) {
        draw_rect(&mut image, bbox, BEST_BOX_COLOR, BOX_THICKNESS);
    }
    Ok(image)
}

/// Map a normalized box into pixel coordinates, clamped to the image.
fn normalize_box(bbox: [f32; 4], dims: (u32, u32)) -> Option<[u32; 4]> {
    let (w, h) = dims;
    if w == 0 || h == 0 {
        return None;
    }
    let clamp = |v: f32, max: u32| -> u32 { (v * max as f32).clamp(0.0, (max - 1) as f32) as u32 };
    let x0 = clamp(bbox[0], w);
    let y0 = clamp(bbox[1], h);
    let x1 = clamp(bbox[2], w);
    let y1 = clamp(bbox[3], h);
    if x0 > x1 || y0 > y1 {
        return None;
    }
    Some([x0, y0, x1, y1])
}

fn draw_rect(img: &mut RgbImage, bbox: [u32; 4], color: Rgb<u8>, thickness: u32) {
    let [x0, y0, x1, y1] = bbox;
    for t in 0..thickness {
        let xx0 = x0.saturating_add(t);
        let yy0 = y0.saturating_add(t);
        let xx1 = x1.saturating_sub(t);
        let yy1 = y1.saturating_sub(t);
        if xx0 > xx1 || yy0 > yy1 {
            break;
        }
        for x in xx0..=xx1 {
            img.put_pixel(x, yy0, color);
            img.put_pixel(x, yy1, color);
        }
        for y in yy0..=yy1 {
            img.put_pixel(xx0, y, color);
            img.put_pixel(xx1, y, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(bbox: [f32; 4]) -> Detection {
        Detection {
            class_name: "apple".to_string(),
            confidence: 0.9,
            bbox,
        }
    }

    #[test]
    fn annotate_draws_box_border() -> Result<()> {
        let frame = Frame::filled(20, 10, [0, 0, 0], 1)?;
        let image = annotate(&frame, &[det([0.0, 0.0, 0.5, 0.5])], None)?;

        assert_eq!(image.get_pixel(0, 0), &BOX_COLOR);
        assert_eq!(image.get_pixel(10, 5), &BOX_COLOR);
        assert_eq!(image.get_pixel(19, 9), &Rgb([0, 0, 0]));
        Ok(())
    }

    #[test]
    fn best_detection_gets_highlight_colour() -> Result<()> {
        let frame = Frame::filled(20, 20, [0, 0, 0], 1)?;
        let best = det([0.5, 0.5, 1.0, 1.0]);
        let image = annotate(&frame, &[best.clone()], Some(&best))?;
        assert_eq!(image.get_pixel(19, 19), &BEST_BOX_COLOR);
        Ok(())
    }

    #[test]
    fn inverted_boxes_are_skipped() {
        assert!(normalize_box([0.8, 0.8, 0.2, 0.2], (100, 100)).is_none());
        assert_eq!(
            normalize_box([-1.0, 0.0, 2.0, 1.0], (100, 50)),
            Some([0, 0, 99, 49])
        );
    }

    #[test]
    fn snapshot_display_writes_jpeg() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("latest.jpg");
        let mut display = SnapshotDisplay::new(&path);
        let frame = Frame::filled(32, 24, [90, 90, 90], 1)?;

        display.show(&frame, &[det([0.1, 0.1, 0.9, 0.9])], None)?;
        let decoded = image::open(&path)?;
        assert_eq!((decoded.width(), decoded.height()), (32, 24));

        display.close();
        assert!(display.show(&frame, &[], None).is_err());
        Ok(())
    }
}
