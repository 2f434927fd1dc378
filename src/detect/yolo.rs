//! YOLOv8 output decoding.
//!
//! Ultralytics ONNX exports produce one tensor shaped `[1, 4 + classes, anchors]`
//! where each anchor column is `cx, cy, w, h` in input pixels followed by one
//! score per class (already sigmoid-activated, no separate objectness).

use anyhow::{anyhow, Result};

use crate::detect::nms::non_maximum_suppression;
use crate::detect::result::RawDetection;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct YoloParams {
    /// Square model input size in pixels.
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl Default for YoloParams {
    fn default() -> Self {
        Self {
            input_size: 640,
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
            max_detections: 100,
        }
    }
}

/// Decode a channel-major YOLOv8 output into detections with normalized boxes.
///
/// `output` holds `channels * anchors` values laid out as `[channel][anchor]`.
/// The result is sorted by descending confidence after NMS.
pub fn decode_yolov8(
    output: &[f32],
    channels: usize,
    anchors: usize,
    params: &YoloParams,
) -> Result<Vec<RawDetection>> {
    if channels <= 4 {
        return Err(anyhow!(
            "YOLO output has {} channels, expected 4 box values plus class scores",
            channels
        ));
    }
    let expected = channels
        .checked_mul(anchors)
        .ok_or_else(|| anyhow!("YOLO output shape overflow"))?;
    if output.len() != expected {
        return Err(anyhow!(
            "YOLO output length mismatch: expected {}, got {}",
            expected,
            output.len()
        ));
    }

    let at = |channel: usize, anchor: usize| output[channel * anchors + anchor];
    let scale = params.input_size as f32;
    let mut candidates = Vec::new();

    for anchor in 0..anchors {
        let (class_id, score) = (4..channels)
            .map(|c| (c - 4, at(c, anchor)))
            .fold((0usize, f32::NEG_INFINITY), |best, cur| {
                if cur.1 > best.1 {
                    cur
                } else {
                    best
                }
            });
        if !(score >= params.confidence_threshold) {
            continue;
        }

        let cx = at(0, anchor);
        let cy = at(1, anchor);
        let w = at(2, anchor);
        let h = at(3, anchor);
        let bbox = [
            ((cx - w / 2.0) / scale).clamp(0.0, 1.0),
            ((cy - h / 2.0) / scale).clamp(0.0, 1.0),
            ((cx + w / 2.0) / scale).clamp(0.0, 1.0),
            ((cy + h / 2.0) / scale).clamp(0.0, 1.0),
        ];
        candidates.push(RawDetection {
            class_id: class_id as u32,
            confidence: score.clamp(0.0, 1.0),
            bbox,
        });
    }

    Ok(non_maximum_suppression(
        candidates,
        params.iou_threshold,
        params.max_detections,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a `[channels][anchors]` buffer from anchor-major rows.
    fn channel_major(rows: &[Vec<f32>]) -> Vec<f32> {
        let channels = rows[0].len();
        let mut out = vec![0.0; channels * rows.len()];
        for (anchor, row) in rows.iter().enumerate() {
            for (channel, value) in row.iter().enumerate() {
                out[channel * rows.len() + anchor] = *value;
            }
        }
        out
    }

    #[test]
    fn decodes_boxes_and_best_class() -> Result<()> {
        let rows = vec![
            vec![320.0, 320.0, 64.0, 128.0, 0.10, 0.80],
            vec![100.0, 100.0, 20.0, 20.0, 0.05, 0.10],
        ];
        let params = YoloParams::default();
        let dets = decode_yolov8(&channel_major(&rows), 6, 2, &params)?;

        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_id, 1);
        assert!((dets[0].confidence - 0.80).abs() < 1e-6);
        assert!((dets[0].bbox[0] - 0.45).abs() < 1e-6);
        assert!((dets[0].bbox[1] - 0.40).abs() < 1e-6);
        assert!((dets[0].bbox[2] - 0.55).abs() < 1e-6);
        assert!((dets[0].bbox[3] - 0.60).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn rejects_mismatched_shapes() {
        let params = YoloParams::default();
        assert!(decode_yolov8(&[0.0; 10], 5, 3, &params).is_err());
        assert!(decode_yolov8(&[0.0; 8], 4, 2, &params).is_err());
    }

    #[test]
    fn threshold_filters_everything() -> Result<()> {
        let rows = vec![vec![10.0, 10.0, 5.0, 5.0, 0.2]];
        let params = YoloParams {
            confidence_threshold: 0.5,
            ..YoloParams::default()
        };
        assert!(decode_yolov8(&channel_major(&rows), 5, 1, &params)?.is_empty());
        Ok(())
    }
}
