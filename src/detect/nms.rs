use crate::detect::result::RawDetection;

/// Intersection over union of two `[x0, y0, x1, y1]` boxes.
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let ix0 = a[0].max(b[0]);
    let iy0 = a[1].max(b[1]);
    let ix1 = a[2].min(b[2]);
    let iy1 = a[3].min(b[3]);
    let inter = (ix1 - ix0).max(0.0) * (iy1 - iy0).max(0.0);
    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

/// Per-class non-maximum suppression.
///
/// Sorts by descending confidence (stable, so equal scores keep input order)
/// and drops any box overlapping an already kept box of the same class by more
/// than `iou_threshold`. At most `max_detections` boxes are kept.
pub fn non_maximum_suppression(
    mut candidates: Vec<RawDetection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<RawDetection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<RawDetection> = Vec::new();
    for cand in candidates {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == cand.class_id && iou(&k.bbox, &cand.bbox) > iou_threshold);
        if !suppressed {
            kept.push(cand);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(class_id: u32, confidence: f32, bbox: [f32; 4]) -> RawDetection {
        RawDetection {
            class_id,
            confidence,
            bbox,
        }
    }

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = [0.0, 0.0, 0.5, 0.5];
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
        assert_eq!(iou(&a, &[0.6, 0.6, 0.9, 0.9]), 0.0);
    }

    #[test]
    fn nms_suppresses_overlapping_same_class() {
        let dets = vec![
            raw(0, 0.6, [0.10, 0.10, 0.50, 0.50]),
            raw(0, 0.9, [0.12, 0.12, 0.52, 0.52]),
            raw(1, 0.7, [0.12, 0.12, 0.52, 0.52]),
            raw(0, 0.5, [0.70, 0.70, 0.90, 0.90]),
        ];
        let kept = non_maximum_suppression(dets, 0.45, 100);

        let scores: Vec<f32> = kept.iter().map(|d| d.confidence).collect();
        assert_eq!(scores, vec![0.9, 0.7, 0.5]);
    }

    #[test]
    fn nms_respects_max_detections() {
        let dets = (0..10)
            .map(|i| {
                let x = i as f32 * 0.1;
                raw(0, 0.5, [x, 0.0, x + 0.05, 0.05])
            })
            .collect();
        assert_eq!(non_maximum_suppression(dets, 0.45, 3).len(), 3);
    }
}
