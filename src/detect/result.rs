use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};

/// One detector output row, decoded from backend-specific tensors.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RawDetection {
    pub class_id: u32,
    pub confidence: f32,
    /// Bounding box `[x0, y0, x1, y1]`, normalized 0..1.
    pub bbox: [f32; 4],
}

/// A detection with its class id resolved to a name.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub class_name: String,
    pub confidence: f32,
    pub bbox: [f32; 4],
}

impl Detection {
    /// Text payload published for this detection: `"<class> <conf:.2>"`.
    pub fn message(&self) -> String {
        format!("{} {:.2}", self.class_name, self.confidence)
    }
}

/// Pick the highest-confidence detection.
///
/// Iterates in detector order and only replaces the record holder on a strictly
/// greater confidence, so the earliest of several equal maxima wins. NaN
/// confidences never win. Returns `None` for an empty slice.
///
/// There is no confidence floor: a lone `0.0` detection is returned and is
/// published as `"<class> 0.00"`. Filtering belongs to the detector threshold.
pub fn best_detection(detections: &[Detection]) -> Option<&Detection> {
    let mut best: Option<&Detection> = None;
    for det in detections {
        if det.confidence.is_nan() {
            continue;
        }
        match best {
            Some(current) if det.confidence > current.confidence => best = Some(det),
            None => best = Some(det),
            _ => {}
        }
    }
    best
}

/// Mapping from model class id to human-readable name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClassNames {
    names: HashMap<u32, String>,
}

impl ClassNames {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names
                .into_iter()
                .enumerate()
                .map(|(id, name)| (id as u32, name.into()))
                .collect(),
        }
    }

    /// Load a labels file: one class name per line, line index is the class id.
    ///
    /// Blank lines keep their id but get no name. Lines starting with `#` are
    /// comments and do not consume an id.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read labels file {}", path.display()))?;
        let mut names = HashMap::new();
        let mut id = 0u32;
        for line in raw.lines() {
            let line = line.trim();
            if line.starts_with('#') {
                continue;
            }
            if !line.is_empty() {
                names.insert(id, line.to_string());
            }
            id += 1;
        }
        if names.is_empty() {
            return Err(anyhow!("labels file {} has no class names", path.display()));
        }
        Ok(Self { names })
    }

    /// Resolve a class id. Unknown ids fall back to `class_<id>`.
    pub fn name(&self, class_id: u32) -> String {
        self.names
            .get(&class_id)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", class_id))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Attach names to raw detector output, preserving order.
    pub fn resolve(&self, raw: &[RawDetection]) -> Vec<Detection> {
        raw.iter()
            .map(|det| Detection {
                class_name: self.name(det.class_id),
                confidence: det.confidence,
                bbox: det.bbox,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn det(name: &str, confidence: f32) -> Detection {
        Detection {
            class_name: name.to_string(),
            confidence,
            bbox: [0.0, 0.0, 1.0, 1.0],
        }
    }

    #[test]
    fn best_detection_picks_highest_confidence() {
        let dets = vec![det("apple", 0.4), det("pear", 0.9), det("plum", 0.7)];
        let best = best_detection(&dets).expect("best");
        assert_eq!(best.class_name, "pear");
        assert!(dets.iter().all(|d| best.confidence >= d.confidence));
    }

    #[test]
    fn best_detection_keeps_first_of_ties() {
        let dets = vec![det("lemon", 0.5), det("apple", 0.8), det("banana", 0.8)];
        assert_eq!(best_detection(&dets).unwrap().class_name, "apple");
    }

    #[test]
    fn best_detection_empty_is_none() {
        assert!(best_detection(&[]).is_none());
    }

    #[test]
    fn zero_confidence_detection_still_wins() {
        let dets = vec![det("banana", 0.0)];
        let best = best_detection(&dets).expect("non-empty set has a best");
        assert_eq!(best.message(), "banana 0.00");
    }

    #[test]
    fn best_detection_skips_nan() {
        let dets = vec![det("ghost", f32::NAN), det("kiwi", 0.1)];
        assert_eq!(best_detection(&dets).unwrap().class_name, "kiwi");
        assert!(best_detection(&[det("ghost", f32::NAN)]).is_none());
    }

    #[test]
    fn message_uses_two_decimals() {
        assert_eq!(det("apple", 0.8345).message(), "apple 0.83");
        assert_eq!(det("orange", 1.0).message(), "orange 1.00");
        assert_eq!(det("banana", 0.0).message(), "banana 0.00");
    }

    #[test]
    fn class_names_fall_back_for_unknown_ids() {
        let names = ClassNames::new(["apple", "banana"]);
        assert_eq!(names.name(1), "banana");
        assert_eq!(names.name(7), "class_7");
    }

    #[test]
    fn class_names_load_labels_file() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "# fruit labels")?;
        writeln!(file, "apple")?;
        writeln!(file)?;
        writeln!(file, "orange")?;

        let names = ClassNames::load(file.path())?;
        assert_eq!(names.len(), 2);
        assert_eq!(names.name(0), "apple");
        assert_eq!(names.name(1), "class_1");
        assert_eq!(names.name(2), "orange");
        Ok(())
    }

    #[test]
    fn resolve_preserves_detector_order() {
        let names = ClassNames::new(["apple", "banana"]);
        let raw = [
            RawDetection {
                class_id: 1,
                confidence: 0.3,
                bbox: [0.1, 0.1, 0.2, 0.2],
            },
            RawDetection {
                class_id: 0,
                confidence: 0.6,
                bbox: [0.3, 0.3, 0.4, 0.4],
            },
        ];
        let resolved = names.resolve(&raw);
        assert_eq!(resolved[0].class_name, "banana");
        assert_eq!(resolved[1].class_name, "apple");
        assert_eq!(resolved[1].bbox, [0.3, 0.3, 0.4, 0.4]);
    }
}
