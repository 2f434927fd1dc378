mod backend;
mod backends;
mod nms;
mod result;
mod yolo;

use std::path::Path;

use anyhow::{anyhow, Result};

pub use backend::DetectorBackend;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use nms::{iou, non_maximum_suppression};
pub use result::{best_detection, ClassNames, Detection, RawDetection};
pub use yolo::{decode_yolov8, YoloParams};

use crate::config::ModelSettings;

/// Load the detection model named by `settings`.
///
/// `stub://` paths select `StubBackend`; anything else must be an existing
/// ONNX file and requires the `backend-tract` feature. A missing or unloadable
/// model is a startup failure.
pub fn load_backend(settings: &ModelSettings) -> Result<Box<dyn DetectorBackend>> {
    let classes = match &settings.labels_path {
        Some(path) => Some(ClassNames::load(path)?),
        None => None,
    };

    if settings.path.starts_with("stub://") {
        let backend = match classes {
            Some(classes) => StubBackend::with_classes(classes),
            None => StubBackend::new(),
        };
        log::info!("detector: stub backend ({})", settings.path);
        return Ok(Box::new(backend));
    }

    let path = Path::new(&settings.path);
    if !path.is_file() {
        return Err(anyhow!("model file {} does not exist", path.display()));
    }
    load_model_file(path, classes.unwrap_or_default(), settings.params)
}

#[cfg(feature = "backend-tract")]
fn load_model_file(
    path: &Path,
    classes: ClassNames,
    params: YoloParams,
) -> Result<Box<dyn DetectorBackend>> {
    if classes.is_empty() {
        log::warn!(
            "detector: no labels file configured for {}, class ids will be reported as class_<id>",
            path.display()
        );
    }
    let mut backend = TractBackend::new(path, classes, params)?;
    backend.warm_up()?;
    log::info!(
        "detector: loaded {} (input {}x{}, conf>={:.2}, iou<={:.2})",
        path.display(),
        params.input_size,
        params.input_size,
        params.confidence_threshold,
        params.iou_threshold
    );
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn load_model_file(
    path: &Path,
    _classes: ClassNames,
    _params: YoloParams,
) -> Result<Box<dyn DetectorBackend>> {
    Err(anyhow!(
        "cannot load {}: built without the 'backend-tract' feature",
        path.display()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    fn settings(path: &str, labels_path: Option<PathBuf>) -> ModelSettings {
        ModelSettings {
            path: path.to_string(),
            labels_path,
            params: YoloParams::default(),
        }
    }

    #[test]
    fn stub_path_loads_stub_backend() -> Result<()> {
        let backend = load_backend(&settings("stub://fruit", None))?;
        assert_eq!(backend.name(), "stub");
        assert_eq!(backend.class_names().name(0), "apple");
        Ok(())
    }

    #[test]
    fn stub_backend_uses_labels_file() -> Result<()> {
        let mut labels = tempfile::NamedTempFile::new()?;
        writeln!(labels, "mango")?;
        let backend = load_backend(&settings(
            "stub://fruit",
            Some(labels.path().to_path_buf()),
        ))?;
        assert_eq!(backend.class_names().name(0), "mango");
        Ok(())
    }

    #[test]
    fn missing_model_file_is_fatal() {
        let err = load_backend(&settings("/nonexistent/best.onnx", None))
            .err()
            .expect("load must fail");
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn missing_labels_file_is_fatal() {
        let result = load_backend(&settings(
            "stub://fruit",
            Some(PathBuf::from("/nonexistent/labels.txt")),
        ));
        assert!(result.is_err());
    }
}
