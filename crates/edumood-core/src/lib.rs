//! edumood-core: Classroom emotion recognition engine.
//!
//! Uses SCRFD for face detection and FER+ for emotion classification, both
//! running via ONNX Runtime on the CPU. On top of the models sit the frame
//! throttler, the per-frame aggregator, the session log and reporting.

pub mod aggregator;
pub mod analyzer;
pub mod annotate;
pub mod classifier;
pub mod detector;
pub mod report;
pub mod session;
pub mod throttle;
pub mod types;

use std::path::PathBuf;

pub use analyzer::{Analyze, Classifier, Detector, FaceOutcome, FrameAnalysis, FrameAnalyzer};
pub use annotate::Annotator;
pub use classifier::EmotionClassifier;
pub use detector::FaceDetector;
pub use report::Report;
pub use session::{Session, SessionInfo, SessionSnapshot};
pub use throttle::{Admission, Recognizer};
pub use types::{BoundingBox, Emotion, EmotionCounts, EmotionLabel, EmotionRecord};

/// SCRFD detection model file name.
pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
/// FER+ emotion model file name.
pub const CLASSIFIER_MODEL_FILE: &str = "emotion-ferplus-8.onnx";

/// Default model directory: `$XDG_DATA_HOME/edumood/models`, falling back to
/// `~/.local/share/edumood/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("edumood/models")
}

/// Load both models from `model_dir` into a ready-to-run analyzer.
pub fn load_analyzer(
    model_dir: &std::path::Path,
    annotator: Annotator,
) -> Result<FrameAnalyzer<FaceDetector, EmotionClassifier>, LoadError> {
    let detector = FaceDetector::load(&model_dir.join(DETECTOR_MODEL_FILE))?;
    let classifier = EmotionClassifier::load(&model_dir.join(CLASSIFIER_MODEL_FILE))?;
    Ok(FrameAnalyzer::new(detector, classifier, annotator))
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("detector: {0}")]
    Detector(#[from] detector::DetectorError),
    #[error("classifier: {0}")]
    Classifier(#[from] classifier::ClassifierError),
}
