//! Per-frame analysis: detect faces, classify each one, draw overlays.

use crate::annotate::Annotator;
use crate::classifier::ClassifierError;
use crate::detector::DetectorError;
use crate::types::{BoundingBox, EmotionLabel};
use image::RgbImage;

/// Locates faces in a frame.
pub trait Detector {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError>;
}

/// Assigns a dominant emotion label to one cropped face.
pub trait Classifier {
    fn classify(&mut self, face: &RgbImage) -> Result<EmotionLabel, ClassifierError>;
}

/// Turns one frame into an annotated frame plus per-face outcomes.
pub trait Analyze {
    fn analyze(&mut self, image: RgbImage) -> FrameAnalysis;
}

/// Classification outcome for one detected face.
pub type FaceOutcome = Result<EmotionLabel, ClassifierError>;

/// Result of analyzing a single frame.
#[derive(Debug)]
pub struct FrameAnalysis {
    pub annotated: RgbImage,
    /// One entry per detected face, in detection order.
    pub faces: Vec<FaceOutcome>,
}

impl FrameAnalysis {
    /// A frame in which nothing was detected.
    pub fn empty(image: RgbImage) -> Self {
        Self {
            annotated: image,
            faces: Vec::new(),
        }
    }

    /// Labels of the faces that classified successfully.
    pub fn labels(&self) -> impl Iterator<Item = &EmotionLabel> {
        self.faces.iter().filter_map(|f| f.as_ref().ok())
    }
}

/// Detector + classifier + overlay drawing.
pub struct FrameAnalyzer<D, C> {
    detector: D,
    classifier: C,
    annotator: Annotator,
}

impl<D: Detector, C: Classifier> FrameAnalyzer<D, C> {
    pub fn new(detector: D, classifier: C, annotator: Annotator) -> Self {
        Self {
            detector,
            classifier,
            annotator,
        }
    }
}

impl<D: Detector, C: Classifier> Analyze for FrameAnalyzer<D, C> {
    fn analyze(&mut self, mut image: RgbImage) -> FrameAnalysis {
        let boxes = match self.detector.detect(&image) {
            Ok(boxes) => boxes,
            Err(e) => {
                tracing::warn!(error = %e, "face detection failed; treating frame as empty");
                return FrameAnalysis::empty(image);
            }
        };

        let mut faces = Vec::with_capacity(boxes.len());
        for face in &boxes {
            let Some(rect) = face.clamp_to(image.width(), image.height()) else {
                tracing::debug!(?face, "face box outside frame, skipping");
                faces.push(Err(ClassifierError::EmptyCrop));
                continue;
            };

            let (x, y, w, h) = rect;
            let crop = image::imageops::crop_imm(&image, x, y, w, h).to_image();

            match self.classifier.classify(&crop) {
                Ok(label) => {
                    self.annotator.draw(&mut image, rect, label.as_str());
                    faces.push(Ok(label));
                }
                Err(e) => {
                    tracing::debug!(error = %e, confidence = face.confidence, "emotion classification failed, skipping face");
                    faces.push(Err(e));
                }
            }
        }

        FrameAnalysis {
            annotated: image,
            faces,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted detector/classifier doubles shared by the crate's tests.

    use super::*;
    use std::collections::VecDeque;

    /// Returns the same boxes for every frame, or a failure.
    pub struct FixedDetector {
        pub boxes: Vec<BoundingBox>,
        pub fail: bool,
    }

    impl FixedDetector {
        pub fn with_faces(boxes: Vec<(f32, f32, f32, f32)>) -> Self {
            Self {
                boxes: boxes
                    .into_iter()
                    .map(|(x, y, width, height)| BoundingBox { x, y, width, height, confidence: 0.9 })
                    .collect(),
                fail: false,
            }
        }
    }

    impl Detector for FixedDetector {
        fn detect(&mut self, _image: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError> {
            if self.fail {
                return Err(DetectorError::InferenceFailed("scripted failure".into()));
            }
            Ok(self.boxes.clone())
        }
    }

    /// Hands out scripted labels in order; `None` entries fail.
    pub struct ScriptedClassifier {
        pub script: VecDeque<Option<&'static str>>,
    }

    impl ScriptedClassifier {
        pub fn new(script: &[Option<&'static str>]) -> Self {
            Self { script: script.iter().copied().collect() }
        }
    }

    impl Classifier for ScriptedClassifier {
        fn classify(&mut self, _face: &RgbImage) -> Result<EmotionLabel, ClassifierError> {
            match self.script.pop_front().flatten() {
                Some(label) => Ok(EmotionLabel::new(label)),
                None => Err(ClassifierError::InferenceFailed("scripted failure".into())),
            }
        }
    }
}
