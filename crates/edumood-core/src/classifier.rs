//! FER+ emotion classifier via ONNX Runtime.
//!
//! Classifies a cropped face into one of eight FER+ classes and reports the
//! dominant one as a lower-case label.

use crate::analyzer::Classifier;
use crate::types::EmotionLabel;
use image::imageops::FilterType;
use image::{GrayImage, RgbImage};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const FERPLUS_INPUT_SIZE: u32 = 64;

/// FER+ output order, already spelled in the vocabulary the aggregator folds.
const FERPLUS_LABELS: [&str; 8] = [
    "neutral", "happy", "surprise", "sad", "angry", "disgust", "fear", "contempt",
];

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("model file not found: {0}; download emotion-ferplus-8.onnx from the ONNX model zoo")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face crop is empty")]
    EmptyCrop,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// FER+ based emotion classifier.
pub struct EmotionClassifier {
    session: Session,
}

impl EmotionClassifier {
    /// Load the FER+ ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, ClassifierError> {
        if !model_path.exists() {
            return Err(ClassifierError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(1)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded FER+ model"
        );

        Ok(Self { session })
    }

    /// Grayscale 64x64 NCHW tensor. FER+ takes raw 0-255 intensities.
    fn preprocess(face: &RgbImage) -> Array4<f32> {
        let gray: GrayImage = image::imageops::grayscale(face);
        let resized = image::imageops::resize(
            &gray,
            FERPLUS_INPUT_SIZE,
            FERPLUS_INPUT_SIZE,
            FilterType::Triangle,
        );

        let size = FERPLUS_INPUT_SIZE as usize;
        let mut tensor = Array4::<f32>::zeros((1, 1, size, size));
        for (x, y, pixel) in resized.enumerate_pixels() {
            tensor[[0, 0, y as usize, x as usize]] = pixel[0] as f32;
        }
        tensor
    }
}

impl Classifier for EmotionClassifier {
    fn classify(&mut self, face: &RgbImage) -> Result<EmotionLabel, ClassifierError> {
        if face.width() == 0 || face.height() == 0 {
            return Err(ClassifierError::EmptyCrop);
        }

        let input = Self::preprocess(face);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, scores) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::InferenceFailed(format!("emotion scores: {e}")))?;

        let (label, confidence) = dominant(scores)?;
        tracing::trace!(%label, confidence, "classified face");
        Ok(label)
    }
}

/// Pick the highest-scoring class and its softmax probability.
fn dominant(scores: &[f32]) -> Result<(EmotionLabel, f32), ClassifierError> {
    if scores.len() != FERPLUS_LABELS.len() {
        return Err(ClassifierError::InferenceFailed(format!(
            "expected {} emotion scores, got {}",
            FERPLUS_LABELS.len(),
            scores.len()
        )));
    }
    if let Some(bad) = scores.iter().find(|s| !s.is_finite()) {
        return Err(ClassifierError::InferenceFailed(format!("non-finite emotion score: {bad}")));
    }

    let (best, max) = scores
        .iter()
        .copied()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .ok_or_else(|| ClassifierError::InferenceFailed("no emotion scores".into()))?;

    let denom: f32 = scores.iter().map(|s| (s - max).exp()).sum();
    let confidence = if denom > 0.0 { 1.0 / denom } else { 0.0 };

    Ok((EmotionLabel::new(FERPLUS_LABELS[best]), confidence))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Emotion;
    use image::Rgb;

    #[test]
    fn test_preprocess_shape_and_range() {
        let face = RgbImage::from_pixel(120, 90, Rgb([200, 200, 200]));
        let tensor = EmotionClassifier::preprocess(&face);
        assert_eq!(tensor.shape(), &[1, 1, 64, 64]);
        assert!(tensor.iter().all(|&v| (0.0..=255.0).contains(&v)));
        assert!((tensor[[0, 0, 32, 32]] - 200.0).abs() <= 1.0);
    }

    #[test]
    fn test_dominant_picks_argmax() {
        let scores = [0.1, 3.0, 0.2, -1.0, 0.0, 0.0, 0.0, 0.0];
        let (label, confidence) = dominant(&scores).unwrap();
        assert_eq!(label.as_str(), "happy");
        assert!(confidence > 0.5 && confidence <= 1.0);
    }

    #[test]
    fn test_dominant_rejects_wrong_length() {
        assert!(matches!(
            dominant(&[1.0, 2.0]),
            Err(ClassifierError::InferenceFailed(_))
        ));
    }

    #[test]
    fn test_dominant_rejects_non_finite_scores() {
        let mut scores = [0.1, 3.0, 0.2, -1.0, 0.0, 0.0, 0.0, 0.0];
        scores[4] = f32::NAN;
        assert!(matches!(dominant(&scores), Err(ClassifierError::InferenceFailed(_))));
        scores[4] = f32::INFINITY;
        assert!(matches!(dominant(&scores), Err(ClassifierError::InferenceFailed(_))));
    }

    #[test]
    fn test_labels_fold_into_canonical_set() {
        let canonical: Vec<Option<Emotion>> =
            FERPLUS_LABELS.iter().map(|l| Emotion::from_label(l)).collect();
        assert_eq!(
            canonical,
            vec![
                Some(Emotion::Neutral),
                Some(Emotion::Happy),
                Some(Emotion::Surprise),
                Some(Emotion::Sad),
                Some(Emotion::Angry),
                Some(Emotion::Disgusted),
                Some(Emotion::Fearful),
                None,
            ]
        );
    }
}
