//! Fold per-face labels of one analyzed frame into a timestamped record.

use crate::analyzer::FaceOutcome;
use crate::types::{EmotionCounts, EmotionLabel, EmotionRecord};
use chrono::{Local, NaiveDateTime, Timelike};

/// Count labels per canonical category, folding synonym spellings.
///
/// Empty and non-canonical labels are ignored.
pub fn tally<'a>(labels: impl IntoIterator<Item = &'a EmotionLabel>) -> EmotionCounts {
    let mut counts = EmotionCounts::default();
    for label in labels {
        if let Some(emotion) = label.emotion() {
            counts.add(emotion, 1);
        }
    }
    counts
}

/// Build the record for one analyzed frame.
///
/// Failed faces contribute nothing. Returns `None` when no canonical emotion
/// was observed, so empty frames never reach the session log. A frame whose
/// only labels are non-canonical (e.g. "contempt") also yields `None`, even
/// though a label was produced.
pub fn aggregate(faces: &[FaceOutcome], recorded_at: NaiveDateTime) -> Option<EmotionRecord> {
    let counts = tally(faces.iter().filter_map(|f| f.as_ref().ok()));
    if counts.is_empty() {
        return None;
    }
    Some(EmotionRecord {
        recorded_at,
        counts,
    })
}

/// Local wall-clock time truncated to the second.
pub fn now_second() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ClassifierError;
    use crate::types::Emotion;
    use chrono::NaiveDate;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 2).unwrap().and_hms_opt(10, 0, 0).unwrap()
    }

    fn ok(labels: &[&str]) -> Vec<FaceOutcome> {
        labels.iter().map(|l| Ok(EmotionLabel::new(l))).collect()
    }

    #[test]
    fn test_surprise_synonyms_fold() {
        let record = aggregate(&ok(&["surprised", "surprised", "surprise"]), at()).unwrap();
        assert_eq!(record.counts.surprise, 3);
        assert_eq!(record.counts.total(), 3);
    }

    #[test]
    fn test_fear_synonyms_fold() {
        let record = aggregate(&ok(&["fear", "fearful", "fearful"]), at()).unwrap();
        assert_eq!(record.counts.fearful, 3);
    }

    #[test]
    fn test_disgust_synonyms_fold() {
        let record = aggregate(&ok(&["Disgust", "disgusted"]), at()).unwrap();
        assert_eq!(record.counts.disgusted, 2);
    }

    #[test]
    fn test_mixed_frame() {
        let record = aggregate(&ok(&["happy", "HAPPY", "sad", "neutral"]), at()).unwrap();
        assert_eq!(record.recorded_at, at());
        assert_eq!(record.counts.get(Emotion::Happy), 2);
        assert_eq!(record.counts.get(Emotion::Sad), 1);
        assert_eq!(record.counts.get(Emotion::Neutral), 1);
        assert_eq!(record.counts.get(Emotion::Angry), 0);
    }

    #[test]
    fn test_errors_contribute_nothing() {
        let faces: Vec<FaceOutcome> = vec![
            Err(ClassifierError::EmptyCrop),
            Ok(EmotionLabel::new("angry")),
            Err(ClassifierError::InferenceFailed("boom".into())),
        ];
        let record = aggregate(&faces, at()).unwrap();
        assert_eq!(record.counts.angry, 1);
        assert_eq!(record.counts.total(), 1);
    }

    #[test]
    fn test_no_faces_no_record() {
        assert!(aggregate(&[], at()).is_none());
    }

    #[test]
    fn test_all_failed_no_record() {
        let faces: Vec<FaceOutcome> = vec![Err(ClassifierError::EmptyCrop)];
        assert!(aggregate(&faces, at()).is_none());
    }

    #[test]
    fn test_only_unknown_labels_no_record() {
        assert!(aggregate(&ok(&["contempt", ""]), at()).is_none());
    }

    #[test]
    fn test_now_second_has_no_fraction() {
        assert_eq!(now_second().nanosecond(), 0);
    }
}
