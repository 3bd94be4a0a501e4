//! Frame throttling: analyze every Nth frame, replay the last result otherwise.

use crate::aggregator;
use crate::analyzer::{Analyze, FrameAnalysis};
use crate::session::Session;
use image::RgbImage;
use std::sync::Arc;

/// What to do with an incoming (already mirrored) frame.
#[derive(Debug)]
pub enum Admission {
    /// Run full analysis on this frame.
    Analyze(RgbImage),
    /// Send this image back unchanged.
    Reuse(RgbImage),
}

/// Per-stream recognizer state: frame counter and last annotated frame.
///
/// Frame `k` (1-indexed) is analyzed iff `k % interval == 0`. A new instance
/// starts counting from zero again.
pub struct Recognizer {
    session: Arc<Session>,
    interval: u64,
    frames_seen: u64,
    frames_analyzed: u64,
    last_annotated: Option<RgbImage>,
}

impl Recognizer {
    /// `interval` of 0 is treated as 1 (analyze every frame).
    pub fn new(session: Arc<Session>, interval: u32) -> Self {
        Self {
            session,
            interval: u64::from(interval.max(1)),
            frames_seen: 0,
            frames_analyzed: 0,
            last_annotated: None,
        }
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    pub fn frames_analyzed(&self) -> u64 {
        self.frames_analyzed
    }

    /// Count the frame and decide whether it gets analyzed.
    pub fn admit(&mut self, frame: RgbImage) -> Admission {
        self.frames_seen += 1;
        if self.frames_seen % self.interval == 0 {
            return Admission::Analyze(frame);
        }
        Admission::Reuse(self.fallback(frame))
    }

    /// Last annotated frame if there is one, the given frame otherwise.
    pub fn fallback(&self, frame: RgbImage) -> RgbImage {
        match &self.last_annotated {
            Some(last) => last.clone(),
            None => frame,
        }
    }

    /// Record the analysis of an admitted frame and return the image to emit.
    pub fn complete(&mut self, analysis: FrameAnalysis) -> RgbImage {
        self.frames_analyzed += 1;

        if let Some(record) = aggregator::aggregate(&analysis.faces, aggregator::now_second()) {
            tracing::debug!(faces = analysis.faces.len(), total = record.counts.total(), "frame recorded");
            self.session.append(record);
        }

        self.last_annotated = Some(analysis.annotated.clone());
        analysis.annotated
    }

    /// Full per-frame step with a synchronous analyzer: mirror, throttle,
    /// analyze, aggregate.
    pub fn recognize<A: Analyze + ?Sized>(&mut self, analyzer: &mut A, frame: RgbImage) -> RgbImage {
        let mirrored = image::imageops::flip_horizontal(&frame);
        match self.admit(mirrored) {
            Admission::Reuse(image) => image,
            Admission::Analyze(image) => {
                let analysis = analyzer.analyze(image);
                self.complete(analysis)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::testing::{FixedDetector, ScriptedClassifier};
    use crate::analyzer::FrameAnalyzer;
    use crate::annotate::Annotator;
    use image::Rgb;

    /// Counts calls and tags the output so reuse is observable.
    struct CountingAnalyzer {
        calls: u32,
        faces: Vec<&'static str>,
    }

    impl Analyze for CountingAnalyzer {
        fn analyze(&mut self, mut image: RgbImage) -> FrameAnalysis {
            self.calls += 1;
            image.put_pixel(0, 0, Rgb([self.calls as u8, 0, 0]));
            FrameAnalysis {
                annotated: image,
                faces: self.faces.iter().map(|l| Ok(crate::types::EmotionLabel::new(l))).collect(),
            }
        }
    }

    fn gradient() -> RgbImage {
        RgbImage::from_fn(4, 1, |x, _| Rgb([0, x as u8 * 10, 0]))
    }

    #[test]
    fn test_analyzed_count_is_floor_l_over_n() {
        for n in 1..=7u32 {
            for len in 0..=30u64 {
                let session = Arc::new(Session::new());
                let mut recognizer = Recognizer::new(session, n);
                let mut analyzer = CountingAnalyzer { calls: 0, faces: vec![] };
                for _ in 0..len {
                    recognizer.recognize(&mut analyzer, gradient());
                }
                assert_eq!(analyzer.calls as u64, len / n as u64, "n={n} len={len}");
                assert_eq!(recognizer.frames_analyzed(), len / n as u64);
                assert_eq!(recognizer.frames_seen(), len);
            }
        }
    }

    #[test]
    fn test_zero_interval_analyzes_every_frame() {
        let mut recognizer = Recognizer::new(Arc::new(Session::new()), 0);
        assert_eq!(recognizer.interval(), 1);
        assert!(matches!(recognizer.admit(gradient()), Admission::Analyze(_)));
    }

    #[test]
    fn test_before_first_analysis_returns_mirrored_frame() {
        let mut recognizer = Recognizer::new(Arc::new(Session::new()), 3);
        let mut analyzer = CountingAnalyzer { calls: 0, faces: vec![] };

        let out = recognizer.recognize(&mut analyzer, gradient());
        assert_eq!(out, image::imageops::flip_horizontal(&gradient()));
        assert_eq!(analyzer.calls, 0);
    }

    #[test]
    fn test_reuses_last_annotated_frame() {
        let mut recognizer = Recognizer::new(Arc::new(Session::new()), 2);
        let mut analyzer = CountingAnalyzer { calls: 0, faces: vec![] };

        recognizer.recognize(&mut analyzer, gradient());
        let analyzed = recognizer.recognize(&mut analyzer, gradient());
        assert_eq!(*analyzed.get_pixel(0, 0), Rgb([1, 0, 0]));

        let fresh = RgbImage::from_pixel(4, 1, Rgb([99, 99, 99]));
        let reused = recognizer.recognize(&mut analyzer, fresh);
        assert_eq!(reused, analyzed);
    }

    #[test]
    fn test_zero_face_frames_append_nothing() {
        let session = Arc::new(Session::new());
        let mut recognizer = Recognizer::new(Arc::clone(&session), 1);
        let mut analyzer = CountingAnalyzer { calls: 0, faces: vec![] };

        for _ in 0..5 {
            recognizer.recognize(&mut analyzer, gradient());
        }
        assert_eq!(analyzer.calls, 5);
        assert!(session.is_empty());
    }

    #[test]
    fn test_analyzed_faces_reach_session() {
        let session = Arc::new(Session::new());
        let mut recognizer = Recognizer::new(Arc::clone(&session), 2);
        let mut analyzer = CountingAnalyzer { calls: 0, faces: vec!["happy", "surprised", "surprise"] };

        for _ in 0..4 {
            recognizer.recognize(&mut analyzer, gradient());
        }
        let records = session.snapshot().records;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].counts.happy, 1);
        assert_eq!(records[0].counts.surprise, 2);
    }

    #[test]
    fn test_end_to_end_with_frame_analyzer() {
        let session = Arc::new(Session::new());
        let mut recognizer = Recognizer::new(Arc::clone(&session), 1);
        let mut analyzer = FrameAnalyzer::new(
            FixedDetector::with_faces(vec![(1.0, 1.0, 10.0, 10.0), (20.0, 1.0, 10.0, 10.0)]),
            ScriptedClassifier::new(&[Some("fear"), None]),
            Annotator::boxes_only(),
        );

        recognizer.recognize(&mut analyzer, RgbImage::new(40, 20));
        let records = session.snapshot().records;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].counts.fearful, 1);
        assert_eq!(records[0].counts.total(), 1);
    }
}
