use edumood_core::{Analyze, Annotator, FrameAnalysis};
use image::RgbImage;
use std::path::Path;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Pending analysis requests before senders wait.
const ENGINE_QUEUE_DEPTH: usize = 4;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("model load failed: {0}")]
    Load(#[from] edumood_core::LoadError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from stream handlers to the engine thread.
enum EngineRequest {
    Analyze {
        image: RgbImage,
        reply: oneshot::Sender<FrameAnalysis>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Run detection + classification + annotation on one frame.
    pub async fn analyze(&self, image: RgbImage) -> Result<FrameAnalysis, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Analyze {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Load both ONNX models and the label font, then start the engine.
///
/// Fails fast at startup if a model is unavailable.
pub fn spawn_engine(model_dir: &Path, font_path: Option<&Path>) -> Result<EngineHandle, EngineError> {
    let annotator = Annotator::with_optional_font(font_path);
    let labels = annotator.has_font();
    let analyzer = edumood_core::load_analyzer(model_dir, annotator)?;
    tracing::info!(
        model_dir = %model_dir.display(),
        labels,
        "SCRFD detector and FER+ classifier loaded"
    );
    spawn(analyzer)
}

/// Run `analyzer` on a dedicated OS thread and return a handle to it.
///
/// Inference blocks, so it never runs on the async runtime.
pub fn spawn<A>(mut analyzer: A) -> Result<EngineHandle, EngineError>
where
    A: Analyze + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(ENGINE_QUEUE_DEPTH);

    std::thread::Builder::new()
        .name("edumood-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Analyze { image, reply } => {
                        // Skip work whose requester already gave up.
                        if reply.is_closed() {
                            tracing::debug!("dropping abandoned analysis request");
                            continue;
                        }
                        let analysis = analyzer.analyze(image);
                        let _ = reply.send(analysis);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use edumood_core::EmotionLabel;

    /// Reports a fixed set of labels for every frame.
    pub struct StubAnalyzer {
        pub labels: Vec<&'static str>,
        pub delay: std::time::Duration,
    }

    impl Analyze for StubAnalyzer {
        fn analyze(&mut self, image: RgbImage) -> FrameAnalysis {
            std::thread::sleep(self.delay);
            FrameAnalysis {
                annotated: image,
                faces: self.labels.iter().map(|l| Ok(EmotionLabel::new(l))).collect(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::StubAnalyzer;
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_engine_round_trip() {
        let handle = spawn(StubAnalyzer { labels: vec!["happy", "sad"], delay: Duration::ZERO }).unwrap();
        let analysis = handle.analyze(RgbImage::new(8, 8)).await.unwrap();
        assert_eq!(analysis.labels().count(), 2);
        assert_eq!(analysis.annotated.dimensions(), (8, 8));
    }

    #[tokio::test]
    async fn test_handles_share_one_engine() {
        let handle = spawn(StubAnalyzer { labels: vec!["neutral"], delay: Duration::ZERO }).unwrap();
        let other = handle.clone();
        let (a, b) = tokio::join!(
            handle.analyze(RgbImage::new(2, 2)),
            other.analyze(RgbImage::new(3, 3))
        );
        assert_eq!(a.unwrap().annotated.dimensions(), (2, 2));
        assert_eq!(b.unwrap().annotated.dimensions(), (3, 3));
    }

    #[test]
    fn test_missing_models_fail_fast() {
        let dir = tempfile::tempdir().unwrap();
        let err = spawn_engine(dir.path(), None).err().unwrap();
        assert!(matches!(err, EngineError::Load(_)));
    }
}
