use edumood_core::Session;
use std::sync::Arc;
use zbus::interface;

pub const BUS_NAME: &str = "org.edumood.Monitor1";
pub const OBJECT_PATH: &str = "/org/edumood/Monitor1";

/// D-Bus interface for the EduMood daemon.
///
/// Bus name: org.edumood.Monitor1
/// Object path: /org/edumood/Monitor1
///
/// All methods return JSON strings so the CLI and scripts share one format
/// with the HTTP API.
pub struct MonitorService {
    session: Arc<Session>,
    analyze_every_n: u32,
}

impl MonitorService {
    pub fn new(session: Arc<Session>, analyze_every_n: u32) -> Self {
        Self {
            session,
            analyze_every_n,
        }
    }

    fn status_json(&self) -> String {
        serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "session": self.session.info(),
            "analyze_every_n": self.analyze_every_n,
        })
        .to_string()
    }
}

#[interface(name = "org.edumood.Monitor1")]
impl MonitorService {
    /// Daemon version and current session metadata.
    async fn status(&self) -> zbus::fdo::Result<String> {
        Ok(self.status_json())
    }

    /// Full session report (`status` is "empty" or "ready").
    async fn report(&self) -> zbus::fdo::Result<String> {
        to_json(&self.session.report())
    }

    /// Raw session log in insertion order.
    async fn records(&self) -> zbus::fdo::Result<String> {
        to_json(&self.session.snapshot())
    }

    /// Discard the log and start a new session.
    async fn reset(&self) -> zbus::fdo::Result<String> {
        let info = self.session.reset();
        tracing::info!(session = %info.id, "session reset via D-Bus");
        to_json(&info)
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| zbus::fdo::Error::Failed(format!("serialization failed: {e}")))
}
