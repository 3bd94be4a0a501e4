use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_FONT_PATH: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the web dashboard listens on.
    pub bind_addr: String,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Analyze every Nth frame of a stream.
    pub analyze_every_n: u32,
    /// JPEG quality of frames sent back to the browser.
    pub jpeg_quality: u8,
    /// Upper bound on waiting for one frame analysis.
    pub analysis_timeout: Duration,
    /// Font for face labels; boxes only when missing.
    pub font_path: Option<PathBuf>,
    /// How often the dashboard refreshes its report.
    pub report_refresh_ms: u64,
    /// Whether to expose the D-Bus interface on the session bus.
    pub dbus_enabled: bool,
}

/// Optional file layer; every key may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    bind_addr: Option<String>,
    model_dir: Option<PathBuf>,
    analyze_every_n: Option<u32>,
    jpeg_quality: Option<u8>,
    analysis_timeout_ms: Option<u64>,
    font_path: Option<PathBuf>,
    report_refresh_ms: Option<u64>,
    dbus_enabled: Option<bool>,
}

impl Default for Config {
    fn default() -> Self {
        let font = PathBuf::from(DEFAULT_FONT_PATH);
        Self {
            bind_addr: "127.0.0.1:8501".to_string(),
            model_dir: edumood_core::default_model_dir(),
            analyze_every_n: 5,
            jpeg_quality: 80,
            analysis_timeout: Duration::from_millis(2000),
            font_path: font.exists().then_some(font),
            report_refresh_ms: 2000,
            dbus_enabled: true,
        }
    }
}

impl Config {
    /// Load defaults, then the TOML file (if present), then `EDUMOOD_*`
    /// environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let path = config_path();
        if path.exists() {
            config.apply_file(&path)?;
            tracing::info!(path = %path.display(), "loaded config file");
        }

        config.apply_env(|key| std::env::var(key).ok());
        config.normalize();
        Ok(config)
    }

    fn apply_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let file: FileConfig = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;

        if let Some(v) = file.bind_addr {
            self.bind_addr = v;
        }
        if let Some(v) = file.model_dir {
            self.model_dir = v;
        }
        if let Some(v) = file.analyze_every_n {
            self.analyze_every_n = v;
        }
        if let Some(v) = file.jpeg_quality {
            self.jpeg_quality = v;
        }
        if let Some(v) = file.analysis_timeout_ms {
            self.analysis_timeout = Duration::from_millis(v);
        }
        if let Some(v) = file.font_path {
            self.font_path = Some(v);
        }
        if let Some(v) = file.report_refresh_ms {
            self.report_refresh_ms = v;
        }
        if let Some(v) = file.dbus_enabled {
            self.dbus_enabled = v;
        }
        Ok(())
    }

    /// Overlay environment variables. Unparseable values keep the previous setting.
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("EDUMOOD_BIND_ADDR") {
            self.bind_addr = v;
        }
        if let Some(v) = var("EDUMOOD_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        parse_into(&var, "EDUMOOD_ANALYZE_EVERY_N", &mut self.analyze_every_n);
        parse_into(&var, "EDUMOOD_JPEG_QUALITY", &mut self.jpeg_quality);
        let mut timeout_ms = self.analysis_timeout.as_millis() as u64;
        parse_into(&var, "EDUMOOD_ANALYSIS_TIMEOUT_MS", &mut timeout_ms);
        self.analysis_timeout = Duration::from_millis(timeout_ms);
        if let Some(v) = var("EDUMOOD_FONT_PATH") {
            self.font_path = (!v.is_empty()).then(|| PathBuf::from(v));
        }
        parse_into(&var, "EDUMOOD_REPORT_REFRESH_MS", &mut self.report_refresh_ms);
        if let Some(v) = var("EDUMOOD_DBUS_ENABLED") {
            self.dbus_enabled = v != "0" && !v.eq_ignore_ascii_case("false");
        }
    }

    fn normalize(&mut self) {
        if self.analyze_every_n == 0 {
            tracing::warn!("analyze_every_n = 0 is invalid, analyzing every frame");
            self.analyze_every_n = 1;
        }
        self.jpeg_quality = self.jpeg_quality.clamp(1, 100);
        self.report_refresh_ms = self.report_refresh_ms.max(250);
    }
}

/// `EDUMOOD_CONFIG`, else `$XDG_CONFIG_HOME/edumood/config.toml`.
fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("EDUMOOD_CONFIG") {
        return PathBuf::from(path);
    }
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        })
        .join("edumood/config.toml")
}

fn parse_into<T: std::str::FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
    if let Some(raw) = var(key) {
        match raw.parse() {
            Ok(v) => *slot = v,
            Err(_) => tracing::warn!(key, value = %raw, "ignoring unparseable setting"),
        }
    }
}
