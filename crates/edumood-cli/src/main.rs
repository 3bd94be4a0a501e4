use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use edumood_core::{aggregator, report, Analyze, Annotator, Emotion, EmotionRecord, Recognizer, Session};
use edumood_hw::Camera;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const DEFAULT_FONT_PATH: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf";

#[derive(Parser)]
#[command(name = "edumood", about = "EduMood classroom emotion monitor CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current session report from edumoodd
    Report {
        /// Print the raw JSON report
        #[arg(long)]
        json: bool,
    },
    /// Show the raw session records from edumoodd
    Records,
    /// Discard the daemon's session log and start a new session
    Reset,
    /// Show daemon status
    Status,
    /// List V4L2 capture devices
    Devices,
    /// Run recognition locally on a V4L2 camera, then print the report
    Watch {
        /// Camera device path
        #[arg(short, long, default_value = "/dev/video0")]
        device: String,
        /// Number of frames to capture
        #[arg(short, long, default_value_t = 100)]
        frames: usize,
        /// Analyze every Nth frame
        #[arg(short, long, default_value_t = 5)]
        every: u32,
        /// Directory containing the ONNX models
        #[arg(long)]
        model_dir: Option<PathBuf>,
        /// Save the last output frame to this path
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Detect faces and classify emotions in a single image
    Analyze {
        /// Input image
        image: PathBuf,
        /// Write the annotated image here
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Directory containing the ONNX models
        #[arg(long)]
        model_dir: Option<PathBuf>,
    },
}

#[zbus::proxy(
    interface = "org.edumood.Monitor1",
    default_service = "org.edumood.Monitor1",
    default_path = "/org/edumood/Monitor1"
)]
trait Monitor {
    fn status(&self) -> zbus::Result<String>;
    fn report(&self) -> zbus::Result<String>;
    fn records(&self) -> zbus::Result<String>;
    fn reset(&self) -> zbus::Result<String>;
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Report { json } => {
            let proxy = connect().await?;
            if json {
                let raw = proxy.report().await.context("Report() call failed")?;
                println!("{}", pretty(&raw)?);
            } else {
                let records = fetch_records(&proxy).await?;
                print!("{}", report::build(&records));
            }
        }
        Commands::Records => {
            let proxy = connect().await?;
            let records = fetch_records(&proxy).await?;
            if records.is_empty() {
                println!("{}", report::EMPTY_MESSAGE);
            } else {
                print_records(&records);
            }
        }
        Commands::Reset => {
            let proxy = connect().await?;
            let raw = proxy.reset().await.context("Reset() call failed")?;
            println!("Session reset.\n{}", pretty(&raw)?);
        }
        Commands::Status => match connect().await {
            Ok(proxy) => {
                let raw = proxy.status().await.context("Status() call failed")?;
                println!("{}", pretty(&raw)?);
            }
            Err(e) => {
                println!("edumoodd: not connected ({e:#})");
            }
        },
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for dev in devices {
                println!("{}  {} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
            }
        }
        Commands::Watch {
            device,
            frames,
            every,
            model_dir,
            save,
        } => {
            // Camera capture and inference both block.
            tokio::task::spawn_blocking(move || watch(&device, frames, every, model_dir, save.as_deref()))
                .await
                .context("watch task panicked")??;
        }
        Commands::Analyze {
            image,
            output,
            model_dir,
        } => {
            tokio::task::spawn_blocking(move || analyze_image(&image, output.as_deref(), model_dir))
                .await
                .context("analyze task panicked")??;
        }
    }

    Ok(())
}

async fn connect() -> Result<MonitorProxy<'static>> {
    let conn = zbus::Connection::session()
        .await
        .context("failed to connect to the session bus")?;
    MonitorProxy::new(&conn)
        .await
        .context("edumoodd is not reachable on D-Bus")
}

async fn fetch_records(proxy: &MonitorProxy<'_>) -> Result<Vec<EmotionRecord>> {
    let raw = proxy.records().await.context("Records() call failed")?;
    parse_records(&raw)
}

fn parse_records(raw: &str) -> Result<Vec<EmotionRecord>> {
    let mut snapshot: serde_json::Value = serde_json::from_str(raw).context("malformed Records() reply")?;
    let records = snapshot
        .get_mut("records")
        .map(serde_json::Value::take)
        .context("Records() reply has no records field")?;
    serde_json::from_value(records).context("malformed record in Records() reply")
}

fn pretty(raw: &str) -> Result<String> {
    let value: serde_json::Value = serde_json::from_str(raw).context("daemon returned invalid JSON")?;
    Ok(serde_json::to_string_pretty(&value)?)
}

fn print_records(records: &[EmotionRecord]) {
    print!("{:<20}", "recorded_at");
    for emotion in Emotion::ALL {
        print!("{:>10}", emotion.as_str());
    }
    println!();
    for record in records {
        print!(
            "{:<20}",
            record.recorded_at.format(edumood_core::types::timestamp_format::FORMAT).to_string()
        );
        for value in record.counts.as_array() {
            print!("{value:>10}");
        }
        println!();
    }
}

fn load(model_dir: Option<PathBuf>) -> Result<impl Analyze> {
    let model_dir = model_dir.unwrap_or_else(edumood_core::default_model_dir);
    tracing::info!(model_dir = %model_dir.display(), "loading models");
    let annotator = Annotator::with_optional_font(Some(Path::new(DEFAULT_FONT_PATH)));
    if !annotator.has_font() {
        println!("Label font not found at {DEFAULT_FONT_PATH}; overlays will show boxes only");
    }
    edumood_core::load_analyzer(&model_dir, annotator)
        .with_context(|| format!("failed to load models from {}", model_dir.display()))
}

fn watch(device: &str, frames: usize, every: u32, model_dir: Option<PathBuf>, save: Option<&Path>) -> Result<()> {
    if frames == 0 {
        bail!("--frames must be at least 1");
    }
    let mut analyzer = load(model_dir)?;
    let camera = Camera::open(device, 640, 480).with_context(|| format!("failed to open {device}"))?;

    let session = Arc::new(Session::new());
    let mut recognizer = Recognizer::new(Arc::clone(&session), every);
    let mut last = None;

    println!(
        "Watching {} at {}x{} ({:?}), analyzing every {} frame(s)...",
        camera.device_path,
        camera.width,
        camera.height,
        camera.pixel_format(),
        recognizer.interval()
    );

    let delivered = camera.stream(Some(frames), |image| {
        last = Some(recognizer.recognize(&mut analyzer, image));
        true
    })?;

    println!(
        "Captured {delivered} frames, analyzed {}, {} record(s)\n",
        recognizer.frames_analyzed(),
        session.len()
    );
    print!("{}", session.report());

    if let (Some(path), Some(image)) = (save, last) {
        image
            .save(path)
            .with_context(|| format!("failed to save {}", path.display()))?;
        println!("\nSaved last frame to {}", path.display());
    }
    Ok(())
}

fn analyze_image(path: &Path, output: Option<&Path>, model_dir: Option<PathBuf>) -> Result<()> {
    let image = image::open(path)
        .with_context(|| format!("failed to read {}", path.display()))?
        .to_rgb8();
    let mut analyzer = load(model_dir)?;

    let analysis = analyzer.analyze(image);
    if analysis.faces.is_empty() {
        println!("No faces detected");
    }
    for (i, outcome) in analysis.faces.iter().enumerate() {
        match outcome {
            Ok(label) => println!("face {i}: {}", label.as_str()),
            Err(e) => println!("face {i}: unclassified ({e})"),
        }
    }

    match aggregator::aggregate(&analysis.faces, aggregator::now_second()) {
        Some(record) => {
            println!();
            print_records(&[record]);
        }
        None => println!("Nothing to record"),
    }

    if let Some(out) = output {
        analysis
            .annotated
            .save(out)
            .with_context(|| format!("failed to save {}", out.display()))?;
        println!("Annotated image written to {}", out.display());
    }
    Ok(())
}
