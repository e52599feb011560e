use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::debug;
use shared::ipc::{protocol, ClientMessage, DaemonMessage};
use shared::{catalog, Config, DaemonStatus, DetectorPreset, NoticeLevel, SessionStatus};
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::UnixStream;

#[derive(Parser)]
#[command(name = "hand-capture")]
#[command(about = "Control the hand capture daemon")]
struct Args {
    /// Configuration file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show detection, session and backend state
    Status,
    /// Start recording the selected label
    Start,
    /// Stop recording
    Stop,
    /// Set the capture interval in milliseconds (500, 1000, 2000 or 3000)
    Interval { millis: u64 },
    /// Select a category (vocales, abecedario, numeros, operaciones)
    Category { key: String },
    /// Select a label within the current category
    Label { symbol: String },
    /// Capture a single sample of the selected label
    Capture,
    /// Predict the gesture in view with a trained model
    Predict { model: String },
    /// Show the samples stored on the backend
    Samples,
    /// Delete every stored sample
    Clear,
    /// Train a model on the stored samples
    Train { name: String },
    /// List trained models
    Models,
    /// Delete a trained model
    DeleteModel { name: String },
    /// Apply a detector preset
    Preset { preset: Preset },
    /// Stop the daemon
    Shutdown,
}

#[derive(Clone, Copy, ValueEnum)]
enum Preset {
    Standard,
    Precise,
}

impl From<Preset> for DetectorPreset {
    fn from(preset: Preset) -> Self {
        match preset {
            Preset::Standard => DetectorPreset::Standard,
            Preset::Precise => DetectorPreset::Precise,
        }
    }
}

impl Command {
    fn into_message(self) -> ClientMessage {
        match self {
            Command::Status => ClientMessage::GetStatus,
            Command::Start => ClientMessage::StartRecording,
            Command::Stop => ClientMessage::StopRecording,
            Command::Interval { millis } => ClientMessage::SetInterval(millis),
            Command::Category { key } => ClientMessage::SelectCategory(key),
            Command::Label { symbol } => ClientMessage::SelectLabel(symbol),
            Command::Capture => ClientMessage::CaptureSample,
            Command::Predict { model } => ClientMessage::Predict { model },
            Command::Samples => ClientMessage::ListSamples,
            Command::Clear => ClientMessage::ClearSamples,
            Command::Train { name } => ClientMessage::Train { name },
            Command::Models => ClientMessage::ListModels,
            Command::DeleteModel { name } => ClientMessage::DeleteModel { name },
            Command::Preset { preset } => ClientMessage::ApplyPreset(preset.into()),
            Command::Shutdown => ClientMessage::Shutdown,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let message = args.command.into_message();
    let response = request(&config, &message).await?;
    match response {
        DaemonMessage::Error(e) => anyhow::bail!("{}", e),
        other => print_response(&other),
    }
    Ok(())
}

async fn request(config: &Config, message: &ClientMessage) -> Result<DaemonMessage> {
    let socket_path = &config.ipc.socket_path;
    let mut stream = UnixStream::connect(socket_path)
        .await
        .with_context(|| format!("Daemon not reachable at {:?}", socket_path))?;

    debug!("Sending {:?}", message);
    protocol::send_message(&mut stream, message).await?;

    let reply = protocol::receive_message(&mut stream);
    match reply_timeout(config, message) {
        Some(timeout) => tokio::time::timeout(timeout, reply)
            .await
            .context("Timed out waiting for the daemon")?,
        None => reply.await,
    }
}

/// How long to wait for the reply. Training and single captures wait for the backend to finish,
/// so they wait as long as it takes.
fn reply_timeout(config: &Config, message: &ClientMessage) -> Option<Duration> {
    match message {
        ClientMessage::Train { .. } | ClientMessage::CaptureSample => None,
        _ => Some(Duration::from_secs(config.ipc.timeout_seconds)),
    }
}

fn print_response(response: &DaemonMessage) {
    match response {
        DaemonMessage::RecordingStarted {
            session_id,
            label,
            interval,
        } => println!(
            "Recording {} every {}ms (session {})",
            label,
            interval.as_millis(),
            session_id
        ),
        DaemonMessage::RecordingStopped { captures } => {
            println!("Recording stopped: {} captures", captures)
        }
        DaemonMessage::Interval { interval, applied } => {
            if *applied {
                println!("Interval set to {}ms", interval.as_millis());
            } else {
                println!(
                    "Recording in progress, interval stays at {}ms",
                    interval.as_millis()
                );
            }
        }
        DaemonMessage::Selection(selection) => {
            let symbols = catalog::find(&selection.category)
                .map(|category| category.symbols.join(" "))
                .unwrap_or_default();
            println!("Selected {} / {}", selection.category, selection.label);
            println!("Labels: {}", symbols);
        }
        DaemonMessage::SampleCaptured { label } => println!("Sample saved: {}", label),
        DaemonMessage::Prediction(prediction) => {
            println!(
                "{} ({:.1}%)",
                prediction.label,
                prediction.confidence * 100.0
            );
            for (label, probability) in prediction.alternatives.iter().take(5) {
                println!("  {:<6} {:>5.1}%", label, probability * 100.0);
            }
        }
        DaemonMessage::Samples(samples) => {
            println!("{} samples", samples.total_samples);
            for (label, count) in &samples.samples_per_class {
                println!("  {:<6} {}", label, count);
            }
        }
        DaemonMessage::SamplesCleared => println!("All samples deleted"),
        DaemonMessage::ModelTrained(model) => println!(
            "Model {} trained: {:.1}% accuracy on {} samples",
            model.name,
            model.accuracy * 100.0,
            model.n_samples
        ),
        DaemonMessage::Models(models) => {
            if models.is_empty() {
                println!("No trained models");
            }
            for model in models {
                println!(
                    "{:<20} {:>5.1}%  {} samples  [{}]",
                    model.name,
                    model.accuracy * 100.0,
                    model.n_samples,
                    model.classes.join(" ")
                );
            }
        }
        DaemonMessage::ModelDeleted(name) => println!("Model {} deleted", name),
        DaemonMessage::DetectorConfigured(options) => println!(
            "Detector: up to {} hand(s), complexity {}, detection {:.2}, tracking {:.2}",
            options.max_hands,
            options.model_complexity,
            options.min_detection_confidence,
            options.min_tracking_confidence
        ),
        DaemonMessage::Status(status) => print_status(status),
        DaemonMessage::ShuttingDown => println!("Daemon shutting down"),
        DaemonMessage::Error(e) => eprintln!("Error: {}", e),
    }
}

fn print_status(status: &DaemonStatus) {
    if !status.capture_enabled {
        println!("Capture: disabled");
    }
    println!("Detection: {}", status.detection.status);
    match status.session.status {
        SessionStatus::Active => println!(
            "Session: recording {} every {}ms, {} captures",
            status.session.recording_label,
            status.session.interval.as_millis(),
            status.session.captures_count
        ),
        SessionStatus::Idle => println!(
            "Session: idle (interval {}ms)",
            status.session.interval.as_millis()
        ),
    }
    println!(
        "Selection: {} / {}",
        status.selection.category, status.selection.label
    );
    match &status.samples {
        Some(samples) => println!("Samples: {}", samples.total_samples),
        None => println!("Samples: unknown"),
    }
    println!("Pending uploads: {}", status.pending_uploads);
    println!("Models: {}", status.models.len());
    if let Some(prediction) = &status.last_prediction {
        println!(
            "Last prediction: {} ({:.1}%)",
            prediction.label,
            prediction.confidence * 100.0
        );
    }
    println!("Uptime: {}s", status.uptime.as_secs());
    for notice in &status.notices {
        let marker = match notice.level {
            NoticeLevel::Success => "ok",
            NoticeLevel::Error => "error",
        };
        println!("[{}] {}", marker, notice.text);
    }
}
