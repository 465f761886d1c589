use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use lantern_device::audio::{
    AudioInput, AudioOutput, CpalInput, CpalOutput, SAMPLE_RATE, pcm_to_wav,
};
use lantern_device::{Config, Daemon};

/// Lantern - push-to-talk voice assistant and relay controller
#[derive(Parser)]
#[command(name = "lantern", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Run in foreground (don't daemonize)
    #[arg(long)]
    foreground: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,

        /// Write the captured audio to a WAV file
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Test speaker output
    TestSpeaker,
    /// Install lantern as a system service
    Install,
    /// Uninstall the lantern system service
    Uninstall,
    /// Show service status
    Status,
    /// Tail the service log file
    Logs {
        /// Number of lines to show
        #[arg(short, long, default_value = "50")]
        lines: usize,
        /// Follow log output
        #[arg(short, long)]
        follow: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,lantern_device=info",
        1 => "info,lantern_device=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Handle subcommands
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration, out } => test_mic(duration, out).await,
            Command::TestSpeaker => test_speaker().await,
            Command::Install => cmd_install(),
            Command::Uninstall => cmd_uninstall(),
            Command::Status => cmd_status(),
            Command::Logs { lines, follow } => cmd_logs(lines, follow),
        };
    }

    tracing::info!(foreground = cli.foreground, "starting lantern device daemon");

    let config = Config::load()?;
    tracing::debug!(?config, "loaded configuration");

    Daemon::new(config).run().await?;
    Ok(())
}

/// Test microphone input
async fn test_mic(duration: u64, out: Option<PathBuf>) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let capture = CpalInput::new()?;
    capture.start()?;

    println!("Sample rate: {SAMPLE_RATE} Hz");
    println!("---");

    let mut recorded = Vec::new();
    for i in 0..duration {
        let mut second = Vec::new();
        while second.len() < SAMPLE_RATE as usize * 2 {
            second.extend(capture.read_frame().await?);
        }

        let (energy, peak) = pcm_levels(&second);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );

        recorded.extend(second);
    }

    capture.stop();

    if let Some(path) = out {
        let wav = pcm_to_wav(&recorded, SAMPLE_RATE)?;
        std::fs::write(&path, wav)?;
        println!("\nWrote capture to {}", path.display());
    }

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: arecord -l (to list devices)");
    println!("  3. Check mixer levels with alsamixer");

    Ok(())
}

/// RMS energy and peak of 16-bit PCM, normalized to 0..=1
#[allow(clippy::cast_precision_loss)]
fn pcm_levels(pcm: &[u8]) -> (f32, f32) {
    let samples: Vec<f32> = pcm
        .chunks_exact(2)
        .map(|b| f32::from(i16::from_le_bytes([b[0], b[1]])) / 32768.0)
        .collect();

    if samples.is_empty() {
        return (0.0, 0.0);
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    let rms = (sum_squares / samples.len() as f32).sqrt();
    let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
    (rms, peak)
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let playback = CpalOutput::new()?;

    let frequency = 440.0_f32;
    let duration_secs = 2.0_f32;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    let pcm: Vec<u8> = (0..num_samples)
        .flat_map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            let sample = (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3;
            ((sample * 32767.0) as i16).to_le_bytes()
        })
        .collect();

    println!("Playing {num_samples} samples at {SAMPLE_RATE} Hz...");

    playback.write(&pcm).await?;

    // Let the bounded queue drain before tearing the stream down.
    tokio::time::sleep(Duration::from_secs_f32(duration_secs + 0.5)).await;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: aplay -l (to list devices)");
    println!("  2. Check mixer levels with alsamixer");

    Ok(())
}

/// Install lantern as a system service
fn cmd_install() -> anyhow::Result<()> {
    let binary = std::env::current_exe()?;
    let config = lantern_device::lifecycle::ServiceConfig {
        binary_path: binary,
        extra_args: Vec::new(),
    };

    lantern_device::lifecycle::install_service(&config)?;
    println!("Lantern installed as system service");
    Ok(())
}

/// Uninstall the lantern system service
fn cmd_uninstall() -> anyhow::Result<()> {
    lantern_device::lifecycle::uninstall_service()?;
    println!("Lantern system service removed");
    Ok(())
}

/// Show service status
fn cmd_status() -> anyhow::Result<()> {
    let status = lantern_device::lifecycle::service_status()?;
    println!("Lantern service: {status}");
    Ok(())
}

/// Tail the service log file
fn cmd_logs(lines: usize, follow: bool) -> anyhow::Result<()> {
    let log_path = lantern_device::lifecycle::log_path()
        .ok_or_else(|| anyhow::anyhow!("could not determine log path"))?;

    if !log_path.exists() {
        anyhow::bail!("log file not found: {}", log_path.display());
    }

    let mut args = vec![format!("-n{lines}"), log_path.display().to_string()];
    if follow {
        args.insert(0, "-f".to_string());
    }

    let status = std::process::Command::new("tail").args(&args).status()?;

    if !status.success() {
        anyhow::bail!("tail exited with {status}");
    }

    Ok(())
}
