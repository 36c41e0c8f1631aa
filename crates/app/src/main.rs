mod decode;

use std::{
    io::Write,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use clap::{Parser, Subcommand};
use serde::Serialize;
use tempo_orbit_core::{
    candidate_ratios, closest, speed_update, AppConfig, BufferSource, FrameClock, FrameQueue,
    Panner, Position3, SpatialRotationEngine, TempoEstimator,
};
use tracing_subscriber::EnvFilter;

use crate::decode::{decode_file, FileSource};

fn main() -> tempo_orbit_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze { input, detailed } => run_analyze(&input, detailed),
        Commands::Ratios { bpm } => print_json(&candidate_ratios(bpm)),
        Commands::Quantize { value, bpm } => print_json(&Quantized {
            value,
            ratio: closest(value, bpm),
        }),
        Commands::Spin(args) => run_spin(args),
    }
}

fn run_analyze(input: &Path, detailed: bool) -> tempo_orbit_core::Result<()> {
    tracing::info!(?input, detailed, "analysing tempo");
    let estimator = TempoEstimator::new();

    if detailed {
        let pcm = decode_file(input)?;
        print_json(&estimator.analyze(&pcm)?)
    } else {
        print_json(&estimator.estimate_from(&mut FileSource::new(input)))
    }
}

fn run_spin(args: SpinArgs) -> tempo_orbit_core::Result<()> {
    let mut config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    if let Some(intensity) = args.intensity {
        config.spatial.intensity = intensity;
    }
    if let Some(radius) = args.radius {
        config.spatial.radius = radius;
    }

    let pcm = decode_file(&args.input)?;
    let estimate = TempoEstimator::with_config(config.tempo.clone()).estimate(&pcm);
    let update = speed_update(&estimate, args.multiplier);
    tracing::info!(
        bpm = estimate.bpm,
        optimal_speed = estimate.optimal_speed,
        multiplier = closest(args.multiplier, estimate.bpm),
        "tempo estimated"
    );

    let queue = FrameQueue::new();
    let source = BufferSource::new(&pcm)?;
    let sample_rate = source.sample_rate();
    let mut engine = SpatialRotationEngine::new(
        source,
        JsonLinesPanner,
        queue.clone(),
        config.spatial,
        &config.engine,
    )?;
    let spatial = engine.update_config(&update);
    tracing::info!(
        speed = spatial.speed,
        intensity = spatial.intensity,
        radius = spatial.radius,
        "starting rotation"
    );

    let tick_rate = config.engine.tick_rate_hz;
    let period = Duration::from_secs_f32(1.0 / tick_rate);
    let block = ((sample_rate as f32 / tick_rate).round() as usize).max(1);
    let mut clock = FrameClock::new();
    clock.mark(Instant::now());
    engine.start();

    while clock.time_seconds < args.seconds {
        std::thread::sleep(period);
        let elapsed = clock.mark(Instant::now());
        for request in queue.take_due() {
            engine.on_frame(request, elapsed);
        }
        if engine.render(block)?.is_empty() {
            tracing::info!(seconds = clock.time_seconds, "source exhausted");
            break;
        }
    }

    let snapshot = engine.snapshot();
    let peak_bin = snapshot
        .iter()
        .enumerate()
        .max_by_key(|(_, magnitude)| **magnitude)
        .map(|(bin, _)| bin)
        .unwrap_or(0);
    let bin_hz = sample_rate as f32 / config.engine.analysis_window as f32;
    tracing::info!(
        angle = engine.state().angle,
        peak_bin,
        peak_hz = peak_bin as f32 * bin_hz,
        "rotation finished"
    );

    engine.destroy();
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> tempo_orbit_core::Result<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

/// Writes every position as one JSON object per line on stdout.
struct JsonLinesPanner;

impl Panner for JsonLinesPanner {
    fn set_position(&mut self, position: Position3) {
        let mut stdout = std::io::stdout().lock();
        let written = serde_json::to_writer(&mut stdout, &position)
            .map_err(std::io::Error::from)
            .and_then(|()| writeln!(stdout));
        if let Err(err) = written {
            tracing::warn!(%err, "failed to write position");
        }
    }

    fn release(&mut self) {
        let _ = std::io::stdout().lock().flush();
    }
}

#[derive(Serialize)]
struct Quantized {
    value: f32,
    ratio: f32,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Tempo-synchronised spatial rotation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Estimate the tempo of an audio file.
    Analyze {
        /// Path to the audio file that should be analysed.
        input: PathBuf,
        /// Report peaks and interval statistics. Fails instead of falling
        /// back when the file cannot be analysed.
        #[arg(long)]
        detailed: bool,
    },
    /// List the rhythmic speed multipliers.
    Ratios {
        #[arg(long, default_value_t = 120)]
        bpm: u32,
    },
    /// Snap a speed multiplier to the nearest rhythmic ratio.
    Quantize {
        value: f32,
        #[arg(long, default_value_t = 120)]
        bpm: u32,
    },
    /// Rotate an audio file around the listener and stream the positions.
    Spin(SpinArgs),
}

#[derive(clap::Args, Debug)]
struct SpinArgs {
    /// Path to the audio file to play through the engine.
    input: PathBuf,
    /// Speed multiplier, quantized to the nearest rhythmic ratio.
    #[arg(short, long, default_value_t = 1.0)]
    multiplier: f32,
    /// How long to run the rotation for.
    #[arg(short, long, default_value_t = 10.0)]
    seconds: f32,
    /// Optional TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(long)]
    intensity: Option<f32>,
    #[arg(long)]
    radius: Option<f32>,
}
