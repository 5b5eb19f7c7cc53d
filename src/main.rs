use anyhow::{Context, Result};
use clap::Parser;
use mechsim::config::{SimulationConfig, TimestepPolicy, VehicleConfig, WindowConfig};
use mechsim::error::{LoopError, RenderError};
use mechsim::sim::{Demo, FrameLoop, HeadlessRenderer, Visualization};
use std::path::PathBuf;
use tracing::{info, warn};

/// Frames drawn by a headless run that sets no limit of its own.
const DEFAULT_HEADLESS_FRAMES: u64 = 600;

#[derive(Debug, Parser)]
#[command(name = "mechsim", version, about = "Rigid-body mechanism demos")]
struct Args {
    /// Demo to run.
    #[arg(value_enum)]
    demo: Demo,

    /// Simulation settings as TOML.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Vehicle layout as TOML (vehicle demo only).
    #[arg(long, value_name = "FILE")]
    vehicle: Option<PathBuf>,

    /// Close after this many frames.
    #[arg(long, value_name = "N")]
    frames: Option<u64>,

    /// Step with fixed ticks of this many seconds instead of the frame time.
    #[arg(long, value_name = "SECS")]
    fixed_step: Option<f64>,

    /// Write every rendered pose to a CSV file (headless runs).
    #[arg(long, value_name = "FILE")]
    telemetry: Option<PathBuf>,

    /// Open a window instead of running headless.
    #[arg(long)]
    viz: bool,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    mechsim::logging::init(&args.log);

    let config = load_config(&args)?;
    let vehicle = match &args.vehicle {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading vehicle config {}", path.display()))?;
            VehicleConfig::from_toml_str(&text)
                .with_context(|| format!("parsing vehicle config {}", path.display()))?
        }
        None => VehicleConfig::default(),
    };
    if args.vehicle.is_some() && args.demo != Demo::Vehicle {
        warn!(demo = %args.demo, "--vehicle only affects the vehicle demo");
    }

    info!(demo = %args.demo, viz = args.viz, timestep = ?config.timestep, "starting");

    if args.viz {
        if args.telemetry.is_some() {
            warn!("telemetry is only recorded by headless runs");
        }
        let (frame_loop, window) = build_loop(args.demo, &config, &vehicle, false)?;
        match Visualization::run(frame_loop, &window) {
            Ok(summary) => {
                info!(frames = summary.frames, sim_time = summary.sim_time, "window closed");
                return Ok(());
            }
            Err(LoopError::Render(RenderError::Backend(reason))) => {
                warn!(%reason, "no window available, running headless instead");
            }
            Err(e) => return Err(e).context("running the windowed demo"),
        }
    }

    run_headless(&args, config, &vehicle)
}

fn load_config(args: &Args) -> Result<SimulationConfig> {
    let mut config = match &args.config {
        Some(path) => SimulationConfig::from_toml_file(path)
            .with_context(|| format!("loading simulation config {}", path.display()))?,
        None if args.viz => SimulationConfig::interactive(),
        None => SimulationConfig::headless(DEFAULT_HEADLESS_FRAMES),
    };

    if let Some(frames) = args.frames {
        config.max_frames = Some(frames);
    }
    if let Some(tick) = args.fixed_step {
        let max_steps_per_frame = match config.timestep {
            TimestepPolicy::Fixed {
                max_steps_per_frame,
                ..
            } => max_steps_per_frame,
            TimestepPolicy::WallClock => 4,
        };
        config.timestep = TimestepPolicy::Fixed {
            tick,
            max_steps_per_frame,
        };
    }
    config.validate().context("invalid simulation settings")?;
    Ok(config)
}

fn build_loop(
    demo: Demo,
    config: &SimulationConfig,
    vehicle: &VehicleConfig,
    telemetry: bool,
) -> Result<(FrameLoop, WindowConfig)> {
    let scene = demo
        .build_with(config, vehicle)
        .with_context(|| format!("building the {demo} demo"))?;
    let window = scene.window.clone();
    let mut frame_loop = scene.into_frame_loop(config);
    if telemetry {
        frame_loop = frame_loop.with_telemetry();
    }
    Ok((frame_loop, window))
}

fn run_headless(args: &Args, mut config: SimulationConfig, vehicle: &VehicleConfig) -> Result<()> {
    if config.max_frames.is_none() {
        info!(frames = DEFAULT_HEADLESS_FRAMES, "no frame limit set for a headless run");
        config.max_frames = Some(DEFAULT_HEADLESS_FRAMES);
    }

    let (mut frame_loop, _) = build_loop(args.demo, &config, vehicle, args.telemetry.is_some())?;
    let mut renderer = HeadlessRenderer::from_config(&config);
    let summary = frame_loop
        .run(&mut renderer)
        .with_context(|| format!("running the {} demo", args.demo))?;

    for item in frame_loop.items().iter().filter(|i| !i.scenery) {
        if let Some(pose) = frame_loop.world().pose(item.body) {
            let p = pose.position;
            info!(body = %item.label, x = p.x, y = p.y, z = p.z, "final pose");
        }
    }
    info!(
        frames = summary.frames,
        steps = summary.steps,
        sim_time = summary.sim_time,
        "headless run complete"
    );

    if let (Some(path), Some(log)) = (&args.telemetry, frame_loop.telemetry()) {
        log.export_csv(path)
            .with_context(|| format!("writing telemetry to {}", path.display()))?;
    }
    Ok(())
}
