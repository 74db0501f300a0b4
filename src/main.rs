use std::fs::File;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use bevy::app::{AppExit, ScheduleRunnerPlugin};
use bevy::prelude::*;
use clap::Parser;
use discovery_core::camera::CameraDevice;
use discovery_core::configuration::GameConfiguration;
use discovery_core::detection::AutoStart;
use discovery_core::journal::JournalFile;
use discovery_core::scoring::{PointModifiers, Weather};
use discovery_core::DiscoveryCorePlugin;
use nature_quest::camera::SimulatedCamera;
use nature_quest::term::{ActiveView, TermMode, TermPresentationPlugin};
use simplelog::{LevelFilter, WriteLogger};

const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Point the camera, let the scanner work, capture what it finds.
///
/// Keys: [s]tart, [x] stop, [r]eset, [c]apture, [q]uit
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Write debug logs to the log file
    #[arg(long)]
    debug: bool,
    #[arg(long, default_value = "debug.log")]
    log_file: PathBuf,
    /// Overrides the weather from the configuration
    #[arg(long)]
    weather: Option<Weather>,
    /// Overrides the journal file from the configuration
    #[arg(long)]
    journal: Option<PathBuf>,
    /// Run without a raw terminal, capture every result, and exit after COUNT discoveries
    #[arg(long, value_name = "COUNT")]
    auto_capture: Option<usize>,
    /// How long the simulated camera takes to become ready
    #[arg(long, default_value_t = 500)]
    camera_warmup_ms: u64,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli)?;

    let mut config = match cli.config.as_ref() {
        Some(path) => GameConfiguration::load(path)
            .with_context(|| format!("loading configuration from {path:?}"))?,
        None => GameConfiguration::default(),
    };
    if let Some(weather) = cli.weather {
        config.weather = weather;
    }
    if let Some(journal) = cli.journal.clone() {
        config.journal_file = Some(journal);
    }
    let mode = match cli.auto_capture {
        Some(captures) => TermMode::Headless { captures },
        None => TermMode::Interactive,
    };
    log::info!("Starting with weather {:?} in {:?} mode", config.weather, mode);

    let mut app = App::new();
    app.add_plugins(MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(FRAME_INTERVAL)))
        .insert_resource(PointModifiers::new(config.weather))
        .insert_resource(
            config
                .journal_file
                .clone()
                .map(JournalFile::new)
                .unwrap_or_default(),
        )
        .add_plugins((DiscoveryCorePlugin, TermPresentationPlugin { mode }));

    let camera = SimulatedCamera::new(Duration::from_millis(cli.camera_warmup_ms));
    let mut view = app.world_mut().spawn((
        config.detection.build_sequencer(),
        CameraDevice::new(camera),
        Name::new("Camera view"),
    ));
    if config.auto_start || cli.auto_capture.is_some() {
        view.insert(AutoStart);
    }
    let view = view.id();
    app.insert_resource(ActiveView(view));

    match app.run() {
        AppExit::Success => Ok(()),
        AppExit::Error(code) => Err(anyhow::anyhow!("exited with error code {code}")),
    }
}

fn setup_logging(cli: &Cli) -> anyhow::Result<()> {
    if cli.debug {
        let file = File::create(&cli.log_file)
            .with_context(|| format!("creating log file {:?}", cli.log_file))?;
        WriteLogger::init(
            LevelFilter::Debug,
            simplelog::ConfigBuilder::new()
                .set_target_level(LevelFilter::Error)
                .build(),
            file,
        )?;
    }
    Ok(())
}
