//! TSL Tally Tester command-line driver
//!
//! Loads settings and the saved label file, enables sending, and runs one
//! command against the receiver. Sequences run until Ctrl+C.
//!
//! # Usage
//!
//! ```bash
//! # Chase across all 80 inputs on the receiver from settings.json
//! tsltester --settings settings.json chase
//!
//! # Put input 6 on program, then relabel it
//! tsltester set 6 pgm
//! tsltester label 6 WIDE SHOT
//! ```

use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};
use log::{error, info, warn};
use tsltester_lib::config::constants::DEFAULT_CONFIG_FILE;
use tsltester_lib::{
    load_saved_config, load_settings, save_saved_config, LabelPreset, SequenceMode, Settings,
    TallyController, TallyState, TslResult,
};

/// TSL 3.1 tally tester
#[derive(Parser, Debug)]
#[command(name = "tsltester")]
#[command(about = "Drive a TSL 3.1 tally display over UDP")]
#[command(version)]
struct Args {
    /// Runtime settings file (JSON)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Saved labels and destination, loaded over the settings.
    /// Defaults to tsl_tester_config.json when that file exists.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the demo sequence on inputs 1-8 until Ctrl+C
    Demo,
    /// Chase program across all inputs until Ctrl+C
    Chase,
    /// Random program/preview every tick until Ctrl+C
    Random,
    /// One random program/preview pick
    Shuffle,
    /// Turn every tally off
    AllOff,
    /// Send every input
    SendLabels,
    /// Set one input to off, pgm, pvw or both
    Set {
        #[arg(value_parser = clap::value_parser!(u8).range(1..=80))]
        input: u8,
        state: TallyState,
    },
    /// Step one input OFF -> PGM -> PVW -> BOTH -> OFF
    Cycle {
        #[arg(value_parser = clap::value_parser!(u8).range(1..=80))]
        input: u8,
    },
    /// Set and send one label
    Label {
        #[arg(value_parser = clap::value_parser!(u8).range(1..=80))]
        input: u8,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        text: Vec<String>,
    },
    /// Relabel every input (cam, camera, input, source or clear), then send
    Preset { kind: LabelPreset },
    /// Write labels and destination to a file
    Save { file: PathBuf },
}

/// Operator input number (1-80) to bank address
fn address(input: u8) -> usize {
    usize::from(input) - 1
}

fn load_file(controller: &mut TallyController, path: &Path) -> TslResult<()> {
    let snapshot = load_saved_config(path, &controller.capture()?)?;
    controller.restore(&snapshot)
}

fn load_labels(controller: &mut TallyController, path: Option<&Path>) -> TslResult<()> {
    match path {
        Some(path) => {
            load_file(controller, path)?;
            info!("Loaded configuration from {}", path.display());
        }
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            match load_file(controller, Path::new(DEFAULT_CONFIG_FILE)) {
                Ok(()) => info!("Loaded configuration from {}", DEFAULT_CONFIG_FILE),
                Err(e) => warn!("Ignoring {}: {}", DEFAULT_CONFIG_FILE, e),
            }
        }
        None => {}
    }
    Ok(())
}

fn run_until_interrupted(controller: &mut TallyController, mode: SequenceMode) -> TslResult<()> {
    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    controller.start_sequence(mode)?;
    info!("Running {} sequence, press Ctrl+C to stop", mode);
    while running.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(100));
    }
    controller.cancel_sequence();
    Ok(())
}

fn run_command(controller: &mut TallyController, command: &Command) -> TslResult<()> {
    match command {
        Command::Demo => run_until_interrupted(controller, SequenceMode::Demo),
        Command::Chase => run_until_interrupted(controller, SequenceMode::Chase),
        Command::Random => run_until_interrupted(controller, SequenceMode::Random),
        Command::Shuffle => controller.shuffle().map(|_| ()),
        Command::AllOff => controller.all_off().map(|_| ()),
        Command::SendLabels => controller.send_labels().map(|_| ()),
        Command::Set { input, state } => controller.set_state(address(*input), *state),
        Command::Cycle { input } => {
            let state = controller.cycle_state(address(*input))?;
            info!("Input {} is now {}", input, state);
            Ok(())
        }
        Command::Label { input, text } => controller.set_label(address(*input), text.join(" ")),
        Command::Preset { kind } => {
            controller.apply_label_preset(*kind)?;
            controller.send_labels().map(|_| ())
        }
        Command::Save { file } => {
            save_saved_config(file, &controller.capture()?)?;
            info!("Saved configuration to {}", file.display());
            Ok(())
        }
    }
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut settings = match args.settings.as_deref() {
        Some(path) => match load_settings(path) {
            Ok(settings) => settings,
            Err(e) => {
                error!("Error loading settings from {}: {}", path.display(), e);
                process::exit(1);
            }
        },
        None => Settings::default(),
    };
    settings.enabled = true;

    let mut controller = match TallyController::with_udp(&settings) {
        Ok(controller) => controller,
        Err(e) => {
            error!("Failed to create tally controller: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = load_labels(&mut controller, args.config.as_deref()) {
        error!("Error loading configuration: {}", e);
        process::exit(1);
    }

    match controller.destination() {
        Ok(dest) => info!("TSL Tally Tester sending to {}", dest),
        Err(e) => warn!("Destination unavailable: {}", e),
    }

    let result = run_command(&mut controller, &args.command);
    controller.shutdown();

    let stats = controller.statistics();
    info!("{} sent, {} errors", stats.packets_sent, stats.errors());

    if let Err(e) = result {
        error!("{}", e);
        process::exit(1);
    }
}

/// Set up Ctrl+C handler for graceful shutdown
fn ctrlc_handler(running: Arc<AtomicBool>) {
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        running.store(false, Ordering::SeqCst);
    }) {
        error!("Failed to set Ctrl+C handler: {}", e);
    }
}
