mod setup;

use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use xair_core::config::{self, Config};

/// Bridge an X-Touch Mini to a Behringer X-Air mixer.
#[derive(Parser, Debug)]
#[command(name = "xair-remote")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Network address of the mixer
    pub mixer_address: String,

    /// Layer layout file (default: <config dir>/xair-remote/layout.json, then the built-in one)
    #[arg(long)]
    pub layout: Option<PathBuf>,

    /// Verbose logging, including unmapped mixer messages
    #[arg(short, long)]
    pub debug: bool,

    /// Shut down when the control surface is unplugged
    #[arg(short, long)]
    pub monitor: bool,

    /// Subscribe to input meters and log their levels
    #[arg(short, long)]
    pub levels: bool,

    /// Start with clip protection enabled
    #[arg(short, long)]
    pub clip: bool,
}

fn init_logging(debug: bool) {
    use simplelog::*;

    let level = if debug { LevelFilter::Debug } else { LevelFilter::Info };

    let log_path = config::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("xair-remote.log");
    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];
    let log_file = File::create(&log_path)
        .or_else(|_| File::create(std::env::temp_dir().join("xair-remote.log")));
    match log_file {
        Ok(file) => loggers.push(WriteLogger::new(level, Config::default(), file)),
        Err(e) => eprintln!("xair-remote: no log file: {}", e),
    }
    if CombinedLogger::init(loggers).is_err() {
        eprintln!("xair-remote: logger already initialized");
    }

    log::info!("xair-remote starting (log level: {:?})", level);
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let config = Config::load();
    match setup::run_bridge(&cli, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!(target: "runtime", "{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
