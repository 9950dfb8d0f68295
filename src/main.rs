//! nestflash - Nest thermostat firmware flasher
//!
//! Reflashes NoLongerEvil firmware onto a Nest thermostat through the
//! OMAP USB bootloader by driving the external `omap_loader` tool.
//!
//! The heavy lifting lives in `nestflash-core`: firmware resolution,
//! the download/cache policy, loader command construction, process
//! supervision, and the session state machine. This binary is one
//! presentation layer over that engine - it parses arguments, prompts
//! the operator, and renders the session's event stream.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    match cli.command {
        Commands::Flash {
            firmware,
            loader,
            yes,
        } => commands::flash::run(&firmware, loader.as_deref(), yes),
        Commands::Provision { firmware } => commands::provision::run(&firmware),
        Commands::Check { firmware, loader } => commands::check::run(&firmware, loader.as_deref()),
    }
}
