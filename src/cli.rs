//! CLI argument parsing

use clap::{Parser, Subcommand, ValueEnum};
use nestflash_core::{FlashMode, Generation};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "nestflash")]
#[command(author, version, about = "Nest thermostat firmware flasher", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by commands that pick a firmware set
#[derive(clap::Args, Debug, Clone)]
pub struct FirmwareArgs {
    /// Firmware type to install
    #[arg(short, long, value_enum, default_value = "standard")]
    pub mode: ModeArg,

    /// Nest hardware generation
    #[arg(short, long, value_enum, default_value = "2")]
    pub generation: GenerationArg,

    /// Firmware cache directory
    /// Defaults to <executable dir>/firmware
    #[arg(long)]
    pub firmware_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Cloud-connected firmware with full thermostat control
    Standard,
    /// Temperature/humidity display only; NO thermostat control
    LocalOnly,
}

impl From<ModeArg> for FlashMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Standard => FlashMode::Standard,
            ModeArg::LocalOnly => FlashMode::LocalOnly,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GenerationArg {
    /// Generation 1
    #[value(name = "1")]
    Gen1,
    /// Generation 2 (check the back plate: green bubble level = Gen 1/2)
    #[value(name = "2")]
    Gen2,
}

impl From<GenerationArg> for Generation {
    fn from(generation: GenerationArg) -> Self {
        match generation {
            GenerationArg::Gen1 => Generation::Gen1,
            GenerationArg::Gen2 => Generation::Gen2,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Flash firmware to a device in DFU mode
    Flash {
        #[command(flatten)]
        firmware: FirmwareArgs,

        /// Path to the omap_loader executable
        /// Defaults to <executable dir>/bin/omap_loader
        #[arg(long)]
        loader: Option<PathBuf>,

        /// Skip the display-only mode confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Download and unpack the firmware bundle without flashing
    Provision {
        #[command(flatten)]
        firmware: FirmwareArgs,
    },

    /// Check that the loader tool and firmware cache are in place
    Check {
        #[command(flatten)]
        firmware: FirmwareArgs,

        /// Path to the omap_loader executable
        /// Defaults to <executable dir>/bin/omap_loader
        #[arg(long)]
        loader: Option<PathBuf>,
    },
}
