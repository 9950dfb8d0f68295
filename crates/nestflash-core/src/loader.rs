//! Loader command construction
//!
//! The OMAP bootloader protocol is fixed by the hardware: the boot stage
//! is transferred first (the loader knows its address), the second stage
//! and kernel follow at fixed addresses, and execution jumps to the
//! second stage once everything is in place. The builder emits exactly
//! that sequence; nothing here is configurable.

use crate::firmware::FirmwareSet;
use std::ffi::OsString;
use std::path::PathBuf;

/// Load address of the second stage (u-boot)
pub const SECOND_STAGE_ADDR: u32 = 0x8010_0000;
/// Load address of the kernel image (uImage)
pub const KERNEL_ADDR: u32 = 0x80A0_0000;
/// Entry point executed once all images are transferred
pub const JUMP_ADDR: u32 = SECOND_STAGE_ADDR;

/// One file transfer in the load sequence.
///
/// The boot stage carries no address; the loader infers it. Every later
/// step carries an explicit load address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadStep {
    pub file: PathBuf,
    pub address: Option<u32>,
}

/// The full, ordered loader invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderCommand {
    pub steps: Vec<LoadStep>,
    pub jump: u32,
}

/// Build the load sequence for a resolved firmware set
pub fn build(set: &FirmwareSet) -> LoaderCommand {
    LoaderCommand {
        steps: vec![
            LoadStep {
                file: set.boot_stage.clone(),
                address: None,
            },
            LoadStep {
                file: set.second_stage.clone(),
                address: Some(SECOND_STAGE_ADDR),
            },
            LoadStep {
                file: set.kernel_image.clone(),
                address: Some(KERNEL_ADDR),
            },
        ],
        jump: JUMP_ADDR,
    }
}

impl LoaderCommand {
    /// Render the omap_loader argument list.
    ///
    /// Contract: `-f <file>` per step, each one after the first followed
    /// by its `-a <address>`, then `-v` for verbose output and `-j
    /// <address>` as the final jump instruction.
    pub fn to_args(&self) -> Vec<OsString> {
        let mut args = Vec::new();
        for step in &self.steps {
            args.push(OsString::from("-f"));
            args.push(step.file.clone().into_os_string());
            if let Some(address) = step.address {
                args.push(OsString::from("-a"));
                args.push(OsString::from(hex(address)));
            }
        }
        args.push(OsString::from("-v"));
        args.push(OsString::from("-j"));
        args.push(OsString::from(hex(self.jump)));
        args
    }
}

fn hex(addr: u32) -> String {
    format!("0x{:08X}", addr)
}
