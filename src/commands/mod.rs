//! CLI command implementations
//!
//! Each command builds on the session/provisioner API from
//! `nestflash-core`; nothing here talks to the loader or the network
//! directly.

pub mod check;
pub mod flash;
pub mod provision;

use crate::cli::FirmwareArgs;
use nestflash_core::FirmwareRequest;
use std::path::{Path, PathBuf};

/// Directory the application was installed to (falls back to the
/// current directory when the executable path is unavailable)
fn app_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Firmware cache directory: flag override or `<app dir>/firmware`
pub fn firmware_dir(args: &FirmwareArgs) -> PathBuf {
    args.firmware_dir
        .clone()
        .unwrap_or_else(|| app_dir().join("firmware"))
}

/// Loader path: flag override or `<app dir>/bin/omap_loader`
pub fn loader_path(flag: Option<&Path>) -> PathBuf {
    flag.map(Path::to_path_buf).unwrap_or_else(|| {
        let name = if cfg!(windows) {
            "omap_loader.exe"
        } else {
            "omap_loader"
        };
        app_dir().join("bin").join(name)
    })
}

pub fn request_from(args: &FirmwareArgs) -> FirmwareRequest {
    FirmwareRequest {
        mode: args.mode.into(),
        generation: args.generation.into(),
    }
}
