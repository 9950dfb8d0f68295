//! Firmware selection and resolution
//!
//! Maps a (mode, generation) request onto the concrete image files the
//! loader needs. Mode-specific images carry a filename suffix; for each
//! role the suffixed name is probed first, falling back to the plain
//! name, so a bundle that only ships mode-neutral images still resolves.

use crate::error::FlashError;
use std::fmt;
use std::path::{Path, PathBuf};

/// Firmware flavor to install
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashMode {
    /// Cloud-connected firmware with full thermostat control
    Standard,
    /// Sensor-display firmware; the device reports temperature and
    /// humidity but controls no heating or cooling
    LocalOnly,
}

impl FlashMode {
    /// Filename suffix carried by mode-specific images
    pub fn suffix(self) -> &'static str {
        match self {
            FlashMode::Standard => "",
            FlashMode::LocalOnly => "-simple",
        }
    }
}

impl fmt::Display for FlashMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlashMode::Standard => write!(f, "standard"),
            FlashMode::LocalOnly => write!(f, "local-only"),
        }
    }
}

/// Nest hardware revision; selects the compatible boot stage binary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generation {
    Gen1,
    Gen2,
}

impl Generation {
    pub fn number(self) -> u8 {
        match self {
            Generation::Gen1 => 1,
            Generation::Gen2 => 2,
        }
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen{}", self.number())
    }
}

/// One flash attempt's input, fixed for the whole attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareRequest {
    pub mode: FlashMode,
    pub generation: Generation,
}

impl FirmwareRequest {
    /// Mode/generation-specific boot stage filename.
    ///
    /// This is also the file whose modification time drives the cache
    /// freshness check during provisioning.
    pub fn boot_stage_name(&self) -> String {
        format!(
            "x-load-gen{}{}.bin",
            self.generation.number(),
            self.mode.suffix()
        )
    }
}

/// The three images the loader transfers, in load order.
///
/// All paths were verified to exist at resolution time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareSet {
    pub boot_stage: PathBuf,
    pub second_stage: PathBuf,
    pub kernel_image: PathBuf,
}

/// Image role within the load sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareRole {
    /// Minimal first-stage loader (x-load), generation-keyed
    BootStage,
    /// Hardware init stage (u-boot)
    SecondStage,
    /// Main operating payload (uImage)
    KernelImage,
}

impl fmt::Display for FirmwareRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FirmwareRole::BootStage => write!(f, "boot stage (x-load)"),
            FirmwareRole::SecondStage => write!(f, "second stage (u-boot)"),
            FirmwareRole::KernelImage => write!(f, "kernel (uImage)"),
        }
    }
}

/// Resolve the image set for `request` under `base_dir`.
///
/// Pure apart from the existence probes: same inputs give the same
/// output, and nothing is created or modified. Never returns a partial
/// set; the first role that resolves to no file fails the whole
/// resolution with every path that was tried.
pub fn resolve(base_dir: &Path, request: FirmwareRequest) -> Result<FirmwareSet, FlashError> {
    let gen = request.generation.number();
    let suffix = request.mode.suffix();

    let boot_stage = probe(
        base_dir,
        FirmwareRole::BootStage,
        &[
            format!("x-load-gen{}{}.bin", gen, suffix),
            format!("x-load-gen{}.bin", gen),
        ],
    )?;
    let second_stage = probe(
        base_dir,
        FirmwareRole::SecondStage,
        &[format!("u-boot{}.bin", suffix), "u-boot.bin".to_string()],
    )?;
    let kernel_image = probe(
        base_dir,
        FirmwareRole::KernelImage,
        &[format!("uImage{}", suffix), "uImage".to_string()],
    )?;

    Ok(FirmwareSet {
        boot_stage,
        second_stage,
        kernel_image,
    })
}

/// Return the first candidate that exists as a file under `base_dir`
fn probe(
    base_dir: &Path,
    role: FirmwareRole,
    candidates: &[String],
) -> Result<PathBuf, FlashError> {
    let mut attempted = Vec::new();
    for name in candidates {
        let path = base_dir.join(name);
        if path.is_file() {
            return Ok(path);
        }
        // Standard mode probes the same name twice; report it once
        if !attempted.contains(&path) {
            attempted.push(path);
        }
    }
    Err(FlashError::MissingFirmwareFile { role, attempted })
}
