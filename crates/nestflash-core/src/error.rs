//! Error types for flash orchestration

use crate::firmware::FirmwareRole;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that terminate a flash attempt.
///
/// None of these trigger an automatic retry; the operator retries by
/// issuing a fresh start.
#[derive(Debug, Clone, Error)]
pub enum FlashError {
    /// The external loader tool is not installed where expected
    #[error("loader tool not found at {}", .path.display())]
    MissingTool { path: PathBuf },

    /// Fetching the firmware bundle failed
    #[error("firmware download failed: {0}")]
    Download(String),

    /// Unpacking the firmware bundle failed
    #[error("firmware extraction failed: {0}")]
    Extraction(String),

    /// A required firmware file is absent even after provisioning,
    /// which indicates a corrupt or partial cache
    #[error("required {role} file not found (tried: {})", fmt_paths(.attempted))]
    MissingFirmwareFile {
        role: FirmwareRole,
        attempted: Vec<PathBuf>,
    },

    /// The loader process could not be started or supervised
    #[error("failed to run loader: {0}")]
    ProcessLaunch(String),

    /// The loader ran to completion but reported failure
    #[error("loader exited with code {code}")]
    NonZeroExit { code: i32 },
}

fn fmt_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type for flash orchestration operations
pub type Result<T> = core::result::Result<T, FlashError>;
