//! Flash orchestration engine for Nest thermostat DFU reflashing
//!
//! This crate drives the external `omap_loader` tool to reflash a Nest
//! thermostat over its USB bootloader. The CLI (or any other
//! presentation layer) should only interact with [`FlashSession`] and
//! the types it exchanges; everything else is plumbing the session
//! coordinates.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Presentation layer (bin/nestflash)          │
//! │  - start(request) / stop()                                   │
//! │  - renders SessionEvent stream (log lines, state changes)    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  session::FlashSession                       │
//! │  - state machine, single background worker, cancel token     │
//! └─────────────────────────────────────────────────────────────┘
//!          │                │                  │
//!          ▼                ▼                  ▼
//! ┌────────────────┐ ┌──────────────┐ ┌──────────────────────┐
//! │ provision      │ │ firmware     │ │ loader + supervisor  │
//! │ - freshness    │ │ - resolve    │ │ - command contract   │
//! │ - fetch+unzip  │ │   file set   │ │ - spawn/stream/kill  │
//! └────────────────┘ └──────────────┘ └──────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use nestflash_core::{
//!     ArchiveSource, FirmwareRequest, FlashConfig, FlashMode, FlashSession,
//!     Generation, Provisioner, SessionEvent,
//! };
//!
//! let mut session = FlashSession::new();
//! session.start(
//!     FlashConfig { firmware_dir: "firmware".into(), loader: "bin/omap_loader".into() },
//!     Provisioner::new(ArchiveSource::default()),
//!     FirmwareRequest { mode: FlashMode::Standard, generation: Generation::Gen2 },
//!     || true,
//! )?;
//!
//! while let Some(event) = session.next_event() {
//!     if let SessionEvent::Log(line) = event {
//!         println!("{}", line);
//!     }
//! }
//! ```

pub mod error;
pub mod firmware;
pub mod loader;
pub mod provision;
pub mod session;
pub mod supervisor;

pub use error::FlashError;
pub use firmware::{resolve, FirmwareRequest, FirmwareRole, FirmwareSet, FlashMode, Generation};
pub use loader::{build, LoadStep, LoaderCommand};
pub use provision::{ArchiveFetcher, ArchiveSource, HttpFetcher, Provisioner};
pub use session::{
    FlashConfig, FlashOutcome, FlashSession, SessionEvent, SessionState, StartError,
};
pub use supervisor::{CancelToken, ExitOutcome};
