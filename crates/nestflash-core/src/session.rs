//! Flash session state machine
//!
//! Owns the lifecycle of one flash attempt: prerequisite check,
//! provisioning, resolution, and the supervised loader run. All blocking
//! work happens on a single background worker; the control thread
//! observes progress through the event channel and is the only writer
//! of the session state. At most one attempt is active at a time,
//! enforced by the `start` guard.

use crate::error::FlashError;
use crate::firmware::{self, FirmwareRequest, FlashMode};
use crate::loader;
use crate::provision::Provisioner;
use crate::supervisor::{self, CancelToken, ExitOutcome};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use thiserror::Error;

/// Session phases visible to the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    CheckingPrerequisites,
    ProvisioningFirmware,
    Flashing,
    Succeeded,
    Failed,
    Cancelled,
}

impl SessionState {
    /// Terminal states permit a fresh `start`
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Succeeded | SessionState::Failed | SessionState::Cancelled
        )
    }
}

/// Terminal result of one attempt
#[derive(Debug, Clone)]
pub enum FlashOutcome {
    Succeeded,
    Failed(FlashError),
    Cancelled,
}

impl FlashOutcome {
    pub fn state(&self) -> SessionState {
        match self {
            FlashOutcome::Succeeded => SessionState::Succeeded,
            FlashOutcome::Failed(_) => SessionState::Failed,
            FlashOutcome::Cancelled => SessionState::Cancelled,
        }
    }
}

/// Worker-to-observer notifications, delivered in production order
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The attempt entered a new phase
    State(SessionState),
    /// One line of progress output (engine or loader)
    Log(String),
    /// The attempt reached a terminal outcome; no further events follow
    Finished(FlashOutcome),
}

/// Where the loader tool and the firmware cache live
#[derive(Debug, Clone)]
pub struct FlashConfig {
    pub firmware_dir: PathBuf,
    pub loader: PathBuf,
}

/// Why `start` refused to begin an attempt
#[derive(Debug, Clone, Error)]
pub enum StartError {
    #[error("a flash attempt is already in progress")]
    SessionActive,
    #[error("display-only mode was not acknowledged")]
    Declined,
}

/// Coordinates one flash attempt at a time.
///
/// The owning (control) thread calls [`start`](Self::start), drains
/// events with [`next_event`](Self::next_event), and may request
/// cancellation with [`stop`](Self::stop). The session itself never
/// touches presentation state; observers render the event stream
/// however they like.
pub struct FlashSession {
    state: SessionState,
    cancel: CancelToken,
    events: Option<Receiver<SessionEvent>>,
    worker: Option<JoinHandle<()>>,
    outcome: Option<FlashOutcome>,
}

impl FlashSession {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            cancel: CancelToken::new(),
            events: None,
            worker: None,
            outcome: None,
        }
    }

    /// Current phase, as last observed by the control thread
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Terminal result of the most recent attempt, if it finished
    pub fn outcome(&self) -> Option<&FlashOutcome> {
        self.outcome.as_ref()
    }

    /// Begin a flash attempt on a background worker.
    ///
    /// Rejected while an attempt is active. For `LocalOnly` requests the
    /// `confirm_local_only` callback must acknowledge the
    /// destructive-capability warning (the device will stop controlling
    /// heating and cooling) before anything happens.
    pub fn start<F>(
        &mut self,
        config: FlashConfig,
        provisioner: Provisioner,
        request: FirmwareRequest,
        confirm_local_only: F,
    ) -> Result<(), StartError>
    where
        F: FnOnce() -> bool,
    {
        if let Some(worker) = self.worker.take() {
            if self.state.is_terminal() {
                // Reap the previous attempt's worker; it already sent
                // its Finished event
                let _ = worker.join();
                self.events = None;
            } else {
                self.worker = Some(worker);
                return Err(StartError::SessionActive);
            }
        }
        if !(self.state == SessionState::Idle || self.state.is_terminal()) {
            return Err(StartError::SessionActive);
        }

        if request.mode == FlashMode::LocalOnly && !confirm_local_only() {
            return Err(StartError::Declined);
        }

        let cancel = CancelToken::new();
        let (tx, rx) = mpsc::channel();

        self.cancel = cancel.clone();
        self.state = SessionState::CheckingPrerequisites;
        self.outcome = None;
        self.events = Some(rx);
        self.worker = Some(thread::spawn(move || {
            run_attempt(&config, &provisioner, request, &cancel, &tx);
        }));
        Ok(())
    }

    /// Request cancellation of the running transfer.
    ///
    /// Only meaningful while flashing; anywhere else this is a no-op,
    /// never an error. Download and extraction have no cancellation
    /// point.
    pub fn stop(&self) {
        if self.state == SessionState::Flashing {
            self.cancel.cancel();
        }
    }

    /// Block for the next worker notification, applying state changes
    /// as they are observed.
    ///
    /// Returns `None` once the attempt has finished and the channel is
    /// drained; the worker is reaped at that point.
    pub fn next_event(&mut self) -> Option<SessionEvent> {
        let rx = self.events.as_ref()?;
        match rx.recv() {
            Ok(event) => {
                match &event {
                    SessionEvent::State(state) => self.state = *state,
                    SessionEvent::Log(_) => {}
                    SessionEvent::Finished(outcome) => {
                        self.state = outcome.state();
                        self.outcome = Some(outcome.clone());
                    }
                }
                Some(event)
            }
            Err(_) => {
                self.events = None;
                if let Some(worker) = self.worker.take() {
                    let _ = worker.join();
                }
                None
            }
        }
    }
}

impl Default for FlashSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Worker entry point: run the attempt and always finish with a
/// terminal event
fn run_attempt(
    config: &FlashConfig,
    provisioner: &Provisioner,
    request: FirmwareRequest,
    cancel: &CancelToken,
    tx: &Sender<SessionEvent>,
) {
    let outcome = match attempt(config, provisioner, request, cancel, tx) {
        Ok(outcome) => outcome,
        Err(err) => FlashOutcome::Failed(err),
    };
    report_outcome(&outcome, tx);
    let _ = tx.send(SessionEvent::Finished(outcome));
}

fn attempt(
    config: &FlashConfig,
    provisioner: &Provisioner,
    request: FirmwareRequest,
    cancel: &CancelToken,
    tx: &Sender<SessionEvent>,
) -> Result<FlashOutcome, FlashError> {
    let state = |s| {
        let _ = tx.send(SessionEvent::State(s));
    };
    let log = |line: String| {
        let _ = tx.send(SessionEvent::Log(line));
    };

    state(SessionState::CheckingPrerequisites);
    if !config.loader.is_file() {
        return Err(FlashError::MissingTool {
            path: config.loader.clone(),
        });
    }
    log(format!("Found loader at {}", config.loader.display()));

    state(SessionState::ProvisioningFirmware);
    provisioner.ensure(&config.firmware_dir, request, &mut |line| log(line))?;

    let set = firmware::resolve(&config.firmware_dir, request)?;
    log("Using firmware files:".to_string());
    log(format!("  boot stage:   {}", set.boot_stage.display()));
    log(format!("  second stage: {}", set.second_stage.display()));
    log(format!("  kernel:       {}", set.kernel_image.display()));

    state(SessionState::Flashing);
    let command = loader::build(&set);
    let args = command.to_args();
    log(format!("Executing: {}", render_command(&config.loader, &args)));
    log("Waiting for device to enter DFU mode...".to_string());

    let outcome = supervisor::run(
        &config.loader,
        &args,
        &mut |line| log(line.to_string()),
        cancel,
    )?;

    Ok(match outcome {
        ExitOutcome::Success => FlashOutcome::Succeeded,
        ExitOutcome::Failure(code) => FlashOutcome::Failed(FlashError::NonZeroExit { code }),
        ExitOutcome::Cancelled => FlashOutcome::Cancelled,
    })
}

/// Terminal log messaging. Cancellation is deliberately silent: it is
/// not a failure and gets no success/failure messaging.
fn report_outcome(outcome: &FlashOutcome, tx: &Sender<SessionEvent>) {
    let log = |line: String| {
        let _ = tx.send(SessionEvent::Log(line));
    };
    match outcome {
        FlashOutcome::Succeeded => log("Firmware flashed successfully!".to_string()),
        FlashOutcome::Cancelled => {}
        FlashOutcome::Failed(err) => {
            log(format!("ERROR: {}", err));
            if let FlashError::NonZeroExit { .. } = err {
                log("Check that the device is connected over USB, entered DFU mode, and that the USB drivers are installed.".to_string());
            }
        }
    }
}

fn render_command(loader: &Path, args: &[OsString]) -> String {
    let mut parts = vec![loader.display().to_string()];
    parts.extend(args.iter().map(|a| a.to_string_lossy().into_owned()));
    parts.join(" ")
}
