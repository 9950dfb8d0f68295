//! Flash command: the full provision-and-flash flow

use crate::cli::FirmwareArgs;
use indicatif::{ProgressBar, ProgressStyle};
use nestflash_core::{
    ArchiveSource, FlashConfig, FlashMode, FlashOutcome, FlashSession, Provisioner, SessionEvent,
    SessionState,
};
use std::io::{BufRead, Write};
use std::path::Path;
use std::time::Duration;

pub fn run(
    args: &FirmwareArgs,
    loader: Option<&Path>,
    yes: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let request = super::request_from(args);
    let config = FlashConfig {
        firmware_dir: super::firmware_dir(args),
        loader: super::loader_path(loader),
    };

    print_preflight_instructions();

    let mut session = FlashSession::new();
    session.start(
        config,
        Provisioner::new(ArchiveSource::default()),
        request,
        || yes || confirm_local_only(),
    )?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));

    while let Some(event) = session.next_event() {
        match event {
            SessionEvent::State(state) => spinner.set_message(state_message(state)),
            SessionEvent::Log(line) => spinner.println(line),
            SessionEvent::Finished(_) => spinner.finish_and_clear(),
        }
    }

    match session.outcome() {
        Some(FlashOutcome::Succeeded) => {
            print_next_steps(request.mode);
            Ok(())
        }
        Some(FlashOutcome::Cancelled) => {
            println!("Flashing stopped.");
            Ok(())
        }
        Some(FlashOutcome::Failed(err)) => Err(format!("flashing failed: {}", err).into()),
        None => Err("session ended without an outcome".into()),
    }
}

/// Destructive-capability warning for display-only mode; mirrors the
/// acknowledgment the installer required before proceeding
fn confirm_local_only() -> bool {
    println!();
    println!("You selected display-only mode.");
    println!("WARNING: your Nest will NOT control heating or cooling!");
    println!("It will ONLY display temperature and humidity.");
    print!("Continue? [y/N] ");
    let _ = std::io::stdout().flush();

    let mut answer = String::new();
    if std::io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

fn print_preflight_instructions() {
    println!("Prepare your device:");
    println!("  1. Ensure your Nest is charged (50%+ recommended)");
    println!("  2. Remove the Nest from the wall mount");
    println!("  3. Connect it to your computer via micro USB");
    println!("  4. Press and hold the display for 10-15 seconds to reboot");
    println!();
}

fn print_next_steps(mode: FlashMode) {
    println!();
    println!("Next steps:");
    println!("  1. Keep the device plugged in via USB");
    println!("  2. Wait 2-3 minutes for it to boot");
    match mode {
        FlashMode::LocalOnly => {
            println!("  3. The device will show temperature and humidity");
            println!();
            println!("No internet or account setup required!");
        }
        FlashMode::Standard => {
            println!("  3. Visit https://nolongerevil.com to register");
            println!("  4. Link the device using the entry code from:");
            println!("     Settings -> Nest App -> Get Entry Code");
        }
    }
}

fn state_message(state: SessionState) -> String {
    match state {
        SessionState::Idle => "Ready",
        SessionState::CheckingPrerequisites => "Checking prerequisites...",
        SessionState::ProvisioningFirmware => "Preparing firmware files...",
        SessionState::Flashing => "Flashing (waiting for DFU mode)...",
        SessionState::Succeeded => "Flashing complete!",
        SessionState::Failed => "Flashing failed",
        SessionState::Cancelled => "Flashing stopped",
    }
    .to_string()
}
