//! Check command: report whether flashing prerequisites are in place

use crate::cli::FirmwareArgs;
use std::path::Path;

pub fn run(args: &FirmwareArgs, loader: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let loader = super::loader_path(loader);
    let firmware_dir = super::firmware_dir(args);

    println!("Checking prerequisites...");

    let mut ok = true;
    if loader.is_file() {
        println!("  [ok] loader found at {}", loader.display());
    } else {
        println!("  [!!] loader not found at {}", loader.display());
        println!("       Ensure the application is installed correctly.");
        ok = false;
    }

    if firmware_dir.is_dir() {
        println!("  [ok] firmware directory exists at {}", firmware_dir.display());
    } else {
        println!(
            "  [--] firmware directory not found at {}",
            firmware_dir.display()
        );
        println!("       Firmware will be downloaded when flashing starts.");
    }

    if ok {
        println!();
        println!("Ready to flash.");
        Ok(())
    } else {
        Err("prerequisites not met".into())
    }
}
