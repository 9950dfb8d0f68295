//! Provision command: download and unpack firmware without flashing

use crate::cli::FirmwareArgs;
use nestflash_core::{resolve, ArchiveSource, Provisioner};

pub fn run(args: &FirmwareArgs) -> Result<(), Box<dyn std::error::Error>> {
    let request = super::request_from(args);
    let firmware_dir = super::firmware_dir(args);

    let provisioner = Provisioner::new(ArchiveSource::default());
    provisioner.ensure(&firmware_dir, request, &mut |line| println!("{}", line))?;

    let set = resolve(&firmware_dir, request)?;
    println!();
    println!("Firmware ready in {}:", firmware_dir.display());
    println!("  boot stage:   {}", set.boot_stage.display());
    println!("  second stage: {}", set.second_stage.display());
    println!("  kernel:       {}", set.kernel_image.display());
    Ok(())
}
