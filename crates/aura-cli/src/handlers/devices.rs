//! Devices command handler.

use anyhow::{Context, Result};
use aura_presence::CpalMicrophone;

/// Print the available audio input devices.
pub fn execute(json: bool) -> Result<()> {
    let devices = CpalMicrophone::list_devices().context("Failed to enumerate input devices")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    if devices.is_empty() {
        println!("No audio input devices found.");
        return Ok(());
    }

    println!("Found {} input device(s):\n", devices.len());
    for device in devices {
        let marker = if device.is_default { "*" } else { " " };
        println!(" {marker} {}", device.name);
    }
    println!("\n* = system default");
    Ok(())
}
