//! `lectern devices`: list audio devices.

use std::fmt::Write as _;

use anyhow::Result;
use lectern_voice::{AudioDeviceInfo, list_input_devices, list_output_devices};

/// Print input and output devices, marking the system defaults.
pub fn execute() -> Result<()> {
    let inputs = list_input_devices()?;
    let outputs = list_output_devices()?;
    print!("{}", render("Input devices", &inputs));
    println!();
    print!("{}", render("Output devices", &outputs));
    Ok(())
}

fn render(title: &str, devices: &[AudioDeviceInfo]) -> String {
    let mut out = format!("{title}:\n");
    if devices.is_empty() {
        out.push_str("  (none)\n");
        return out;
    }
    for device in devices {
        let marker = if device.is_default { "*" } else { " " };
        let _ = writeln!(out, "  {marker} {}", device.name);
    }
    out
}
