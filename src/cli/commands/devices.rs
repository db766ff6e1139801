//! Devices command - show resolved devices

use crate::cli::args::{DevicesArgs, OutputFormat};
use crate::config::Config;
use crate::device::{DeviceResolver, ResolvedDevices};
use crate::error::ClientResult;
use console::style;
use serde::Serialize;

/// Execute the devices command
pub async fn execute(args: DevicesArgs, config: &Config) -> ClientResult<()> {
    let kind = args
        .kind
        .as_deref()
        .unwrap_or(&config.device.default_kind);
    let resolved = DeviceResolver::new().resolve(kind)?;

    match args.format {
        OutputFormat::Table => print_table(&resolved),
        OutputFormat::Json => print_json(&resolved)?,
        OutputFormat::Plain => print_plain(&resolved),
    }

    Ok(())
}

#[derive(Serialize)]
struct DeviceJson {
    device: String,
    native: String,
    default: bool,
}

fn rows(resolved: &ResolvedDevices) -> Vec<DeviceJson> {
    resolved
        .devices()
        .iter()
        .map(|device| DeviceJson {
            device: device.to_string(),
            native: resolved.native_name(device).unwrap_or("-").to_string(),
            default: *device == resolved.default_device(),
        })
        .collect()
}

fn print_table(resolved: &ResolvedDevices) {
    println!("{:<10} {:<12} {:<8}", "DEVICE", "NATIVE", "DEFAULT");
    println!("{}", "-".repeat(32));

    for row in rows(resolved) {
        let default = if row.default {
            style("yes").green().to_string()
        } else {
            String::new()
        };
        println!("{:<10} {:<12} {:<8}", row.device, row.native, default);
    }
}

fn print_json(resolved: &ResolvedDevices) -> ClientResult<()> {
    println!("{}", serde_json::to_string_pretty(&rows(resolved))?);
    Ok(())
}

fn print_plain(resolved: &ResolvedDevices) {
    for device in resolved.devices() {
        println!("{}", device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_mark_default() {
        let resolved = DeviceResolver::new().resolve("GPU").unwrap();
        let rows = rows(&resolved);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].device, "GPU:0");
        assert_eq!(rows[0].native, "cuda(0)");
        assert!(rows[0].default);
        assert!(!rows[1].default);
    }
}
