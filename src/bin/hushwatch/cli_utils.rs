use anyhow::Result;
use hushwatch::audio::{Microphone, Speaker};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeviceDirection {
    Input,
    Output,
}

impl DeviceDirection {
    fn label(self) -> &'static str {
        match self {
            DeviceDirection::Input => "input",
            DeviceDirection::Output => "output",
        }
    }

    fn test_override_var(self) -> &'static str {
        match self {
            DeviceDirection::Input => "HUSHWATCH_TEST_INPUT_DEVICES",
            DeviceDirection::Output => "HUSHWATCH_TEST_OUTPUT_DEVICES",
        }
    }
}

/// Comma-separated device names from a test override variable.
pub(crate) fn parse_device_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

pub(crate) fn list_devices(direction: DeviceDirection) -> Result<()> {
    let label = direction.label();
    let devices = if let Ok(raw) = std::env::var(direction.test_override_var()) {
        parse_device_list(&raw)
    } else {
        let listed = match direction {
            DeviceDirection::Input => Microphone::list_devices(),
            DeviceDirection::Output => Speaker::list_devices(),
        };
        listed.unwrap_or_else(|err| {
            eprintln!("Failed to list audio {label} devices: {err}");
            Vec::new()
        })
    };

    if devices.is_empty() {
        println!("No audio {label} devices detected.");
    } else {
        println!("Available audio {label} devices:");
        for name in devices {
            println!("  - {name}");
        }
    }
    Ok(())
}
