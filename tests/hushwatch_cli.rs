use std::process::Command;

fn combined_output(output: &std::process::Output) -> String {
    let mut combined = String::new();
    combined.push_str(&String::from_utf8_lossy(&output.stdout));
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    combined
}

fn hushwatch_bin() -> &'static str {
    option_env!("CARGO_BIN_EXE_hushwatch").expect("hushwatch test binary not built")
}

fn benchmark_bin() -> &'static str {
    option_env!("CARGO_BIN_EXE_unrest_benchmark").expect("unrest_benchmark test binary not built")
}

#[test]
fn hushwatch_help_mentions_name() {
    let output = Command::new(hushwatch_bin())
        .arg("--help")
        .output()
        .expect("run hushwatch --help");
    assert!(output.status.success());
    let combined = combined_output(&output);
    assert!(combined.contains("hushwatch"));
    assert!(combined.contains("--start-threshold"));
}

#[test]
fn hushwatch_list_input_devices_uses_override() {
    let output = Command::new(hushwatch_bin())
        .arg("--list-input-devices")
        .arg("--no-logs")
        .env("HUSHWATCH_TEST_INPUT_DEVICES", "Nursery Mic, USB Array")
        .output()
        .expect("run hushwatch --list-input-devices");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Available audio input devices"));
    assert!(stdout.contains("  - Nursery Mic"));
    assert!(stdout.contains("  - USB Array"));
}

#[test]
fn hushwatch_list_output_devices_prints_message() {
    let output = Command::new(hushwatch_bin())
        .arg("--list-output-devices")
        .arg("--no-logs")
        .output()
        .expect("run hushwatch --list-output-devices");
    assert!(output.status.success());
    let combined = combined_output(&output);
    assert!(
        combined.contains("audio output devices")
            || combined.contains("Failed to list audio output devices")
    );
}

#[test]
fn hushwatch_rejects_calm_above_start() {
    let output = Command::new(hushwatch_bin())
        .args(["--no-logs", "--start-threshold", "40", "--calm-threshold", "60"])
        .output()
        .expect("run hushwatch with bad thresholds");
    assert!(!output.status.success());
    assert!(combined_output(&output).contains("calm_threshold"));
}

#[test]
fn benchmark_prints_metrics_line() {
    let output = Command::new(benchmark_bin())
        .args(["--label", "ci", "--tail-ms", "15000"])
        .output()
        .expect("run unrest_benchmark");
    assert!(output.status.success(), "{}", combined_output(&output));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let line = stdout
        .lines()
        .find(|line| line.starts_with("unrest_metrics|"))
        .expect("metrics line");
    assert!(line.contains("|label=ci|"));
    assert!(line.contains("|outcomes=1|"), "{line}");
}
