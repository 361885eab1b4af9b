use super::defaults::{MAX_DEVICE_NAME_LEN, MAX_SESSION_DURATION_SEC};
use super::{AppConfig, InterventionConfig, SessionConfig, SynthConfig};
use anyhow::{bail, Context, Result};
use clap::Parser;

impl AppConfig {
    /// Parse CLI arguments and validate them right away.
    pub fn parse_args() -> Result<Self> {
        let mut config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Check CLI values before any device is touched.
    pub fn validate(&mut self) -> Result<()> {
        for (flag, value) in [
            ("--start-threshold", self.start_threshold),
            ("--calm-threshold", self.calm_threshold),
            ("--retrigger-threshold", self.retrigger_threshold),
            (
                "--predictive-escalation-threshold",
                self.predictive_escalation_threshold,
            ),
        ] {
            if !(0.0..=100.0).contains(&value) {
                bail!("{flag} must be between 0 and 100, got {value}");
            }
        }
        if !(self.volume_cap > 0.0 && self.volume_cap <= 1.0) {
            bail!(
                "--volume-cap must be greater than 0 and at most 1, got {}",
                self.volume_cap
            );
        }
        if !(0.0..=self.volume_cap).contains(&self.baseline_volume) {
            bail!(
                "--baseline-volume must be between 0 and --volume-cap ({}), got {}",
                self.volume_cap,
                self.baseline_volume
            );
        }
        if !(1..=3).contains(&self.level) {
            bail!("--level must be between 1 and 3, got {}", self.level);
        }
        if self.duration_secs > MAX_SESSION_DURATION_SEC {
            bail!(
                "--duration-secs must be at most {MAX_SESSION_DURATION_SEC}, got {}",
                self.duration_secs
            );
        }
        for (flag, device) in [
            ("--input-device", &mut self.input_device),
            ("--output-device", &mut self.output_device),
        ] {
            if let Some(name) = device {
                let trimmed = name.trim();
                if trimmed.is_empty() {
                    bail!("{flag} cannot be empty");
                }
                if trimmed.len() > MAX_DEVICE_NAME_LEN || trimmed.chars().any(char::is_control) {
                    bail!(
                        "{flag} must be <={MAX_DEVICE_NAME_LEN} characters with no control characters"
                    );
                }
                *name = trimmed.to_string();
            }
        }
        if let Some(path) = &self.config_file {
            if !path.is_file() {
                bail!("--config-file '{}' does not exist", path.display());
            }
        }

        // Cross-field rules (calm < start, retrigger > calm, ...) live on the
        // session structs; surface them with the flag context.
        if self.config_file.is_none() {
            self.flag_session_config()
                .validate()
                .context("invalid intervention flags")?;
        }
        Ok(())
    }

    /// Snapshot the session configuration, preferring `--config-file` when set.
    pub fn session_config(&self) -> Result<SessionConfig> {
        if let Some(path) = &self.config_file {
            return SessionConfig::from_json_file(path)
                .with_context(|| format!("failed to load '{}'", path.display()));
        }
        let config = self.flag_session_config();
        config.validate()?;
        Ok(config)
    }

    fn flag_session_config(&self) -> SessionConfig {
        let intervention = InterventionConfig {
            start_threshold: self.start_threshold,
            start_confirm_sec: self.start_confirm_sec,
            calm_threshold: self.calm_threshold,
            calm_confirm_sec: self.calm_confirm_sec,
            retrigger_threshold: self.retrigger_threshold,
            retrigger_confirm_sec: self.retrigger_confirm_sec,
            cooldown_sec: self.cooldown_sec,
            min_soothing_sec: self.min_soothing_sec,
            max_escalations: self.max_escalations,
            volume_cap: self.volume_cap,
            baseline_volume: self.baseline_volume,
            baseline_kind: self.baseline_sound,
            predictive_enabled: self.predictive,
            predictive_gradient_threshold: self.predictive_gradient,
            predictive_escalation_threshold: self.predictive_escalation_threshold,
            ..InterventionConfig::default()
        };
        let synth = SynthConfig {
            sample_rate: self.output_sample_rate,
            buffer_frames: self.output_buffer_frames,
            ..SynthConfig::default()
        };
        SessionConfig {
            intervention,
            synth,
            ..SessionConfig::default()
        }
    }
}
