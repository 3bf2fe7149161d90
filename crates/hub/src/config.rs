//! TOML config file loading, validation, and seeding of stored preferences.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use dripper_store::prefs::is_device_address;
use dripper_store::Stores;

// ---------------------------------------------------------------------------
// Config file structure
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the schedule, field-data and preferences files.
    pub data_dir: String,
    pub web_port: u16,
    /// Marks the last chunk of a telemetry payload on the stdin feed.
    pub terminator: String,
    /// Ingest the built-in sample payload at startup.
    pub self_test: bool,
    /// Seeds the stored controller address when set.
    pub device_address: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
            web_port: 8080,
            terminator: "#END".to_string(),
            self_test: false,
            device_address: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Validate every entry. Returns `Ok(())` or an error describing every
    /// violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.data_dir.trim().is_empty() {
            errors.push("data_dir is empty".to_string());
        }

        if self.web_port == 0 {
            errors.push("web_port must be non-zero".to_string());
        }

        if self.terminator.trim().is_empty() {
            errors.push("terminator is empty".to_string());
        } else if self.terminator.contains(['{', '}']) {
            errors.push(format!(
                "terminator '{}' must not contain braces",
                self.terminator
            ));
        }

        if let Some(addr) = &self.device_address {
            if !is_device_address(addr) {
                errors.push(format!(
                    "device_address '{addr}' is not of the form XX:XX:XX:XX:XX:XX"
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Load + apply
// ---------------------------------------------------------------------------

/// Read, parse, and validate a TOML config file. A missing file yields the
/// defaults.
pub fn load(path: &str) -> Result<Config> {
    let config = if Path::new(path).exists() {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;
        toml::from_str(&contents).with_context(|| format!("failed to parse config: {path}"))?
    } else {
        tracing::info!(path, "no config file, using defaults");
        Config::default()
    };
    config
        .validate()
        .with_context(|| format!("invalid config: {path}"))?;
    Ok(config)
}

/// Push configured values into the stores.
pub async fn apply(config: &Config, stores: &Stores) -> Result<()> {
    if let Some(addr) = &config.device_address {
        stores
            .prefs
            .set_device_address(addr)
            .await
            .with_context(|| format!("failed to store device address '{addr}'"))?;
        tracing::info!(device_address = %addr, "config applied");
    }
    Ok(())
}

// ===========================================================================
// Tests
// ===========================================================================
