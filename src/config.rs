use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

use crate::screenshot::ArtifactNaming;

pub const DEFAULT_SESSION_URL: &str = "https://api.fastmail.com/jmap/session";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub jmap: JmapConfig,
    pub folders: FolderConfig,
    pub screenshot: ScreenshotConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JmapConfig {
    pub api_key: String,
    pub session_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FolderConfig {
    pub source: String,
    pub archive: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScreenshotConfig {
    pub output_dir: String,
    pub width: u32,
    pub height: u32,
    pub naming: ArtifactNaming,
    pub timeout_secs: u64,
}

impl ScreenshotConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    pub fn new() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key/value source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::check_required_vars(&lookup)?;

        let var_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Ok(Config {
            jmap: JmapConfig {
                api_key: lookup("FASTMAIL_AAR_KEY").unwrap_or_default(),
                session_url: var_or("JMAP_SESSION_URL", DEFAULT_SESSION_URL),
            },
            folders: FolderConfig {
                source: var_or("SOURCE_FOLDER", "_aar"),
                archive: var_or("ARCHIVE_FOLDER", "_aar_processed"),
            },
            screenshot: ScreenshotConfig {
                output_dir: var_or("SCREENSHOT_DIR", "./screenshots"),
                width: parse_var(&lookup, "SCREENSHOT_WIDTH", 1280)?,
                height: parse_var(&lookup, "SCREENSHOT_HEIGHT", 800)?,
                naming: parse_var(&lookup, "SCREENSHOT_NAMING", ArtifactNaming::Timestamp)?,
                timeout_secs: parse_var(&lookup, "RENDER_TIMEOUT_SECS", 30)?,
            },
        })
    }

    fn check_required_vars<F>(lookup: &F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required_vars = ["FASTMAIL_AAR_KEY"];

        let missing_vars: Vec<&str> = required_vars
            .iter()
            .copied()
            .filter(|var| lookup(var).map_or(true, |value| value.trim().is_empty()))
            .collect();

        if !missing_vars.is_empty() {
            anyhow::bail!(
                "Missing environment variables: {}\n\
                 \n\
                 💡 Solutions:\n\
                 1. Create a .env file with your credentials:\n\
                    FASTMAIL_AAR_KEY=fmu1-...\n\
                 \n\
                 2. Or export the variables manually:\n\
                    export FASTMAIL_AAR_KEY=fmu1-...\n\
                    cargo run -- --dry-run",
                missing_vars.join(", ")
            );
        }

        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("Invalid value for {}: '{}'", key, raw)),
        None => Ok(default),
    }
}
