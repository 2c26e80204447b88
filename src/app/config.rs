//! Optional TOML configuration file and its merge with CLI flags.
//!
//! Priority: CLI flag, then config file value, then built-in default.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use mfbulk_core::{
    DEFAULT_CONCURRENCY, DEFAULT_LISTING_CONCURRENCY, DEFAULT_MAX_ATTEMPTS, FilterRules,
    RetryPolicy,
};
use serde::Deserialize;

use crate::cli::Args;

const APP_DIR: &str = "mfbulk";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_READ_TIMEOUT_SECS: u64 = 60;

/// TOML-backed defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct FileConfig {
    pub(crate) output_dir: Option<String>,
    pub(crate) threads: Option<u8>,
    pub(crate) listing_threads: Option<u8>,
    pub(crate) max_retries: Option<u8>,
    pub(crate) ignore_extensions: Option<Vec<String>>,
    pub(crate) ignore_names: Option<Vec<String>>,
    pub(crate) connect_timeout_secs: Option<u64>,
    pub(crate) read_timeout_secs: Option<u64>,
    pub(crate) fail_fast: Option<bool>,
    pub(crate) history: Option<bool>,
}

impl FileConfig {
    /// Validates values against the same ranges the CLI enforces.
    pub(crate) fn validate(&self) -> Result<()> {
        validate_range("threads", self.threads, 1, 100)?;
        validate_range("listing_threads", self.listing_threads, 1, 16)?;
        validate_range("max_retries", self.max_retries, 0, 10)?;
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("read_timeout_secs", self.read_timeout_secs)?;
        Ok(())
    }
}

fn validate_range(field: &str, value: Option<u8>, min: u8, max: u8) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(min..=max).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: {min}..={max}");
    }
    Ok(())
}

fn validate_timeout_secs(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=3600");
    }
    Ok(())
}

/// Directory holding `config.toml` and `history.jsonl`.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/mfbulk`
/// 2. `~/.config/mfbulk`
pub(crate) fn app_config_dir() -> Option<PathBuf> {
    if let Some(xdg) = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(xdg).join(APP_DIR));
    }
    dirs::home_dir().map(|home| home.join(".config").join(APP_DIR))
}

/// Loads `config.toml` from the app config dir, if present.
pub(crate) fn load_default_file_config() -> Result<Option<FileConfig>> {
    let Some(path) = app_config_dir().map(|dir| dir.join("config.toml")) else {
        return Ok(None);
    };
    if !path.exists() {
        return Ok(None);
    }
    load_file_config(&path).map(Some)
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let cfg: FileConfig = toml::from_str(raw)?;
    cfg.validate()?;
    Ok(cfg)
}

/// Effective settings for one invocation.
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(crate) output: Option<String>,
    pub(crate) threads: usize,
    pub(crate) listing_threads: usize,
    /// Retries after the first attempt.
    pub(crate) max_retries: u32,
    pub(crate) filter: FilterRules,
    pub(crate) connect_timeout_secs: u64,
    pub(crate) read_timeout_secs: u64,
    pub(crate) fail_fast: bool,
    pub(crate) history: bool,
}

impl Settings {
    pub(crate) fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_max_retries(self.max_retries)
    }
}

/// Merges CLI flags over file values over defaults.
pub(crate) fn resolve_settings(args: &Args, file: Option<&FileConfig>) -> Settings {
    let file = file.cloned().unwrap_or_default();

    let mut filter = FilterRules::default();
    if let Some(exts) = args.ignore_extensions.clone().or(file.ignore_extensions) {
        filter = filter.with_extensions(exts);
    }
    if let Some(names) = args.ignore_names.clone().or(file.ignore_names) {
        filter = filter.with_names(names);
    }

    Settings {
        output: args.output.clone().or(file.output_dir),
        threads: args
            .threads
            .or(file.threads)
            .map_or(DEFAULT_CONCURRENCY, usize::from),
        listing_threads: args
            .listing_threads
            .or(file.listing_threads)
            .map_or(DEFAULT_LISTING_CONCURRENCY, usize::from),
        max_retries: args
            .max_retries
            .or(file.max_retries)
            .map_or(DEFAULT_MAX_ATTEMPTS - 1, u32::from),
        filter,
        connect_timeout_secs: file
            .connect_timeout_secs
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
        read_timeout_secs: file.read_timeout_secs.unwrap_or(DEFAULT_READ_TIMEOUT_SECS),
        fail_fast: args.fail_fast || file.fail_fast.unwrap_or(false),
        history: !args.no_history && file.history.unwrap_or(true),
    }
}
