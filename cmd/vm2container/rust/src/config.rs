// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use vm2c_profiler::{DEFAULT_OUTPUT_DIR, TracerSettings};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/vm2container/config.yaml";

#[derive(Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub tracer: TracerConfig,
}

#[derive(Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct TracerConfig {
    pub program: PathBuf,
    pub syscalls: Vec<String>,
    pub shell: PathBuf,
    pub grace_period_ms: u64,
    pub capture_window_secs: u64,
    pub terminate_timeout_secs: u64,
    pub run_as_owner: bool,
}

impl Default for TracerConfig {
    fn default() -> Self {
        let defaults = TracerSettings::default();
        TracerConfig {
            program: defaults.program,
            syscalls: defaults.syscalls,
            shell: defaults.shell,
            grace_period_ms: u64::try_from(defaults.grace_period.as_millis()).unwrap_or(1000),
            capture_window_secs: defaults.capture_window.as_secs(),
            terminate_timeout_secs: defaults.terminate_timeout.as_secs(),
            run_as_owner: defaults.run_as_owner,
        }
    }
}

impl From<&TracerConfig> for TracerSettings {
    fn from(config: &TracerConfig) -> Self {
        TracerSettings {
            program: config.program.clone(),
            syscalls: config.syscalls.clone(),
            shell: config.shell.clone(),
            grace_period: Duration::from_millis(config.grace_period_ms),
            capture_window: Duration::from_secs(config.capture_window_secs),
            terminate_timeout: Duration::from_secs(config.terminate_timeout_secs),
            run_as_owner: config.run_as_owner,
        }
    }
}

/// Settings after applying the environment and command line on top of the
/// config file.
#[derive(Debug, PartialEq)]
pub struct Settings {
    pub output_dir: PathBuf,
    pub tracer: TracerSettings,
}

/// Loads the YAML config file if it exists. A missing file is not an error,
/// every key has a default.
pub fn load_config(config_path: Option<&Path>) -> Result<Option<Config>> {
    let path = config_path.unwrap_or(Path::new(DEFAULT_CONFIG_PATH));
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config = serde_yaml::from_str(&contents)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(config))
}

fn parse_log_level(level: &str) -> log::Level {
    match level.to_lowercase().as_str() {
        "trace" => log::Level::Trace,
        "debug" => log::Level::Debug,
        "info" => log::Level::Info,
        "warn" | "warning" => log::Level::Warn,
        "error" | "critical" => log::Level::Error,
        "off" => log::Level::Error, // Rust log crate doesn't have "off", use Error as minimal logging
        _ => log::Level::Info,
    }
}

/// Gets the log level from configuration.
/// Priority: VM2C_LOG_LEVEL > LOG_LEVEL > YAML config > default Info
pub fn get_log_level(config: Option<&Config>) -> log::Level {
    if let Ok(level) = env::var("VM2C_LOG_LEVEL") {
        return parse_log_level(&level);
    }

    if let Ok(level) = env::var("LOG_LEVEL") {
        return parse_log_level(&level);
    }

    config
        .and_then(|config| config.log_level.as_deref())
        .map(parse_log_level)
        .unwrap_or(log::Level::Info)
}

/// Priority: command line > VM2C_OUTPUT_DIR / VM2C_TRACER > YAML config >
/// defaults.
pub fn resolve(
    config: Option<&Config>,
    output_dir: Option<PathBuf>,
    trace_wait: Option<u64>,
) -> Settings {
    let output_dir = output_dir
        .or_else(|| env::var_os("VM2C_OUTPUT_DIR").map(PathBuf::from))
        .or_else(|| config.and_then(|config| config.output_dir.clone()))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));

    let mut tracer = config
        .map(|config| TracerSettings::from(&config.tracer))
        .unwrap_or_default();
    if let Some(program) = env::var_os("VM2C_TRACER") {
        tracer.program = PathBuf::from(program);
    }
    if let Some(secs) = trace_wait {
        tracer.capture_window = Duration::from_secs(secs);
    }

    Settings { output_dir, tracer }
}
