// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

// Panicking code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
// Debug code that shouldn't be in production
#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]

use anyhow::Result;
use clap::Parser;
use log::{debug, info, warn};

mod cli;
mod config;
mod dockerize;
mod profile;

use cli::{Args, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = config::load_config(args.config.as_deref());
    let level = config::get_log_level(config.as_ref().ok().and_then(Option::as_ref));
    simple_logger::init_with_level(level)?;
    info!("vm2container starting (version {})", env!("CARGO_PKG_VERSION"));

    let config = config?;
    if config.is_none() {
        warn!(
            "Config file not found at {}. Using defaults.",
            args.config
                .as_deref()
                .unwrap_or(std::path::Path::new(config::DEFAULT_CONFIG_PATH))
                .display()
        );
    }

    match args.command {
        Command::Profile { pids, trace_wait } => {
            let settings = config::resolve(config.as_ref(), args.output_dir, trace_wait);
            debug!("settings: {settings:?}");
            profile::run(&pids, &settings).await
        }
        Command::Dockerize { pid } => {
            let settings = config::resolve(config.as_ref(), args.output_dir, None);
            debug!("settings: {settings:?}");
            dockerize::run(pid, &settings)
        }
    }
}
