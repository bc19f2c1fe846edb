// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "vm2container", version)]
#[command(about = "Profiles a running service and packages it as a container image", long_about = None)]
pub struct Args {
    /// YAML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Root of the per-pid output directories
    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Snapshot running processes, restart them under the tracer and record
    /// the files they need
    Profile {
        /// Comma-separated process IDs
        #[arg(required = true, value_delimiter = ',')]
        pids: Vec<i32>,

        /// Seconds to trace each restarted process
        #[arg(long)]
        trace_wait: Option<u64>,
    },
    /// Build the profile tree, its archive and a Dockerfile for a profiled
    /// process
    Dockerize {
        /// Process ID given to `profile`
        pid: i32,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_comma_separated_pids() {
        let args = Args::try_parse_from(["vm2container", "profile", "12,34,56"]).unwrap();
        assert_eq!(
            args.command,
            Command::Profile {
                pids: vec![12, 34, 56],
                trace_wait: None,
            }
        );
        assert_eq!(args.config, None);
    }

    #[test]
    fn test_profile_trace_wait() {
        let args =
            Args::try_parse_from(["vm2container", "profile", "--trace-wait", "10", "42"]).unwrap();
        assert_eq!(
            args.command,
            Command::Profile {
                pids: vec![42],
                trace_wait: Some(10),
            }
        );
    }

    #[test]
    fn test_profile_requires_pids() {
        assert!(Args::try_parse_from(["vm2container", "profile"]).is_err());
        assert!(Args::try_parse_from(["vm2container", "profile", "12,abc"]).is_err());
    }

    #[test]
    fn test_dockerize_with_global_flags() {
        let args = Args::try_parse_from([
            "vm2container",
            "dockerize",
            "42",
            "--output-dir",
            "/var/lib/vm2c",
            "--config",
            "/etc/vm2c.yaml",
        ])
        .unwrap();
        assert_eq!(args.command, Command::Dockerize { pid: 42 });
        assert_eq!(args.output_dir, Some(PathBuf::from("/var/lib/vm2c")));
        assert_eq!(args.config, Some(PathBuf::from("/etc/vm2c.yaml")));
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Args::try_parse_from(["vm2container"]).is_err());
    }
}
