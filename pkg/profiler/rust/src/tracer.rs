// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Runs a workload under a syscall tracer.
//!
//! The workload is not exec'd directly. The tracer starts a shell that blocks
//! on a line from its stdin before exec'ing the reconstructed command, so the
//! caller decides when the workload actually begins: after the tracer is
//! attached and after the original process is gone.

pub mod state;

use std::env;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::oneshot;

use crate::errors::Error;
use crate::snapshot::ProcessSnapshot;
use state::TracerState;

pub const DEFAULT_TRACER: &str = "strace";
pub const DEFAULT_SHELL: &str = "/bin/sh";
pub const DEFAULT_SYSCALLS: [&str; 3] = ["openat", "chdir", "mkdir"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracerSettings {
    pub program: PathBuf,
    pub syscalls: Vec<String>,
    pub shell: PathBuf,
    /// How long the tracer must survive before it is considered attached.
    pub grace_period: Duration,
    /// How long the restarted workload is traced.
    pub capture_window: Duration,
    /// How long the original process gets to exit after SIGTERM.
    pub terminate_timeout: Duration,
    /// Run the workload as the user that owned the original process.
    pub run_as_owner: bool,
}

impl Default for TracerSettings {
    fn default() -> Self {
        TracerSettings {
            program: PathBuf::from(DEFAULT_TRACER),
            syscalls: DEFAULT_SYSCALLS.iter().map(|s| s.to_string()).collect(),
            shell: PathBuf::from(DEFAULT_SHELL),
            grace_period: Duration::from_secs(1),
            capture_window: Duration::from_secs(5),
            terminate_timeout: Duration::from_secs(5),
            run_as_owner: true,
        }
    }
}

/// What to start under the tracer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Launch {
    pub command: String,
    pub working_dir: PathBuf,
    pub env: Vec<(String, String)>,
    pub user: Option<String>,
}

impl Launch {
    pub fn from_snapshot(snapshot: &ProcessSnapshot) -> Self {
        let working_dir = if snapshot.working_directory.is_empty() {
            PathBuf::from("/")
        } else {
            PathBuf::from(&snapshot.working_directory)
        };

        Launch {
            command: snapshot.reconstructed_command.clone(),
            working_dir,
            env: snapshot
                .environment_variables
                .iter()
                .filter_map(|entry| entry.split_once('='))
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            user: Some(snapshot.process_user.clone()).filter(|user| !user.is_empty()),
        }
    }
}

/// Held by the caller once the tracer is attached. Opening it lets the
/// workload start.
#[derive(Debug)]
pub struct StartGate {
    stdin: ChildStdin,
    pub tracer_pid: u32,
}

impl StartGate {
    pub async fn open(mut self) -> Result<(), Error> {
        self.stdin.write_all(b"\n").await.map_err(Error::Gate)?;
        self.stdin.flush().await.map_err(Error::Gate)?;
        debug!("start gate of tracer {} opened", self.tracer_pid);
        Ok(())
    }
}

pub struct SupervisedTracer {
    settings: TracerSettings,
    log_path: PathBuf,
    state: TracerState,
    child: Option<Child>,
}

impl SupervisedTracer {
    /// A relative `log_path` is taken relative to our working directory, not
    /// the workload's one the tracer runs in.
    pub fn new(settings: TracerSettings, log_path: PathBuf) -> Self {
        let log_path = match std::path::absolute(&log_path) {
            Ok(absolute) => absolute,
            Err(e) => {
                warn!("could not make {} absolute: {e}", log_path.display());
                log_path
            }
        };
        SupervisedTracer {
            settings,
            log_path,
            state: TracerState::Idle,
            child: None,
        }
    }

    pub fn state(&self) -> TracerState {
        self.state
    }

    fn transition(&mut self, next: TracerState) {
        if self.state.can_transition_to(next) {
            debug!("tracer: {} -> {next}", self.state);
            self.state = next;
        } else {
            warn!("tracer: ignoring transition {} -> {next}", self.state);
        }
    }

    /// Arguments passed to the tracer program.
    pub(crate) fn arguments(&self, launch: &Launch) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            "-e".to_string(),
            format!("trace={}", self.settings.syscalls.join(",")),
            "-o".to_string(),
            self.log_path.to_string_lossy().into_owned(),
        ];
        if let Some(user) = self.run_as(launch) {
            args.push("-u".to_string());
            args.push(user.to_string());
        }
        args.push("--".to_string());
        args.push(self.settings.shell.to_string_lossy().into_owned());
        args.push("-c".to_string());
        args.push(format!("read -r vm2c_gate && exec {}", launch.command));
        args
    }

    /// Switching users needs root, and is pointless when we already run as
    /// the owner.
    fn run_as<'a>(&self, launch: &'a Launch) -> Option<&'a str> {
        let user = launch.user.as_deref().filter(|user| !user.is_empty())?;
        if !self.settings.run_as_owner || uzers::get_current_uid() != 0 {
            return None;
        }
        let current = uzers::get_current_username()?;
        (current.to_string_lossy() != user).then_some(user)
    }

    /// Spawns the tracer and waits for the grace period. The returned gate
    /// must be opened for the workload to start.
    pub async fn start(&mut self, launch: &Launch) -> Result<StartGate, Error> {
        self.transition(TracerState::TracerStarting);

        let program = resolve_program(&self.settings.program);
        let mut cmd = Command::new(&program);
        cmd.args(self.arguments(launch))
            .env_clear()
            .envs(launch.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(&launch.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(source) => {
                self.transition(TracerState::Stopped);
                return Err(Error::TracerStart {
                    program: program.to_string_lossy().into_owned(),
                    source,
                });
            }
        };
        let tracer_pid = child.id().unwrap_or(0);
        info!(
            "tracer started (pid={tracer_pid}, log={})",
            self.log_path.display()
        );

        tokio::time::sleep(self.settings.grace_period).await;

        match child.try_wait() {
            Ok(None) => {}
            Ok(Some(status)) => {
                self.transition(TracerState::Stopped);
                return Err(Error::TracerExited(status));
            }
            Err(e) => {
                self.transition(TracerState::Stopped);
                return Err(Error::Io(e));
            }
        }

        let Some(stdin) = child.stdin.take() else {
            let _ = child.kill().await;
            self.transition(TracerState::Stopped);
            return Err(Error::TracerGone);
        };

        self.child = Some(child);
        self.transition(TracerState::Capturing);
        Ok(StartGate { stdin, tracer_pid })
    }

    /// Keeps tracing until `done` fires (or its sender is dropped), then
    /// stops the tracer.
    pub async fn capture(&mut self, done: oneshot::Receiver<()>) {
        if let Some(child) = self.child.as_mut() {
            tokio::select! {
                _ = done => debug!("capture window closed"),
                status = child.wait() => match status {
                    Ok(status) => warn!("tracer exited before the capture window closed ({status})"),
                    Err(e) => warn!("could not wait on tracer: {e}"),
                },
            }
        }
        self.stop().await;
    }

    /// Kills the tracer. The traced workload is detached and keeps running.
    pub async fn stop(&mut self) {
        if let Some(mut child) = self.child.take()
            && let Err(e) = child.kill().await
        {
            warn!("could not kill tracer: {e}");
        }
        if self.state.is_active() {
            self.transition(TracerState::Stopped);
        }
    }
}

/// Looks a bare program name up in our own `PATH`; the tracer's environment
/// is the workload's and may not have one.
fn resolve_program(program: &Path) -> PathBuf {
    if program.components().count() > 1 {
        return program.to_path_buf();
    }
    env::var_os("PATH")
        .and_then(|paths| {
            env::split_paths(&paths)
                .map(|dir| dir.join(program))
                .find(|candidate| candidate.is_file())
        })
        .unwrap_or_else(|| program.to_path_buf())
}
