// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Replaces a running process with a traced copy of itself.
//!
//! The tracer lives in its own task. It reports readiness over one oneshot
//! channel and is told to stop over another, so the original process is only
//! terminated once the tracer is attached, and the workload is only released
//! once the original process is gone.

use std::fs;
use std::os::unix::fs as unix_fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info, warn};
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::sync::oneshot;
use tokio::time::{Instant, sleep, sleep_until, timeout};

use crate::errors::Error;
use crate::procfs::{self, Exe, stat::Stat};
use crate::snapshot::ProcessSnapshot;
use crate::tracer::{Launch, StartGate, SupervisedTracer, TracerSettings};

const SIGKILL_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// The restarted workload as found after the gate was opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    pub tracer_pid: u32,
    pub pid: Option<i32>,
    pub child_pids: Vec<i32>,
}

/// Terminates `snapshot.pid` and starts its reconstructed command again under
/// the tracer, writing the raw trace to `log_path`.
///
/// Returns once the capture window has elapsed and the tracer is stopped.
/// The restarted workload keeps running.
pub async fn restart_under_trace(
    snapshot: &ProcessSnapshot,
    settings: &TracerSettings,
    log_path: &Path,
) -> Result<Capture, Error> {
    prepare_socket_dirs(snapshot);

    let launch = Launch::from_snapshot(snapshot);
    let (ready_tx, ready_rx) = oneshot::channel::<Result<StartGate, Error>>();
    let (done_tx, done_rx) = oneshot::channel::<()>();

    let mut tracer = SupervisedTracer::new(settings.clone(), log_path.to_path_buf());
    let task = tokio::spawn(async move {
        match tracer.start(&launch).await {
            Ok(gate) => {
                if ready_tx.send(Ok(gate)).is_err() {
                    tracer.stop().await;
                } else {
                    tracer.capture(done_rx).await;
                }
            }
            Err(e) => {
                let _ = ready_tx.send(Err(e));
            }
        }
        tracer.state()
    });

    let gate = match ready_rx.await {
        Ok(Ok(gate)) => gate,
        Ok(Err(e)) => {
            let _ = task.await;
            return Err(e);
        }
        Err(_) => return Err(Error::TracerGone),
    };
    info!(
        "tracer {} attached, replacing pid {}",
        gate.tracer_pid, snapshot.pid
    );

    let result = release(snapshot, settings, gate).await;
    if let Ok((_, deadline)) = &result {
        sleep_until(*deadline).await;
    }

    // A dropped sender stops the tracer too.
    let _ = done_tx.send(());
    match task.await {
        Ok(state) => debug!("tracer task finished ({state})"),
        Err(e) => warn!("tracer task failed: {e}"),
    }

    result.map(|(capture, _)| capture)
}

/// Stops the original, opens the gate and finds the new workload. Also
/// returns when the capture window closes.
async fn release(
    snapshot: &ProcessSnapshot,
    settings: &TracerSettings,
    gate: StartGate,
) -> Result<(Capture, Instant), Error> {
    terminate(snapshot.pid, settings.terminate_timeout).await?;

    let tracer_pid = gate.tracer_pid;
    gate.open().await?;
    let deadline = Instant::now() + settings.capture_window;

    sleep(settings.grace_period.min(settings.capture_window)).await;
    let exe = PathBuf::from(&snapshot.executable_path);
    let pid = find_restarted(&exe, snapshot.pid, tracer_pid);
    let child_pids = pid
        .map(|pid| procfs::child_pids(pid).unwrap_or_default())
        .unwrap_or_default();
    match pid {
        Some(pid) => info!("restarted as pid {pid} (children: {child_pids:?})"),
        None => warn!("could not find the restarted {}", exe.display()),
    }

    Ok((
        Capture {
            tracer_pid,
            pid,
            child_pids,
        },
        deadline,
    ))
}

/// The tracer execs the workload in its first child, unless the workload
/// daemonized, in which case the oldest process running `exe` whose parent
/// is not itself running `exe` is taken.
fn find_restarted(exe: &Path, original: i32, tracer_pid: u32) -> Option<i32> {
    let tracer_children = i32::try_from(tracer_pid)
        .ok()
        .and_then(|pid| procfs::child_pids(pid).ok())
        .unwrap_or_default();

    if let Some(pid) = tracer_children
        .iter()
        .copied()
        .find(|pid| Exe::get(*pid).is_ok_and(|found| found.0 == exe))
    {
        return Some(pid);
    }

    let candidates: Vec<i32> = procfs::pids_by_exe(exe)
        .unwrap_or_default()
        .into_iter()
        .filter(|pid| *pid != original)
        .collect();
    candidates
        .iter()
        .copied()
        .find(|pid| Stat::get(*pid).is_ok_and(|stat| !candidates.contains(&stat.ppid)))
        .or_else(|| tracer_children.first().copied())
}

/// SIGTERM, wait up to `stop_timeout`, then SIGKILL. Fails if the process
/// survives both.
pub async fn terminate(pid: i32, stop_timeout: Duration) -> Result<(), Error> {
    let target = Pid::from_raw(pid);

    match signal::kill(target, Signal::SIGTERM) {
        Ok(()) => info!("[{pid}] sending SIGTERM"),
        Err(Errno::ESRCH) => return Ok(()),
        Err(e) => {
            return Err(Error::Terminate {
                pid,
                reason: format!("SIGTERM: {e}"),
            });
        }
    }
    if wait_for_exit(pid, stop_timeout).await {
        return Ok(());
    }

    warn!(
        "[{pid}] stop timeout ({}s) reached, sending SIGKILL",
        stop_timeout.as_secs()
    );
    match signal::kill(target, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => {
            return Err(Error::Terminate {
                pid,
                reason: format!("SIGKILL: {e}"),
            });
        }
    }
    if wait_for_exit(pid, SIGKILL_TIMEOUT).await {
        Ok(())
    } else {
        Err(Error::Terminate {
            pid,
            reason: "still running after SIGKILL".to_string(),
        })
    }
}

async fn wait_for_exit(pid: i32, limit: Duration) -> bool {
    let poll = async {
        while procfs::is_running(pid) {
            sleep(POLL_INTERVAL).await;
        }
    };
    timeout(limit, poll).await.is_ok()
}

/// Daemons often refuse to start when the directory of their unix socket is
/// gone, e.g. under a tmpfs `/run` that was cleaned when they stopped.
pub fn prepare_socket_dirs(snapshot: &ProcessSnapshot) {
    let owner = owner_ids(snapshot);

    for socket in &snapshot.unix_sockets {
        let Some(dir) = Path::new(socket).parent() else {
            continue;
        };
        if dir.as_os_str().is_empty() || dir.exists() {
            continue;
        }
        if let Err(e) = fs::create_dir_all(dir) {
            warn!("could not create socket directory {}: {e}", dir.display());
            continue;
        }
        if let Some((uid, gid)) = owner
            && let Err(e) = unix_fs::chown(dir, Some(uid), Some(gid))
        {
            warn!("could not chown socket directory {}: {e}", dir.display());
        }
        debug!("created socket directory {}", dir.display());
    }
}

fn owner_ids(snapshot: &ProcessSnapshot) -> Option<(u32, u32)> {
    let lookup_uid = |name: &str| {
        uzers::get_user_by_name(name)
            .map(|user| user.uid())
            .or_else(|| name.parse().ok())
    };
    let lookup_gid = |name: &str| {
        uzers::get_group_by_name(name)
            .map(|group| group.gid())
            .or_else(|| name.parse().ok())
    };
    Some((
        lookup_uid(&snapshot.process_user)?,
        lookup_gid(&snapshot.process_group)?,
    ))
}
