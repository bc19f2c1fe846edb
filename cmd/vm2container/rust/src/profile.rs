// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::path::Path;

use anyhow::{Context, Result};
use log::{info, warn};
use vm2c_profiler::{
    Assembled, DependencySet, OutputLayout, ProcessSnapshot, filter_file, restart_under_trace,
};

use crate::config::Settings;

/// Profiles every pid in turn, then merges their dependency sets into the
/// profile directory of the last one.
pub async fn run(pids: &[i32], settings: &Settings) -> Result<()> {
    let mut merged = DependencySet::new();
    for &pid in pids {
        let deps = profile_pid(pid, settings)
            .await
            .with_context(|| format!("failed to profile pid {pid}"))?;
        merged.merge(&deps);
    }

    if let Some(&last) = pids.last() {
        let path = OutputLayout::new(&settings.output_dir, last).merged_trace();
        merged.save(&path)?;
        info!(
            "merged {} dependencies into {}",
            merged.len(),
            path.display()
        );
    }
    Ok(())
}

async fn profile_pid(pid: i32, settings: &Settings) -> Result<DependencySet> {
    let layout = OutputLayout::new(&settings.output_dir, pid);
    layout.create_profile_dir()?;

    let Assembled { snapshot, errors } = ProcessSnapshot::collect(pid)?;
    if !errors.is_empty() {
        warn!(
            "pid {pid}: {} observation(s) failed, the snapshot is partial",
            errors.len()
        );
    }
    info!(
        "pid {pid}: {} as {}:{} in {}",
        snapshot.reconstructed_command,
        snapshot.process_user,
        snapshot.process_group,
        snapshot.working_directory
    );
    snapshot.save(&layout.snapshot())?;

    let capture = restart_under_trace(&snapshot, &settings.tracer, &layout.raw_trace()).await?;
    match capture.pid {
        Some(new_pid) => info!("pid {pid} was restarted as pid {new_pid}"),
        None => warn!("pid {pid} was restarted but the new process was not found"),
    }

    let deps = filter_file(
        &layout.raw_trace(),
        Path::new(&snapshot.working_directory),
        Path::new(&snapshot.executable_path),
    )?;
    deps.save(&layout.filtered_trace())?;
    info!(
        "pid {pid}: {} dependencies written to {}",
        deps.len(),
        layout.filtered_trace().display()
    );
    Ok(deps)
}
