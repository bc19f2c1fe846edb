// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::info;
use vm2c_profiler::{DependencySet, OutputLayout, ProcessSnapshot};

use crate::config::Settings;

/// The Dockerfile copies these out of the profile tree.
const ACCOUNT_FILES: [&str; 2] = ["/etc/passwd", "/etc/group"];

pub fn run(pid: i32, settings: &Settings) -> Result<()> {
    let layout = OutputLayout::new(&settings.output_dir, pid);

    let snapshot_path = layout.snapshot();
    let snapshot = ProcessSnapshot::load(&snapshot_path).with_context(|| {
        format!(
            "no profile for pid {pid}, run `vm2container profile {pid}` first"
        )
    })?;

    let deps_path = layout.dependency_list();
    let mut deps = DependencySet::load(&deps_path)?;
    for file in ACCOUNT_FILES {
        deps.insert(PathBuf::from(file));
    }
    info!(
        "dockerizing pid {pid} from {} ({} dependencies)",
        deps_path.display(),
        deps.len()
    );

    layout.create_dockerize_dir()?;
    let tree = layout.profile_tree();
    vm2c_dockerizer::materialize(&deps, &tree)?;

    let archive = layout.archive();
    vm2c_dockerizer::archive_profile(&tree, &archive)?;

    vm2c_dockerizer::write_dockerfile(
        &snapshot,
        &layout.dockerfile(),
        &file_name(&archive),
        &file_name(&tree),
    )?;

    info!("build context ready in {}", layout.dockerize_dir().display());
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
