// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Per-pid output directories:
//!
//! ```text
//! <root>/<pid>/profile/{snapshot.yaml,strace.log,strace_filtered.log,strace_merged.log}
//! <root>/<pid>/dockerize/{profile/,profile.tar.gz,Dockerfile}
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::Error;

pub const DEFAULT_OUTPUT_DIR: &str = "output";

const PROFILE_DIR: &str = "profile";
const DOCKERIZE_DIR: &str = "dockerize";
const SNAPSHOT_FILE: &str = "snapshot.yaml";
const RAW_TRACE_FILE: &str = "strace.log";
const FILTERED_TRACE_FILE: &str = "strace_filtered.log";
const MERGED_TRACE_FILE: &str = "strace_merged.log";
const PROFILE_TREE_DIR: &str = "profile";
const ARCHIVE_FILE: &str = "profile.tar.gz";
const DOCKERFILE: &str = "Dockerfile";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    pid_dir: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl AsRef<Path>, pid: i32) -> Self {
        OutputLayout {
            pid_dir: root.as_ref().join(pid.to_string()),
        }
    }

    pub fn profile_dir(&self) -> PathBuf {
        self.pid_dir.join(PROFILE_DIR)
    }

    pub fn snapshot(&self) -> PathBuf {
        self.profile_dir().join(SNAPSHOT_FILE)
    }

    pub fn raw_trace(&self) -> PathBuf {
        self.profile_dir().join(RAW_TRACE_FILE)
    }

    pub fn filtered_trace(&self) -> PathBuf {
        self.profile_dir().join(FILTERED_TRACE_FILE)
    }

    pub fn merged_trace(&self) -> PathBuf {
        self.profile_dir().join(MERGED_TRACE_FILE)
    }

    /// The merged set when several pids were profiled together, the
    /// filtered one otherwise.
    pub fn dependency_list(&self) -> PathBuf {
        let merged = self.merged_trace();
        if merged.exists() {
            merged
        } else {
            self.filtered_trace()
        }
    }

    pub fn dockerize_dir(&self) -> PathBuf {
        self.pid_dir.join(DOCKERIZE_DIR)
    }

    pub fn profile_tree(&self) -> PathBuf {
        self.dockerize_dir().join(PROFILE_TREE_DIR)
    }

    pub fn archive(&self) -> PathBuf {
        self.dockerize_dir().join(ARCHIVE_FILE)
    }

    pub fn dockerfile(&self) -> PathBuf {
        self.dockerize_dir().join(DOCKERFILE)
    }

    pub fn create_profile_dir(&self) -> Result<(), Error> {
        let dir = self.profile_dir();
        fs::create_dir_all(&dir).map_err(|e| Error::write(&dir, e))
    }

    pub fn create_dockerize_dir(&self) -> Result<(), Error> {
        let dir = self.dockerize_dir();
        fs::create_dir_all(&dir).map_err(|e| Error::write(&dir, e))
    }
}
