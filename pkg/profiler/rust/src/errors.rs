// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("could not read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("could not write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("malformed {file}: {context}")]
    Malformed { file: &'static str, context: String },

    #[error("could not parse socket info: {context}")]
    SocketParsingError { context: String },

    #[error("no user with uid {0}")]
    UnknownUser(u32),

    #[error("no group with gid {0}")]
    UnknownGroup(u32),

    #[error("process {0} not found")]
    ProcessNotFound(i32),

    #[error("failed to start tracer {program}: {source}")]
    TracerStart { program: String, source: io::Error },

    #[error("tracer exited during startup ({0})")]
    TracerExited(ExitStatus),

    #[error("tracer task ended before signalling readiness")]
    TracerGone,

    #[error("could not release the start gate: {0}")]
    Gate(#[source] io::Error),

    #[error("could not terminate process {pid}: {reason}")]
    Terminate { pid: i32, reason: String },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    pub(crate) fn read(path: impl AsRef<Path>, source: io::Error) -> Self {
        Error::Read {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub(crate) fn write(path: impl AsRef<Path>, source: io::Error) -> Self {
        Error::Write {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub(crate) fn malformed(file: &'static str, context: impl Into<String>) -> Self {
        Error::Malformed {
            file,
            context: context.into(),
        }
    }
}
