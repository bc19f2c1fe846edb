// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("could not prepare profile root {}: {source}", path.display())]
    Prepare { path: PathBuf, source: io::Error },

    #[error("could not archive {}: {source}", path.display())]
    Archive { path: PathBuf, source: io::Error },

    #[error("could not write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
}
