// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! The fd module contains helpers to inspect the descriptors located in
//! /proc/<pid>/fd

use std::fs::{read_dir, read_link};
use std::path::Path;

use log::trace;

use crate::errors::Error;
use crate::procfs::pid_path;

/// Inodes of every socket the process holds open.
pub fn socket_inodes(pid: i32) -> Result<Vec<u64>, Error> {
    let fd_path = pid_path(pid).join("fd");

    let sockets: Vec<u64> = read_dir(&fd_path)
        .map_err(|e| Error::read(&fd_path, e))?
        .filter_map(|entry_result| entry_result.ok())
        .filter_map(|entry| read_link(entry.path()).ok())
        .filter_map(|link| is_socket(&link))
        .collect();

    trace!("pid {pid} holds {} socket descriptors", sockets.len());
    Ok(sockets)
}

fn is_socket(link: &Path) -> Option<u64> {
    const SOCKET_PREFIX: &str = "socket:[";

    let link_str = link.to_str()?;
    let link_str = link_str.strip_prefix(SOCKET_PREFIX)?;

    link_str.strip_suffix(']')?.parse().ok()
}
