// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader, Read};
use std::os::unix::fs::MetadataExt;

use crate::errors::Error;
use crate::procfs;

pub type Ino = u64;
pub type Port = u16;

pub fn get_netns_ino(pid: i32) -> std::io::Result<Ino> {
    let pid_netns_path = procfs::pid_path(pid).join("ns/net");
    let metadata = fs::metadata(pid_netns_path)?;

    Ok(metadata.ino())
}

#[derive(Debug, Default)]
pub struct NamespaceInfo {
    pub tcp_sockets: HashMap<Ino, Port>,
    pub udp_sockets: HashMap<Ino, Port>,
    pub unix_sockets: HashMap<Ino, String>,
}

/// Parse the socket tables visible from the network namespace of `pid`.
pub fn get_netns_info(pid: i32) -> NamespaceInfo {
    let mut info = NamespaceInfo::default();

    let net = procfs::pid_path(pid).join("net");
    let open = |table: &str| fs::File::open(net.join(table)).ok();

    for table in ["tcp", "tcp6"] {
        if let Some(file) = open(table) {
            parse_socket_table(
                file,
                Some(SocketTableState::TCPListen),
                &mut info.tcp_sockets,
            );
        }
    }
    // UDP is connectionless, so every bound socket counts as exposed.
    for table in ["udp", "udp6"] {
        if let Some(file) = open(table) {
            parse_socket_table(file, None, &mut info.udp_sockets);
        }
    }
    if let Some(file) = open("unix") {
        parse_unix_table(file, &mut info.unix_sockets);
    }

    info
}

#[derive(Debug, PartialEq)]
pub enum SocketTableState {
    TCPListen = 0x0A,
}

impl TryFrom<u8> for SocketTableState {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x0A => Ok(Self::TCPListen),
            _ => Err(Error::SocketParsingError {
                context: format!("unknown socket state: 0x{value:02x}"),
            }),
        }
    }
}

/// Calls `handle` for every line of a table, skipping the header.
fn for_each_row(table: impl Read, mut handle: impl FnMut(&str)) {
    const READ_LIMIT: u64 = 4 * 1024 * 1024 * 1024; // 4GiB

    let mut table = BufReader::new(table.take(READ_LIMIT));
    let mut line_buf = String::with_capacity(256);

    // Skip the header line
    if table.read_line(&mut line_buf).is_err() {
        return;
    };

    loop {
        line_buf.clear();
        match table.read_line(&mut line_buf) {
            Ok(0) => break, // EOF
            Ok(_) => handle(&line_buf),
            Err(_) => break,
        }
    }
}

/// Parse a tcp/udp socket table and collect the sockets in the expected
/// state, or every socket when no state is expected.
pub fn parse_socket_table(
    table: impl Read,
    expected_state: Option<SocketTableState>,
    result: &mut HashMap<Ino, Port>,
) {
    for_each_row(table, |line| {
        if let Ok(Some((inode, port))) = parse_socket_line(line, expected_state.as_ref()) {
            result.insert(inode, port);
        }
    });
}

/// Parse the unix socket table and collect the sockets bound to a
/// filesystem path.
pub fn parse_unix_table(table: impl Read, result: &mut HashMap<Ino, String>) {
    for_each_row(table, |line| {
        if let Some((inode, path)) = parse_unix_line(line) {
            result.insert(inode, path);
        }
    });
}

fn get_fields(line: &str) -> Option<(&str, &str, &str)> {
    let mut iter = line.split_whitespace();
    let local_address = iter.nth(1)?; // field 1: local address
    let state = iter.nth(1)?; // field 3: state (skip field 2)
    let inode = iter.nth(5)?; // field 9: inode (skip fields 4-8)
    Some((local_address, state, inode))
}

fn parse_socket_line(
    line: &str,
    expected_state: Option<&SocketTableState>,
) -> Result<Option<(Ino, Port)>, Error> {
    let Some((local_address, state, inode)) = get_fields(line) else {
        return Err(Error::SocketParsingError {
            context: "failed to parse socket line fields".to_string(),
        });
    };

    if let Some(expected_state) = expected_state {
        let Ok(state) = u8::from_str_radix(state, 16) else {
            return Err(Error::SocketParsingError {
                context: "failed to parse socket state".to_string(),
            });
        };

        let Ok(state) = SocketTableState::try_from(state) else {
            return Ok(None); // Unknown state, skip
        };

        if state != *expected_state {
            return Ok(None);
        }
    }

    // Parse local address - format: "IP:PORT"
    let Some(port) = local_address
        .rsplit_once(':')
        .and_then(|(_, port)| u16::from_str_radix(port, 16).ok())
    else {
        return Ok(None);
    };

    // Unbound sockets report port zero.
    if port == 0 {
        return Ok(None);
    }

    let Ok(inode) = inode.parse::<u64>() else {
        return Err(Error::SocketParsingError {
            context: "failed to parse inode".to_string(),
        });
    };

    Ok(Some((inode, port)))
}

fn parse_unix_line(line: &str) -> Option<(Ino, String)> {
    let mut iter = line.split_whitespace();
    let inode = iter.nth(6)?.parse().ok()?; // field 6: inode
    let path = iter.next()?; // field 7: path, absent for unnamed sockets

    // Abstract sockets live outside the filesystem.
    if path.starts_with('@') {
        return None;
    }

    Some((inode, path.to_string()))
}
