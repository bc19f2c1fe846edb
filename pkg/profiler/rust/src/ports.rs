// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::collections::{BTreeSet, HashMap};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::procfs::fd;
use crate::sockets::{self, Ino, NamespaceInfo, Port};

/// Sockets owned by a process tree.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposedSockets {
    pub unix_sockets: BTreeSet<String>,
    pub tcp_ports: BTreeSet<Port>,
    pub udp_ports: BTreeSet<Port>,
}

impl ExposedSockets {
    /// Records the sockets among `inodes` found in the namespace tables.
    /// Sockets in the tables but not held by the process are ignored.
    pub fn collect(&mut self, inodes: &[Ino], netns_info: &NamespaceInfo) {
        for inode in inodes {
            if let Some(port) = netns_info.tcp_sockets.get(inode).copied() {
                self.tcp_ports.insert(port);
            } else if let Some(port) = netns_info.udp_sockets.get(inode).copied() {
                self.udp_ports.insert(port);
            } else if let Some(path) = netns_info.unix_sockets.get(inode) {
                self.unix_sockets.insert(path.clone());
            }
        }
    }
}

#[derive(Default)]
pub struct ParsingContext {
    pub netns_info: HashMap<Ino, NamespaceInfo>,
}

impl ParsingContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Listening ports and unix sockets held by any of `pids`.
pub fn resolve(context: &mut ParsingContext, pids: &[i32]) -> ExposedSockets {
    let mut exposed = ExposedSockets::default();

    for &pid in pids {
        let inodes = match fd::socket_inodes(pid) {
            Ok(inodes) => inodes,
            Err(e) => {
                debug!("skipping sockets of pid {pid}: {e}");
                continue;
            }
        };
        if inodes.is_empty() {
            continue;
        }

        let Ok(netns_ino) = sockets::get_netns_ino(pid) else {
            continue;
        };

        // Namespaces can be shared between processes, so each one is only
        // parsed once.
        let netns_info = context
            .netns_info
            .entry(netns_ino)
            .or_insert_with(|| sockets::get_netns_info(pid));

        exposed.collect(&inodes, netns_info);
    }

    exposed
}
