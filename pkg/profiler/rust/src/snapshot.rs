// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::cmdline::{self, FlagArgument};
use crate::errors::Error;
use crate::os_release;
use crate::ports::{self, ParsingContext};
use crate::procfs::{self, Cmdline, Exe, Owner};
use crate::resources::ResourceUsage;

/// Everything observed about one process at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    pub pid: i32,
    #[serde(default)]
    pub child_pids: Vec<i32>,
    pub executable_path: String,
    #[serde(default)]
    pub command_line_arguments: Vec<FlagArgument>,
    pub reconstructed_command: String,
    #[serde(default)]
    pub working_directory: String,
    #[serde(default)]
    pub process_user: String,
    #[serde(default)]
    pub process_group: String,
    #[serde(default)]
    pub os_image: String,
    #[serde(default)]
    pub environment_variables: Vec<String>,
    #[serde(default)]
    pub unix_sockets: BTreeSet<String>,
    #[serde(default)]
    pub listening_tcp: BTreeSet<u16>,
    #[serde(default)]
    pub listening_udp: BTreeSet<u16>,
    #[serde(default)]
    pub resource_usage: ResourceUsage,
}

/// A snapshot along with the observations that failed while assembling it.
#[derive(Debug)]
pub struct Assembled {
    pub snapshot: ProcessSnapshot,
    pub errors: Vec<Error>,
}

struct Observations {
    pid: i32,
    errors: Vec<Error>,
}

impl Observations {
    fn take<T: Default>(&mut self, what: &str, result: Result<T, Error>) -> T {
        match result {
            Ok(value) => value,
            Err(e) => {
                warn!("pid {}: could not observe {what}: {e}", self.pid);
                self.errors.push(e);
                T::default()
            }
        }
    }
}

impl ProcessSnapshot {
    /// Reads the state of `pid` from the kernel.
    ///
    /// Only an unreadable executable is fatal. Every other field falls back
    /// to its empty value and the failure is returned in
    /// [`Assembled::errors`].
    pub fn collect(pid: i32) -> Result<Assembled, Error> {
        let exe = match Exe::get(pid) {
            Ok(exe) => exe,
            Err(_) if !procfs::is_running(pid) => return Err(Error::ProcessNotFound(pid)),
            Err(e) => return Err(e),
        };
        let executable_path = exe.0.to_string_lossy().into_owned();

        let mut obs = Observations {
            pid,
            errors: Vec::new(),
        };

        let argv = obs.take("command line", Cmdline::get(pid));
        let reconstructed = cmdline::reconstruct(&executable_path, &argv);

        let working_directory = obs
            .take("working directory", procfs::cwd(pid).map(Some))
            .map(|cwd| cwd.to_string_lossy().into_owned())
            .unwrap_or_default();
        let environment_variables = obs.take("environment", procfs::environ(pid));
        let child_pids = obs.take("child processes", procfs::child_pids(pid));

        let (process_user, process_group) =
            match obs.take("owner", Owner::get(pid).map(Some)) {
                Some(owner) => {
                    let user = owner.user_name().map(Some);
                    let group = owner.group_name().map(Some);
                    (
                        obs.take("user name", user)
                            .unwrap_or_else(|| owner.uid.to_string()),
                        obs.take("group name", group)
                            .unwrap_or_else(|| owner.gid.to_string()),
                    )
                }
                None => (String::new(), String::new()),
            };

        let mut tree = vec![pid];
        tree.extend(&child_pids);

        let sockets = ports::resolve(&mut ParsingContext::new(), &tree);
        let resource_usage = ResourceUsage::aggregate(&tree);

        let snapshot = ProcessSnapshot {
            pid,
            child_pids,
            executable_path,
            command_line_arguments: reconstructed.arguments,
            reconstructed_command: reconstructed.command,
            working_directory,
            process_user,
            process_group,
            os_image: os_release::detect(),
            environment_variables,
            unix_sockets: sockets.unix_sockets,
            listening_tcp: sockets.tcp_ports,
            listening_udp: sockets.udp_ports,
            resource_usage,
        };
        debug!("snapshot of pid {pid}: {snapshot:#?}");

        Ok(Assembled {
            snapshot,
            errors: obs.errors,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), Error> {
        let contents = serde_yaml::to_string(self)?;
        fs::write(path, contents).map_err(|e| Error::write(path, e))
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path).map_err(|e| Error::read(path, e))?;
        Ok(serde_yaml::from_str(&contents)?)
    }
}
