// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

pub mod fd;
pub mod stat;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::errors::Error;
use stat::Stat;

static PROC_ROOT: OnceLock<PathBuf> = OnceLock::new();

pub fn root_path() -> &'static Path {
    PROC_ROOT.get_or_init(|| {
        if let Ok(v) = env::var("HOST_PROC") {
            return v.into();
        }

        "/proc".into()
    })
}

pub(crate) fn pid_path(pid: i32) -> PathBuf {
    root_path().join(pid.to_string())
}

#[derive(Debug, Default)]
pub struct Cmdline {
    cmdline: String,
    separator: char,
}

impl Cmdline {
    pub fn new(mut cmdline: String) -> Self {
        // Command lines from proc can have trailing null bytes if the process
        // has replaced part of it.
        let trim_len = cmdline.trim_end_matches('\0').len();
        cmdline.truncate(trim_len);

        // Daemons that rewrite their argv (nginx, gunicorn -n) leave a single
        // banner string with spaces. Treat it as packed and split it on
        // whitespace instead of null bytes.
        let mut args = cmdline.split_terminator('\0');
        let separator = if let (Some(first), None) = (args.next(), args.next())
            && first.contains(' ')
        {
            ' '
        } else {
            '\0'
        };

        Cmdline { cmdline, separator }
    }

    pub fn get(pid: i32) -> Result<Self, Error> {
        let path = pid_path(pid).join("cmdline");
        let raw = fs::read(&path).map_err(|e| Error::read(&path, e))?;
        Ok(Self::new(String::from_utf8_lossy(&raw).into_owned()))
    }

    pub fn args(&self) -> impl DoubleEndedIterator<Item = &str> {
        let packed = self.separator == ' ';
        self.cmdline
            .split_terminator(self.separator)
            .filter(move |arg| !(packed && arg.is_empty()))
    }

    pub fn is_empty(&self) -> bool {
        self.cmdline.is_empty()
    }
}

impl From<&str> for Cmdline {
    fn from(value: &str) -> Self {
        Self::new(value.to_string())
    }
}

impl From<&[&str]> for Cmdline {
    fn from(value: &[&str]) -> Self {
        Self::new(value.join("\0"))
    }
}

/// Creates a `Cmdline` from a list of arguments, joined with null bytes the
/// way the kernel exposes them in `/proc/<pid>/cmdline`.
#[macro_export]
macro_rules! cmdline {
    () => {
        $crate::procfs::Cmdline::new(String::new())
    };
    ($($arg:expr),* $(,)?) => { $crate::procfs::Cmdline::from(&[$($arg),*][..]) };
}

#[derive(Debug)]
pub struct Exe(pub PathBuf);

impl Exe {
    pub fn get(pid: i32) -> Result<Self, Error> {
        let path = pid_path(pid).join("exe");
        Ok(Exe(fs::read_link(&path).map_err(|e| Error::read(&path, e))?))
    }
}

pub fn cwd(pid: i32) -> Result<PathBuf, Error> {
    let path = pid_path(pid).join("cwd");
    fs::read_link(&path).map_err(|e| Error::read(&path, e))
}

pub fn environ(pid: i32) -> Result<Vec<String>, Error> {
    let path = pid_path(pid).join("environ");
    let raw = fs::read(&path).map_err(|e| Error::read(&path, e))?;
    Ok(parse_environ(&raw))
}

/// Splits a null-separated environment block, keeping only `KEY=VALUE`
/// entries.
pub fn parse_environ(raw: &[u8]) -> Vec<String> {
    raw.split(|b| *b == 0)
        .map(|entry| String::from_utf8_lossy(entry).trim().to_string())
        .filter(|entry| !entry.is_empty() && entry.contains('='))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Owner {
    pub uid: u32,
    pub gid: u32,
}

impl Owner {
    pub fn get(pid: i32) -> Result<Self, Error> {
        let path = pid_path(pid).join("status");
        let contents = fs::read_to_string(&path).map_err(|e| Error::read(&path, e))?;
        Self::parse(&contents)
    }

    /// Reads the real ids from the `Uid:` and `Gid:` lines of a status file.
    pub fn parse(status: &str) -> Result<Self, Error> {
        let real_id = |key: &str| -> Result<u32, Error> {
            let line = status
                .lines()
                .find(|line| line.starts_with(key))
                .ok_or_else(|| Error::malformed("status", format!("missing {key} line")))?;
            line.split_whitespace()
                .nth(1)
                .and_then(|id| id.parse().ok())
                .ok_or_else(|| Error::malformed("status", format!("bad {key} line: {line}")))
        };

        Ok(Owner {
            uid: real_id("Uid:")?,
            gid: real_id("Gid:")?,
        })
    }

    pub fn user_name(&self) -> Result<String, Error> {
        uzers::get_user_by_uid(self.uid)
            .map(|user| user.name().to_string_lossy().into_owned())
            .ok_or(Error::UnknownUser(self.uid))
    }

    pub fn group_name(&self) -> Result<String, Error> {
        uzers::get_group_by_gid(self.gid)
            .map(|group| group.name().to_string_lossy().into_owned())
            .ok_or(Error::UnknownGroup(self.gid))
    }
}

fn all_pids() -> Result<impl Iterator<Item = i32>, Error> {
    let root = root_path();
    let entries = fs::read_dir(root).map_err(|e| Error::read(root, e))?;

    Ok(entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().to_str()?.parse::<i32>().ok()))
}

/// Direct children of `pid`, in ascending order.
pub fn child_pids(pid: i32) -> Result<Vec<i32>, Error> {
    let mut children: Vec<i32> = all_pids()?
        .filter(|candidate| Stat::get(*candidate).is_ok_and(|stat| stat.ppid == pid))
        .collect();
    children.sort_unstable();
    Ok(children)
}

/// PIDs whose executable link resolves to `exe`, in ascending order.
pub fn pids_by_exe(exe: &Path) -> Result<Vec<i32>, Error> {
    let mut pids: Vec<i32> = all_pids()?
        .filter(|candidate| Exe::get(*candidate).is_ok_and(|found| found.0 == exe))
        .collect();
    pids.sort_unstable();
    Ok(pids)
}

/// A process that exited but was not reaped yet still has a stat file, so the
/// state letter is checked too.
pub fn is_running(pid: i32) -> bool {
    Stat::get(pid).is_ok_and(|stat| !matches!(stat.state, 'Z' | 'X' | 'x'))
}
