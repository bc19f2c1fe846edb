// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Parsers for the numeric pseudo-files: `/proc/<pid>/{stat,statm,io}` and
//! `/proc/uptime`.

use std::fs;

use crate::errors::Error;
use crate::procfs::{pid_path, root_path};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub state: char,
    pub ppid: i32,
    /// User time, in clock ticks.
    pub utime: u64,
    /// System time, in clock ticks.
    pub stime: u64,
    /// Start time after boot, in clock ticks.
    pub starttime: u64,
}

impl Stat {
    pub fn get(pid: i32) -> Result<Self, Error> {
        let path = pid_path(pid).join("stat");
        let contents = fs::read_to_string(&path).map_err(|e| Error::read(&path, e))?;
        Self::parse(&contents)
    }

    /// The command name in field 2 may contain spaces and parentheses, so
    /// fields are counted from the last closing parenthesis.
    pub fn parse(contents: &str) -> Result<Self, Error> {
        let (_, rest) = contents
            .rsplit_once(')')
            .ok_or_else(|| Error::malformed("stat", "missing command name"))?;
        let mut fields = rest.split_whitespace();

        let state = fields
            .next()
            .and_then(|s| s.chars().next())
            .ok_or_else(|| Error::malformed("stat", "missing state"))?;
        let ppid = parse_field(fields.next(), "ppid")?;
        let utime = parse_field(fields.nth(9), "utime")?; // field 14
        let stime = parse_field(fields.next(), "stime")?; // field 15
        let starttime = parse_field(fields.nth(6), "starttime")?; // field 22

        Ok(Stat {
            state,
            ppid,
            utime,
            stime,
            starttime,
        })
    }
}

fn parse_field<T: std::str::FromStr>(field: Option<&str>, name: &str) -> Result<T, Error> {
    let field = field.ok_or_else(|| Error::malformed("stat", format!("missing {name}")))?;
    field
        .parse()
        .map_err(|_| Error::malformed("stat", format!("bad {name}: {field}")))
}

/// Resident set size, in pages.
pub fn resident_pages(pid: i32) -> Result<u64, Error> {
    let path = pid_path(pid).join("statm");
    let contents = fs::read_to_string(&path).map_err(|e| Error::read(&path, e))?;
    parse_statm(&contents)
}

pub fn parse_statm(contents: &str) -> Result<u64, Error> {
    contents
        .split_whitespace()
        .nth(1)
        .and_then(|resident| resident.parse().ok())
        .ok_or_else(|| Error::malformed("statm", "missing resident field"))
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IoCounters {
    pub read_bytes: u64,
    pub write_bytes: u64,
}

impl IoCounters {
    pub fn get(pid: i32) -> Result<Self, Error> {
        let path = pid_path(pid).join("io");
        let contents = fs::read_to_string(&path).map_err(|e| Error::read(&path, e))?;
        Ok(Self::parse(&contents))
    }

    pub fn parse(contents: &str) -> Self {
        let mut counters = IoCounters::default();
        for line in contents.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let Ok(value) = value.trim().parse() else {
                continue;
            };
            match key {
                "read_bytes" => counters.read_bytes = value,
                "write_bytes" => counters.write_bytes = value,
                _ => {}
            }
        }
        counters
    }
}

/// System uptime in seconds.
pub fn uptime() -> Result<f64, Error> {
    let path = root_path().join("uptime");
    let contents = fs::read_to_string(&path).map_err(|e| Error::read(&path, e))?;
    parse_uptime(&contents)
}

pub fn parse_uptime(contents: &str) -> Result<f64, Error> {
    contents
        .split_whitespace()
        .next()
        .and_then(|uptime| uptime.parse().ok())
        .ok_or_else(|| Error::malformed("uptime", format!("unexpected contents: {contents}")))
}
