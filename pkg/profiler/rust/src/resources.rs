// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::thread;

use log::debug;
use nix::unistd::{SysconfVar, sysconf};
use serde::{Deserialize, Serialize};

use crate::errors::Error;
use crate::procfs::stat::{self, IoCounters, Stat};

const DEFAULT_CLOCK_TICKS: u64 = 100;
const DEFAULT_PAGE_SIZE: u64 = 4096;
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub cpu_cores: f64,
    pub memory_mb: f64,
    pub disk_read_mb: f64,
    pub disk_write_mb: f64,
}

impl ResourceUsage {
    /// Point-in-time usage of a single process. Metrics whose source is
    /// unreadable or malformed are left at zero.
    pub fn of(pid: i32) -> Self {
        let mut usage = ResourceUsage::default();

        match cpu_cores(pid) {
            Ok(cores) => usage.cpu_cores = cores,
            Err(e) => debug!("no cpu usage for pid {pid}: {e}"),
        }

        match stat::resident_pages(pid) {
            Ok(pages) => usage.memory_mb = to_mb(pages.saturating_mul(page_size())),
            Err(e) => debug!("no memory usage for pid {pid}: {e}"),
        }

        match IoCounters::get(pid) {
            Ok(io) => {
                usage.disk_read_mb = to_mb(io.read_bytes);
                usage.disk_write_mb = to_mb(io.write_bytes);
            }
            Err(e) => debug!("no disk usage for pid {pid}: {e}"),
        }

        usage
    }

    /// Sums the usage of every pid, rounded to two decimals.
    pub fn aggregate(pids: &[i32]) -> Self {
        pids.iter()
            .map(|pid| Self::of(*pid))
            .fold(ResourceUsage::default(), |total, usage| total + usage)
            .rounded()
    }

    pub fn rounded(self) -> Self {
        ResourceUsage {
            cpu_cores: round2(self.cpu_cores),
            memory_mb: round2(self.memory_mb),
            disk_read_mb: round2(self.disk_read_mb),
            disk_write_mb: round2(self.disk_write_mb),
        }
    }
}

impl std::ops::Add for ResourceUsage {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        ResourceUsage {
            cpu_cores: self.cpu_cores + other.cpu_cores,
            memory_mb: self.memory_mb + other.memory_mb,
            disk_read_mb: self.disk_read_mb + other.disk_read_mb,
            disk_write_mb: self.disk_write_mb + other.disk_write_mb,
        }
    }
}

/// Inputs of the average cpu usage since the process started.
#[derive(Debug, Clone, Copy)]
pub struct CpuSample {
    pub utime: u64,
    pub stime: u64,
    pub starttime: u64,
    pub clock_ticks: u64,
    pub system_uptime: f64,
    pub cores: usize,
}

impl CpuSample {
    /// Cores used on average over the lifetime of the process. Zero when the
    /// process uptime is not positive.
    pub fn cores_used(&self) -> f64 {
        let ticks = self.clock_ticks.max(1) as f64;
        let process_uptime = self.system_uptime - self.starttime as f64 / ticks;
        if process_uptime <= 0.0 {
            return 0.0;
        }

        let cpu_seconds = (self.utime + self.stime) as f64 / ticks;
        let cores = cpu_seconds / process_uptime * self.cores as f64;
        if cores.is_finite() && cores > 0.0 {
            cores
        } else {
            0.0
        }
    }
}

fn cpu_cores(pid: i32) -> Result<f64, Error> {
    let stat = Stat::get(pid)?;
    let sample = CpuSample {
        utime: stat.utime,
        stime: stat.stime,
        starttime: stat.starttime,
        clock_ticks: clock_ticks(),
        system_uptime: stat::uptime()?,
        cores: thread::available_parallelism().map_or(1, |n| n.get()),
    };
    Ok(sample.cores_used())
}

fn clock_ticks() -> u64 {
    sysconf_or(SysconfVar::CLK_TCK, DEFAULT_CLOCK_TICKS)
}

fn page_size() -> u64 {
    sysconf_or(SysconfVar::PAGE_SIZE, DEFAULT_PAGE_SIZE)
}

fn sysconf_or(var: SysconfVar, default: u64) -> u64 {
    match sysconf(var) {
        Ok(Some(value)) => u64::try_from(value)
            .ok()
            .filter(|value| *value > 0)
            .unwrap_or(default),
        _ => default,
    }
}

fn to_mb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MB
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
