// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Turns a raw syscall trace into the set of paths the workload depends on.

use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use log::debug;
use normalize_path::NormalizePath;
use phf::phf_set;
use regex::Regex;

use crate::errors::Error;

/// Well-known system directories. They exist in every base image, so they are
/// never dependencies on their own.
static GENERIC_PATHS: phf::Set<&'static str> = phf_set! {
    "/",
    "/bin",
    "/boot",
    "/boot/efi",
    "/dev",
    "/dev/pts",
    "/dev/shm",
    "/etc",
    "/etc/network",
    "/etc/opt",
    "/etc/ssl",
    "/home",
    "/lib",
    "/lib32",
    "/lib64",
    "/lib/firmware",
    "/lib/x86_64-linux-gnu",
    "/media",
    "/mnt",
    "/opt",
    "/proc",
    "/root",
    "/run",
    "/run/lock",
    "/run/shm",
    "/sbin",
    "/srv",
    "/sys",
    "/tmp",
    "/usr",
    "/usr/bin",
    "/usr/games",
    "/usr/include",
    "/usr/lib",
    "/usr/lib64",
    "/usr/libexec",
    "/usr/lib/locale",
    "/usr/lib/x86_64-linux-gnu",
    "/usr/local",
    "/usr/local/bin",
    "/usr/local/games",
    "/usr/local/lib",
    "/usr/local/lib64",
    "/usr/local/sbin",
    "/usr/sbin",
    "/usr/share",
    "/usr/share/doc",
    "/usr/share/fonts",
    "/usr/share/icons",
    "/usr/share/locale",
    "/usr/share/man",
    "/usr/share/themes",
    "/var",
    "/var/backups",
    "/var/cache",
    "/var/lib",
    "/var/lib/apt",
    "/var/lib/dhcp",
    "/var/lib/dpkg",
    "/var/lib/snapd",
    "/var/lib/systemd",
    "/var/lock",
    "/var/log",
    "/var/mail",
    "/var/opt",
    "/var/run",
    "/var/spool",
    "/var/tmp",
    "/var/www",
    // The restart shell, not the workload.
    "/usr/bin/bash",
    "/usr/sbin/bash",
    "/usr/local/bin/bash",
    "/usr/local/sbin/bash",
};

/// Virtual or volatile trees, never copied into an image.
const EXCLUDED_PREFIXES: [&str; 7] = [
    "/dev/",
    "/proc/",
    "/sys/",
    "/run/",
    "/tmp/",
    "/usr/lib/locale/",
    "/usr/share/locale/",
];

const UNFINISHED: &str = " <unfinished ...>";

/// Lines of failed syscalls name paths that do not exist.
const FAILURE_MARKERS: [&str; 2] = ["(Invalid argument)", "(No such file or directory)"];

#[allow(clippy::expect_used)]
static TRACE_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?:\s|")((?:/|\./)[^" ]+)"#).expect("invalid regex"));

#[allow(clippy::expect_used)]
static CHDIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"chdir\("([^"]+)"\)"#).expect("invalid regex"));

pub fn is_generic(path: &Path) -> bool {
    let Some(path) = path.to_str() else {
        return false;
    };
    let trimmed = match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    };
    GENERIC_PATHS.contains(trimmed)
}

pub fn is_excluded(path: &Path) -> bool {
    let Some(path) = path.to_str() else {
        return false;
    };
    EXCLUDED_PREFIXES
        .iter()
        .any(|prefix| path.starts_with(prefix))
}

fn is_generic_or_excluded(path: &Path) -> bool {
    is_generic(path) || is_excluded(path)
}

fn is_failed(line: &str) -> bool {
    if FAILURE_MARKERS.iter().any(|marker| line.contains(marker)) {
        return true;
    }
    // EEXIST still proves that the path is there.
    line.contains(" = -1 E") && !line.contains(" = -1 EEXIST")
}

/// Absolute paths are normalized too: `$ORIGIN/../lib` rpaths show up as
/// `/usr/bin/../lib/...`, whose `/usr/bin/..` prefix is really `/usr`.
fn resolve(cwd: &Path, path: &str) -> PathBuf {
    cwd.join(path).normalize()
}

/// Splits the pid strace `-f` writes in front of each line. Lines without
/// one all belong to the same process.
fn split_pid(line: &str) -> (&str, &str) {
    match line.split_once(char::is_whitespace) {
        Some((pid, rest)) if !pid.is_empty() && pid.bytes().all(|b| b.is_ascii_digit()) => {
            (pid, rest.trim_start())
        }
        _ => ("", line),
    }
}

/// Joins syscalls that strace split because another thread or process
/// interleaved. The call and its result are only judged once both halves
/// are known.
#[derive(Debug, Default)]
struct Interleaved {
    pending: HashMap<String, String>,
}

impl Interleaved {
    /// The complete syscall line, or `None` while the call is still
    /// unfinished.
    fn complete<'a>(&mut self, line: &'a str) -> Option<Cow<'a, str>> {
        let (pid, call) = split_pid(line);

        if let Some(start) = call.strip_suffix(UNFINISHED) {
            self.pending.insert(pid.to_string(), start.to_string());
            return None;
        }

        if let Some(rest) = call.strip_prefix("<... ")
            && let Some((_, result)) = rest.split_once(" resumed>")
        {
            let start = self.pending.remove(pid)?;
            return Some(Cow::Owned(format!("{pid} {start}{result}")));
        }

        Some(Cow::Borrowed(line))
    }

    fn unresolved(&self) -> usize {
        self.pending.len()
    }
}

/// The shallowest ancestor of `path` (or `path` itself) that is neither
/// generic nor excluded. Paths without such an ancestor are kept whole.
pub fn collapse(path: &Path) -> PathBuf {
    let mut prefix = PathBuf::new();
    for component in path.components() {
        prefix.push(component);
        if !is_generic_or_excluded(&prefix) {
            return prefix;
        }
    }
    path.to_path_buf()
}

/// Reads a raw trace log and returns the collapsed dependency set.
///
/// `initial_cwd` seeds the simulated working directory used to resolve `./`
/// paths, and `executable` is always part of the result.
pub fn filter(
    reader: impl BufRead,
    initial_cwd: &Path,
    executable: &Path,
) -> io::Result<DependencySet> {
    let mut cwd = initial_cwd.to_path_buf();
    let mut seen = HashSet::new();
    let mut retained = Vec::new();
    let mut interleaved = Interleaved::default();

    for line in reader.split(b'\n') {
        let line = line?;
        let line = String::from_utf8_lossy(&line);
        let Some(line) = interleaved.complete(&line) else {
            continue;
        };

        if is_failed(&line) {
            continue;
        }

        if let Some(dir) = CHDIR.captures(&line).and_then(|c| c.get(1)) {
            cwd = resolve(&cwd, dir.as_str());
        }

        let Some(token) = TRACE_PATH.captures(&line).and_then(|c| c.get(1)) else {
            continue;
        };
        let path = resolve(&cwd, token.as_str());

        if !seen.insert(path.clone()) || is_generic_or_excluded(&path) {
            continue;
        }
        retained.push(path);
    }

    if interleaved.unresolved() > 0 {
        debug!(
            "{} syscalls never resumed before the trace ended",
            interleaved.unresolved()
        );
    }
    debug!(
        "{} distinct paths retained from trace of {}",
        retained.len(),
        executable.display()
    );
    retained.push(executable.to_path_buf());

    Ok(retained.iter().map(|path| collapse(path)).collect())
}

pub fn filter_file(
    raw_log: &Path,
    initial_cwd: &Path,
    executable: &Path,
) -> Result<DependencySet, Error> {
    let file = File::open(raw_log).map_err(|e| Error::read(raw_log, e))?;
    filter(BufReader::new(file), initial_cwd, executable).map_err(|e| Error::read(raw_log, e))
}

/// Sorted paths where no member is a descendant of another member.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DependencySet(BTreeSet<PathBuf>);

impl DependencySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.0.iter().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.0.contains(path)
    }

    /// Adds `path` unless an ancestor is already a member. Members below
    /// `path` are dropped.
    pub fn insert(&mut self, path: PathBuf) -> bool {
        if path.ancestors().any(|ancestor| self.0.contains(ancestor)) {
            return false;
        }
        self.0.retain(|member| !member.starts_with(&path));
        self.0.insert(path)
    }

    pub fn merge(&mut self, other: &DependencySet) {
        for path in other.iter() {
            self.insert(path.to_path_buf());
        }
    }

    /// One path per line.
    pub fn write_to(&self, mut writer: impl Write) -> io::Result<()> {
        for path in self.iter() {
            writeln!(writer, "{}", path.display())?;
        }
        writer.flush()
    }

    /// Reads one path per line; blank lines, `#` comments and relative paths
    /// are ignored.
    pub fn read_from(reader: impl BufRead) -> io::Result<Self> {
        let mut set = DependencySet::new();
        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || !line.starts_with('/') {
                continue;
            }
            set.insert(PathBuf::from(line));
        }
        Ok(set)
    }

    pub fn save(&self, path: &Path) -> Result<(), Error> {
        let file = File::create(path).map_err(|e| Error::write(path, e))?;
        self.write_to(BufWriter::new(file))
            .map_err(|e| Error::write(path, e))
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        let file = File::open(path).map_err(|e| Error::read(path, e))?;
        Self::read_from(BufReader::new(file)).map_err(|e| Error::read(path, e))
    }
}

impl FromIterator<PathBuf> for DependencySet {
    fn from_iter<I: IntoIterator<Item = PathBuf>>(iter: I) -> Self {
        let mut set = DependencySet::new();
        for path in iter {
            set.insert(path);
        }
        set
    }
}
