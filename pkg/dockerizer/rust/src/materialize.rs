// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Mirrors dependency paths into a profile root.
//!
//! Every source path lands at `<root>/<path>`. Symlinks are recreated rather
//! than followed, and their targets are copied as well. Sockets, FIFOs and
//! device nodes are skipped.

use std::collections::HashSet;
use std::fs::{self, Metadata, Permissions};
use std::io;
use std::os::unix::fs::{self as unix_fs, MetadataExt, PermissionsExt};
use std::path::{Component, Path, PathBuf};

use log::{debug, info, warn};
use normalize_path::NormalizePath;
use vm2c_profiler::DependencySet;

use crate::errors::Error;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MaterializeReport {
    pub copied: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Wipes `root` and copies every path of `deps` below it.
pub fn materialize(deps: &DependencySet, root: &Path) -> Result<MaterializeReport, Error> {
    let mut materializer = Materializer::new(root);
    materializer.prepare()?;
    for path in deps.iter() {
        materializer.copy(path);
    }

    let report = materializer.finish();
    info!(
        "materialized {} entries into {} ({} skipped, {} failed)",
        report.copied,
        root.display(),
        report.skipped,
        report.failed
    );
    Ok(report)
}

pub struct Materializer {
    root: PathBuf,
    /// Source paths already handled. Bounds the work on symlink cycles.
    visited: HashSet<PathBuf>,
    report: MaterializeReport,
}

impl Materializer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Materializer {
            root: root.into(),
            visited: HashSet::new(),
            report: MaterializeReport::default(),
        }
    }

    /// Removes whatever a previous run left in the root.
    pub fn prepare(&self) -> Result<(), Error> {
        let prepare_err = |source| Error::Prepare {
            path: self.root.clone(),
            source,
        };

        match fs::symlink_metadata(&self.root) {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(&self.root).map_err(prepare_err)?,
            Ok(_) => fs::remove_file(&self.root).map_err(prepare_err)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(prepare_err(e)),
        }
        fs::create_dir_all(&self.root).map_err(prepare_err)
    }

    /// Copies `src` and everything it needs. Failures are logged and counted.
    pub fn copy(&mut self, src: &Path) {
        if let Err(e) = self.copy_entry(src) {
            warn!("failed to copy {}: {e}", src.display());
            self.report.failed += 1;
        }
    }

    pub fn finish(self) -> MaterializeReport {
        self.report
    }

    fn destination(&self, src: &Path) -> PathBuf {
        let relative: PathBuf = src
            .components()
            .filter(|c| matches!(c, Component::Normal(_)))
            .collect();
        self.root.join(relative)
    }

    /// Refuses destinations reached through a mirrored symlink that points
    /// outside of the root. Writing through it would land on the host.
    fn check_contained(&self, dst: &Path) -> io::Result<()> {
        let relative = dst
            .strip_prefix(&self.root)
            .map_err(|_| io::Error::other("destination outside of the profile root"))?;

        let mut current = self.root.clone();
        let mut components = relative.components().peekable();
        while let Some(component) = components.next() {
            if components.peek().is_none() {
                break;
            }
            current.push(component);

            let meta = match fs::symlink_metadata(&current) {
                Ok(meta) => meta,
                Err(e) if e.kind() == io::ErrorKind::NotFound => break,
                Err(e) => return Err(e),
            };
            if !meta.file_type().is_symlink() {
                continue;
            }
            let target = fs::read_link(&current)?;
            let inside = target.is_relative()
                && current
                    .parent()
                    .is_some_and(|dir| dir.join(&target).normalize().starts_with(&self.root));
            if !inside {
                return Err(io::Error::other(format!(
                    "{} leads outside of the profile root",
                    current.display()
                )));
            }
        }
        Ok(())
    }

    fn copy_entry(&mut self, src: &Path) -> io::Result<()> {
        if !src.is_absolute() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "not an absolute path",
            ));
        }
        let src = src.normalize();
        if !self.visited.insert(src.clone()) {
            return Ok(());
        }

        let meta = fs::symlink_metadata(&src)?;
        let dst = self.destination(&src);
        let file_type = meta.file_type();

        if file_type.is_symlink() {
            self.copy_symlink(&src, &dst, &meta)
        } else if file_type.is_dir() {
            self.copy_dir(&src, &dst, &meta)
        } else if file_type.is_file() {
            self.copy_file(&src, &dst, &meta)
        } else {
            debug!("skipping special file {}", src.display());
            self.report.skipped += 1;
            Ok(())
        }
    }

    fn copy_symlink(&mut self, src: &Path, dst: &Path, meta: &Metadata) -> io::Result<()> {
        let target = fs::read_link(src)?;
        let resolved = match src.parent() {
            Some(dir) if target.is_relative() => dir.join(&target).normalize(),
            _ => target.normalize(),
        };

        // A link to itself or to one of its ancestors has nothing new to copy.
        if src.starts_with(&resolved) {
            debug!(
                "{} points at its own ancestor {}",
                src.display(),
                resolved.display()
            );
        } else {
            self.copy(&resolved);
        }

        self.check_contained(dst)?;
        create_parent(dst)?;
        unix_fs::symlink(&target, dst)?;
        set_owner(dst, meta, true);
        self.report.copied += 1;
        Ok(())
    }

    fn copy_dir(&mut self, src: &Path, dst: &Path, meta: &Metadata) -> io::Result<()> {
        self.check_contained(dst)?;
        fs::create_dir_all(dst)?;
        self.report.copied += 1;

        let mut entries: Vec<PathBuf> = Vec::new();
        for entry in fs::read_dir(src)? {
            match entry {
                Ok(entry) => entries.push(entry.path()),
                Err(e) => {
                    warn!("failed to list {}: {e}", src.display());
                    self.report.failed += 1;
                }
            }
        }
        entries.sort();
        for entry in entries {
            self.copy(&entry);
        }

        // Applied last so read-only directories can still be filled.
        set_owner(dst, meta, false);
        fs::set_permissions(dst, Permissions::from_mode(meta.mode() & 0o7777))?;
        Ok(())
    }

    fn copy_file(&mut self, src: &Path, dst: &Path, meta: &Metadata) -> io::Result<()> {
        self.check_contained(dst)?;
        create_parent(dst)?;
        fs::copy(src, dst)?;
        // chown clears setuid bits, so the mode goes second.
        set_owner(dst, meta, false);
        fs::set_permissions(dst, Permissions::from_mode(meta.mode() & 0o7777))?;
        self.report.copied += 1;
        Ok(())
    }
}

fn create_parent(dst: &Path) -> io::Result<()> {
    match dst.parent() {
        Some(parent) => fs::create_dir_all(parent),
        None => Ok(()),
    }
}

/// Only root can give files away, so a failure here is expected when
/// running unprivileged.
fn set_owner(dst: &Path, meta: &Metadata, link: bool) {
    let result = if link {
        unix_fs::lchown(dst, Some(meta.uid()), Some(meta.gid()))
    } else {
        unix_fs::chown(dst, Some(meta.uid()), Some(meta.gid()))
    };
    if let Err(e) = result {
        debug!("could not set owner of {}: {e}", dst.display());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixListener;

    struct Fixture {
        source: tempfile::TempDir,
        profile: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Fixture {
                source: tempfile::tempdir().unwrap(),
                profile: tempfile::tempdir().unwrap(),
            }
        }

        fn src(&self, rel: &str) -> PathBuf {
            self.source.path().join(rel)
        }

        fn root(&self) -> PathBuf {
            self.profile.path().join("profile")
        }

        fn mirrored(&self, rel: &str) -> PathBuf {
            Materializer::new(self.root()).destination(&self.src(rel))
        }

        fn deps(&self, rels: &[&str]) -> DependencySet {
            rels.iter().map(|rel| self.src(rel)).collect()
        }
    }

    #[test]
    fn copies_files_and_modes() {
        let fx = Fixture::new();
        fs::create_dir_all(fx.src("etc/app")).unwrap();
        fs::write(fx.src("etc/app/app.conf"), "listen 80;\n").unwrap();
        fs::set_permissions(fx.src("etc/app/app.conf"), Permissions::from_mode(0o640)).unwrap();
        fs::write(fx.src("bin"), "#!/bin/sh\n").unwrap();
        fs::set_permissions(fx.src("bin"), Permissions::from_mode(0o755)).unwrap();

        let report = materialize(&fx.deps(&["etc/app", "bin"]), &fx.root()).unwrap();
        assert_eq!(report.failed, 0);
        assert_eq!(report.copied, 3);

        let conf = fx.mirrored("etc/app/app.conf");
        assert_eq!(fs::read_to_string(&conf).unwrap(), "listen 80;\n");
        assert_eq!(fs::metadata(&conf).unwrap().mode() & 0o777, 0o640);
        assert_eq!(
            fs::metadata(fx.mirrored("bin")).unwrap().mode() & 0o777,
            0o755
        );
    }

    #[test]
    fn read_only_directories_are_filled() {
        let fx = Fixture::new();
        fs::create_dir_all(fx.src("data")).unwrap();
        fs::write(fx.src("data/a"), "a").unwrap();
        fs::write(fx.src("data/b"), "b").unwrap();
        fs::set_permissions(fx.src("data"), Permissions::from_mode(0o555)).unwrap();

        let report = materialize(&fx.deps(&["data"]), &fx.root()).unwrap();
        assert_eq!(report.failed, 0);
        assert!(fx.mirrored("data/a").exists());
        assert!(fx.mirrored("data/b").exists());
        assert_eq!(
            fs::metadata(fx.mirrored("data")).unwrap().mode() & 0o777,
            0o555
        );

        // Let the tempdirs clean up.
        fs::set_permissions(fx.src("data"), Permissions::from_mode(0o755)).unwrap();
        fs::set_permissions(fx.mirrored("data"), Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn symlinks_are_recreated_with_their_targets() {
        let fx = Fixture::new();
        fs::create_dir_all(fx.src("lib")).unwrap();
        fs::write(fx.src("lib/libfoo.so.1.2"), "elf").unwrap();
        unix_fs::symlink("libfoo.so.1.2", fx.src("lib/libfoo.so.1")).unwrap();

        let report = materialize(&fx.deps(&["lib/libfoo.so.1"]), &fx.root()).unwrap();
        assert_eq!(report.copied, 2);

        let link = fx.mirrored("lib/libfoo.so.1");
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_link(&link).unwrap(), PathBuf::from("libfoo.so.1.2"));
        assert_eq!(
            fs::read_to_string(fx.mirrored("lib/libfoo.so.1.2")).unwrap(),
            "elf"
        );
    }

    #[test]
    fn symlink_cycle_terminates() {
        let fx = Fixture::new();
        unix_fs::symlink(fx.src("b"), fx.src("a")).unwrap();
        unix_fs::symlink(fx.src("a"), fx.src("b")).unwrap();

        let mut materializer = Materializer::new(fx.root());
        materializer.prepare().unwrap();
        materializer.copy(&fx.src("a"));
        materializer.copy(&fx.src("b"));
        let report = materializer.finish();

        assert_eq!(report.copied, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(fs::read_link(fx.mirrored("a")).unwrap(), fx.src("b"));
        assert_eq!(fs::read_link(fx.mirrored("b")).unwrap(), fx.src("a"));
    }

    #[test]
    fn link_to_ancestor_is_not_followed() {
        let fx = Fixture::new();
        fs::create_dir_all(fx.src("srv/www")).unwrap();
        fs::write(fx.src("srv/www/index.html"), "<html/>").unwrap();
        unix_fs::symlink("..", fx.src("srv/www/up")).unwrap();

        let report = materialize(&fx.deps(&["srv/www/up"]), &fx.root()).unwrap();
        assert_eq!(report.copied, 1);
        assert!(!fx.mirrored("srv/www/index.html").exists());
        assert_eq!(
            fs::read_link(fx.mirrored("srv/www/up")).unwrap(),
            PathBuf::from("..")
        );
    }

    #[test]
    fn absolute_mirrored_links_are_not_written_through() {
        let fx = Fixture::new();
        fs::create_dir_all(fx.src("real")).unwrap();
        fs::write(fx.src("real/file"), "original").unwrap();
        unix_fs::symlink(fx.src("real"), fx.src("alias")).unwrap();

        let mut materializer = Materializer::new(fx.root());
        materializer.prepare().unwrap();
        materializer.copy(&fx.src("alias"));
        materializer.copy(&fx.src("alias/file"));
        let report = materializer.finish();

        assert_eq!(report.failed, 1);
        assert_eq!(fs::read_to_string(fx.src("real/file")).unwrap(), "original");
        assert!(fx.mirrored("real/file").exists());
    }

    #[test]
    fn relative_mirrored_links_stay_usable() {
        let fx = Fixture::new();
        fs::create_dir_all(fx.src("usr/lib")).unwrap();
        fs::write(fx.src("usr/lib/libc.so"), "elf").unwrap();
        unix_fs::symlink("usr/lib", fx.src("lib")).unwrap();

        let mut materializer = Materializer::new(fx.root());
        materializer.prepare().unwrap();
        materializer.copy(&fx.src("lib"));
        materializer.copy(&fx.src("lib/libc.so"));
        let report = materializer.finish();

        assert_eq!(report.failed, 0);
        assert_eq!(fs::read_to_string(fx.mirrored("lib/libc.so")).unwrap(), "elf");
    }

    #[test]
    fn special_files_are_skipped() {
        let fx = Fixture::new();
        fs::create_dir_all(fx.src("run")).unwrap();
        let _listener = UnixListener::bind(fx.src("run/app.sock")).unwrap();
        fs::write(fx.src("run/app.pid"), "42").unwrap();

        let report = materialize(&fx.deps(&["run"]), &fx.root()).unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 0);
        assert!(!fx.mirrored("run/app.sock").exists());
        assert!(fx.mirrored("run/app.pid").exists());
    }

    #[test]
    fn missing_paths_are_counted_not_fatal() {
        let fx = Fixture::new();
        fs::write(fx.src("present"), "x").unwrap();

        let report = materialize(&fx.deps(&["absent", "present"]), &fx.root()).unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.copied, 1);
        assert!(fx.mirrored("present").exists());
    }

    #[test]
    fn root_is_wiped_between_runs() {
        let fx = Fixture::new();
        fs::write(fx.src("first"), "1").unwrap();
        fs::write(fx.src("second"), "2").unwrap();

        materialize(&fx.deps(&["first"]), &fx.root()).unwrap();
        let report = materialize(&fx.deps(&["second"]), &fx.root()).unwrap();

        // A fresh materializer has not seen anything yet.
        assert_eq!(report.copied, 1);
        assert!(!fx.mirrored("first").exists());
        assert!(fx.mirrored("second").exists());
    }

    #[test]
    fn relative_paths_are_rejected() {
        let fx = Fixture::new();
        let mut materializer = Materializer::new(fx.root());
        materializer.prepare().unwrap();
        materializer.copy(Path::new("etc/passwd"));
        assert_eq!(materializer.finish().failed, 1);
    }
}
