// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;
use log::{debug, info};
use walkdir::WalkDir;

use crate::errors::Error;

/// Writes `root` as a gzip-compressed tar stream. Entry names are relative
/// to `root`, symlinks are stored as links, and the walk is sorted so the
/// same tree always yields the same entry order.
pub fn create_archive<W: Write>(root: &Path, writer: W) -> Result<W, Error> {
    let archive_err = |source| Error::Archive {
        path: root.to_path_buf(),
        source,
    };

    let mut builder = tar::Builder::new(GzEncoder::new(writer, Compression::default()));
    builder.follow_symlinks(false);

    let mut entries = 0usize;
    for entry in WalkDir::new(root)
        .follow_links(false)
        .min_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| archive_err(io::Error::from(e)))?;
        let name = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| archive_err(io::Error::other(e)))?;
        debug!("archiving {}", name.display());
        builder
            .append_path_with_name(entry.path(), name)
            .map_err(archive_err)?;
        entries += 1;
    }

    let encoder = builder.into_inner().map_err(archive_err)?;
    let writer = encoder.finish().map_err(archive_err)?;
    debug!("archived {entries} entries from {}", root.display());
    Ok(writer)
}

/// Archives `root` into the file at `tar_path`.
pub fn archive_profile(root: &Path, tar_path: &Path) -> Result<(), Error> {
    let write_err = |source| Error::Write {
        path: tar_path.to_path_buf(),
        source,
    };

    let file = File::create(tar_path).map_err(write_err)?;
    let mut writer = create_archive(root, BufWriter::new(file))?;
    writer.flush().map_err(write_err)?;

    info!("wrote {}", tar_path.display());
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::fs;
    use std::os::unix::fs::symlink;
    use std::path::PathBuf;

    fn sample_tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("etc/nginx")).unwrap();
        fs::write(dir.path().join("etc/nginx/nginx.conf"), "worker_processes 1;\n").unwrap();
        symlink("nginx/nginx.conf", dir.path().join("etc/default.conf")).unwrap();
        fs::create_dir_all(dir.path().join("var/lib/nginx")).unwrap();
        dir
    }

    fn entries(bytes: &[u8]) -> Vec<(PathBuf, tar::EntryType, Option<PathBuf>)> {
        let mut archive = tar::Archive::new(GzDecoder::new(bytes));
        archive
            .entries()
            .unwrap()
            .map(|entry| {
                let entry = entry.unwrap();
                let link = entry.link_name().unwrap().map(|l| l.into_owned());
                (
                    entry.path().unwrap().into_owned(),
                    entry.header().entry_type(),
                    link,
                )
            })
            .collect()
    }

    #[test]
    fn relative_names_in_walk_order() {
        let tree = sample_tree();
        let bytes = create_archive(tree.path(), Vec::new()).unwrap();

        let names: Vec<PathBuf> = entries(&bytes).into_iter().map(|(p, _, _)| p).collect();
        assert_eq!(
            names,
            [
                "etc",
                "etc/default.conf",
                "etc/nginx",
                "etc/nginx/nginx.conf",
                "var",
                "var/lib",
                "var/lib/nginx",
            ]
            .map(PathBuf::from)
        );
    }

    #[test]
    fn symlinks_are_kept_as_links() {
        let tree = sample_tree();
        let bytes = create_archive(tree.path(), Vec::new()).unwrap();

        let (_, kind, link) = entries(&bytes)
            .into_iter()
            .find(|(p, _, _)| p == Path::new("etc/default.conf"))
            .unwrap();
        assert_eq!(kind, tar::EntryType::Symlink);
        assert_eq!(link, Some(PathBuf::from("nginx/nginx.conf")));
    }

    #[test]
    fn file_contents_round_trip() {
        let tree = sample_tree();
        let out = tempfile::tempdir().unwrap();
        let tar_path = out.path().join("profile.tar.gz");
        archive_profile(tree.path(), &tar_path).unwrap();

        let unpacked = out.path().join("unpacked");
        tar::Archive::new(GzDecoder::new(File::open(&tar_path).unwrap()))
            .unpack(&unpacked)
            .unwrap();
        assert_eq!(
            fs::read_to_string(unpacked.join("etc/nginx/nginx.conf")).unwrap(),
            "worker_processes 1;\n"
        );
        assert_eq!(
            fs::read_to_string(unpacked.join("etc/default.conf")).unwrap(),
            "worker_processes 1;\n"
        );
    }

    #[test]
    fn empty_tree() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = create_archive(dir.path(), Vec::new()).unwrap();
        assert!(entries(&bytes).is_empty());
    }

    #[test]
    fn missing_root() {
        assert!(matches!(
            create_archive(Path::new("/nonexistent/profile"), Vec::new()),
            Err(Error::Archive { .. })
        ));
    }
}
