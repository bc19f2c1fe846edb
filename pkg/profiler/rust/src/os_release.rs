// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use log::debug;

pub const OS_RELEASE_PATH: &str = "/etc/os-release";
pub const DEFAULT_IMAGE: &str = "ubuntu:latest";

/// Base image matching the host distribution, as `<id>:<version>`.
pub fn detect() -> String {
    detect_from(Path::new(OS_RELEASE_PATH))
}

pub fn detect_from(path: &Path) -> String {
    let image = fs::read_to_string(path)
        .map_err(|e| debug!("could not read {}: {e}", path.display()))
        .ok()
        .and_then(|contents| parse(&contents));

    image.unwrap_or_else(|| DEFAULT_IMAGE.to_string())
}

pub fn parse(contents: &str) -> Option<String> {
    let fields: HashMap<&str, &str> = contents
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim(), value.trim().trim_matches(['"', '\''])))
        .collect();

    let id = fields
        .get("ID")
        .or_else(|| fields.get("NAME"))
        .filter(|id| !id.is_empty())?
        .to_lowercase();
    let version = fields.get("VERSION_ID").filter(|v| !v.is_empty())?;

    Some(format!("{id}:{version}"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn ubuntu() {
        let contents = r#"PRETTY_NAME="Ubuntu 22.04.4 LTS"
NAME="Ubuntu"
VERSION_ID="22.04"
VERSION="22.04.4 LTS (Jammy Jellyfish)"
ID=ubuntu
ID_LIKE=debian
"#;
        assert_eq!(parse(contents).as_deref(), Some("ubuntu:22.04"));
    }

    #[test]
    fn debian_uses_id_not_name() {
        let contents = "NAME=\"Debian GNU/Linux\"\nVERSION_ID=\"12\"\nID=debian\n";
        assert_eq!(parse(contents).as_deref(), Some("debian:12"));
    }

    #[test]
    fn name_fallback() {
        let contents = "NAME=\"Alpine\"\nVERSION_ID=3.19.1\n";
        assert_eq!(parse(contents).as_deref(), Some("alpine:3.19.1"));
    }

    #[test]
    fn missing_version() {
        assert_eq!(parse("ID=arch\n"), None);
        assert_eq!(parse(""), None);
    }

    #[test]
    fn unreadable_file_defaults() {
        assert_eq!(
            detect_from(Path::new("/nonexistent/os-release")),
            DEFAULT_IMAGE
        );
    }

    #[test]
    fn reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("os-release");
        std::fs::write(&path, "ID=fedora\nVERSION_ID=40\n").unwrap();
        assert_eq!(detect_from(&path), "fedora:40");
    }
}
