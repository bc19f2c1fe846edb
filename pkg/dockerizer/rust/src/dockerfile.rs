// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::fs;
use std::path::Path;

use log::{info, warn};
use serde_json::Value;
use vm2c_profiler::{DEFAULT_IMAGE, ProcessSnapshot};

use crate::errors::Error;

/// Renders a Dockerfile that unpacks `archive_name` over the base image and
/// runs the snapshot's command in the foreground.
///
/// `profile_dir` is the name of the profile tree next to the Dockerfile in
/// the build context; its `etc/passwd` and `etc/group` replace the image's.
pub fn render(snapshot: &ProcessSnapshot, archive_name: &str, profile_dir: &str) -> String {
    let base_image = if snapshot.os_image.is_empty() {
        DEFAULT_IMAGE
    } else {
        snapshot.os_image.as_str()
    };

    let mut lines = vec![
        "# Set the base image".to_string(),
        format!("FROM {base_image}"),
        String::new(),
        "# Copy the profile archive".to_string(),
        format!("COPY {archive_name} /"),
        String::new(),
        "# Extract the profile and clean up the archive".to_string(),
        format!("RUN tar --skip-old-files -xvf /{archive_name} -C / && rm /{archive_name}"),
        String::new(),
        "# Overwrite user and group data".to_string(),
        format!("COPY {profile_dir}/etc/passwd {profile_dir}/etc/group /etc/"),
        String::new(),
        "# Set environment variables".to_string(),
    ];
    lines.extend(snapshot.environment_variables.iter().filter_map(|entry| {
        let (key, value) = entry.split_once('=')?;
        match env_value(value) {
            Some(value) => Some(format!("ENV {key}={value}")),
            None => {
                warn!("skipping environment variable {key}: value has control characters");
                None
            }
        }
    }));

    lines.push(String::new());
    lines.push("# Set the user and group".to_string());
    lines.push(format!("USER {}", user_and_group(snapshot)));

    lines.push(String::new());
    lines.push("# Set the working directory".to_string());
    let workdir = if snapshot.working_directory.is_empty() {
        "/"
    } else {
        snapshot.working_directory.as_str()
    };
    lines.push(format!("WORKDIR {workdir}"));

    lines.push(String::new());
    lines.push("# Expose ports".to_string());
    lines.extend(
        snapshot
            .listening_tcp
            .iter()
            .map(|port| format!("EXPOSE {port}/tcp")),
    );
    lines.extend(
        snapshot
            .listening_udp
            .iter()
            .map(|port| format!("EXPOSE {port}/udp")),
    );

    lines.push(String::new());
    lines.push("# Set the entry point".to_string());
    lines.push(format!("CMD [{}]", command(snapshot)));

    let mut rendered = lines.join("\n");
    rendered.push('\n');
    rendered
}

pub fn write_dockerfile(
    snapshot: &ProcessSnapshot,
    path: &Path,
    archive_name: &str,
    profile_dir: &str,
) -> Result<(), Error> {
    fs::write(path, render(snapshot, archive_name, profile_dir)).map_err(|source| {
        Error::Write {
            path: path.to_path_buf(),
            source,
        }
    })?;
    info!("wrote {}", path.display());
    Ok(())
}

fn user_and_group(snapshot: &ProcessSnapshot) -> String {
    match (
        snapshot.process_user.as_str(),
        snapshot.process_group.as_str(),
    ) {
        ("", _) => "root:root".to_string(),
        (user, "") => user.to_string(),
        (user, group) => format!("{user}:{group}"),
    }
}

/// The exec-form CMD entries. Servers told to daemonize are kept in the
/// foreground, otherwise the container exits right away.
fn command(snapshot: &ProcessSnapshot) -> String {
    let mut segments = vec![snapshot.executable_path.as_str()];
    for argument in &snapshot.command_line_arguments {
        segments.push(&argument.flag);
        if !argument.value.is_empty() {
            segments.push(&argument.value);
        }
    }

    segments
        .into_iter()
        .map(|segment| quote(&segment.replace("daemon on", "daemon off")))
        .collect::<Vec<_>>()
        .join(", ")
}

fn quote(value: &str) -> String {
    Value::from(value).to_string()
}

/// Double-quotes an ENV value so Docker keeps it literally: no variable
/// expansion, no escapes. Values with control characters have no literal
/// form on a single Dockerfile line.
fn env_value(value: &str) -> Option<String> {
    if value.chars().any(char::is_control) {
        return None;
    }

    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if matches!(c, '\\' | '"' | '$') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    Some(quoted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use vm2c_profiler::FlagArgument;

    fn nginx() -> ProcessSnapshot {
        ProcessSnapshot {
            pid: 1234,
            executable_path: "/usr/sbin/nginx".to_string(),
            command_line_arguments: vec![FlagArgument {
                flag: "-g".to_string(),
                value: "daemon on; master_process on;".to_string(),
            }],
            working_directory: "/".to_string(),
            process_user: "root".to_string(),
            process_group: "root".to_string(),
            os_image: "ubuntu:22.04".to_string(),
            environment_variables: vec![
                "PATH=/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin".to_string(),
                "LANG=C.UTF-8".to_string(),
            ],
            listening_tcp: BTreeSet::from([80, 443]),
            listening_udp: BTreeSet::from([53]),
            ..ProcessSnapshot::default()
        }
    }

    #[test]
    fn renders_nginx() {
        let expected = r#"# Set the base image
FROM ubuntu:22.04

# Copy the profile archive
COPY profile.tar.gz /

# Extract the profile and clean up the archive
RUN tar --skip-old-files -xvf /profile.tar.gz -C / && rm /profile.tar.gz

# Overwrite user and group data
COPY profile/etc/passwd profile/etc/group /etc/

# Set environment variables
ENV PATH="/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin"
ENV LANG="C.UTF-8"

# Set the user and group
USER root:root

# Set the working directory
WORKDIR /

# Expose ports
EXPOSE 80/tcp
EXPOSE 443/tcp
EXPOSE 53/udp

# Set the entry point
CMD ["/usr/sbin/nginx", "-g", "daemon off; master_process on;"]
"#;
        assert_eq!(render(&nginx(), "profile.tar.gz", "profile"), expected);
    }

    #[test]
    fn standalone_arguments_and_quotes() {
        let snapshot = ProcessSnapshot {
            executable_path: "/opt/app/bin/app".to_string(),
            command_line_arguments: vec![
                FlagArgument {
                    flag: "serve".to_string(),
                    value: String::new(),
                },
                FlagArgument {
                    flag: "--banner".to_string(),
                    value: r#"say "hi""#.to_string(),
                },
            ],
            ..ProcessSnapshot::default()
        };
        assert_eq!(
            command(&snapshot),
            r#""/opt/app/bin/app", "serve", "--banner", "say \"hi\"""#
        );
    }

    #[test]
    fn defaults_for_missing_fields() {
        let snapshot = ProcessSnapshot {
            executable_path: "/bin/app".to_string(),
            ..ProcessSnapshot::default()
        };
        let rendered = render(&snapshot, "profile.tar.gz", "profile");
        assert!(rendered.contains("FROM ubuntu:latest\n"));
        assert!(rendered.contains("USER root:root\n"));
        assert!(rendered.contains("WORKDIR /\n"));
        assert!(!rendered.contains("EXPOSE"));
        assert!(rendered.ends_with("CMD [\"/bin/app\"]\n"));
    }

    #[test]
    fn env_values_stay_literal() {
        assert_eq!(env_value("/usr/bin").as_deref(), Some(r#""/usr/bin""#));
        assert_eq!(
            env_value(r#"$HOME/x "y" C:\tmp"#).as_deref(),
            Some(r#""\$HOME/x \"y\" C:\\tmp""#)
        );
        assert_eq!(env_value("").as_deref(), Some(r#""""#));
        assert_eq!(env_value("line\nbreak"), None);
        assert_eq!(env_value("\u{1b}[0m"), None);

        let snapshot = ProcessSnapshot {
            executable_path: "/bin/app".to_string(),
            environment_variables: vec![
                "PS1=$USER@host".to_string(),
                "BANNER=hello\nworld".to_string(),
            ],
            ..ProcessSnapshot::default()
        };
        let rendered = render(&snapshot, "profile.tar.gz", "profile");
        assert!(rendered.contains("ENV PS1=\"\\$USER@host\"\n"));
        assert!(!rendered.contains("BANNER"));
    }

    #[test]
    fn user_without_group() {
        let snapshot = ProcessSnapshot {
            process_user: "www-data".to_string(),
            ..ProcessSnapshot::default()
        };
        assert_eq!(user_and_group(&snapshot), "www-data");
    }
}
