// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

const BIN: &str = env!("CARGO_BIN_EXE_vm2container");

fn vm2container(output_dir: &Path, args: &[&str]) -> Output {
    Command::new(BIN)
        .arg("--config")
        .arg("/nonexistent/vm2container.yaml")
        .arg("--output-dir")
        .arg(output_dir)
        .args(args)
        .env_remove("VM2C_OUTPUT_DIR")
        .env_remove("VM2C_TRACER")
        .env("VM2C_LOG_LEVEL", "debug")
        .output()
        .unwrap()
}

const SNAPSHOT: &str = r#"pid: 777
executable_path: /usr/bin/app
command_line_arguments:
  - flag: --port
    value: "9000"
reconstructed_command: /usr/bin/app --port 9000
working_directory: /
process_user: root
process_group: root
os_image: debian:12
environment_variables:
  - APP_MODE=production
listening_tcp: [9000]
"#;

#[test]
fn test_dockerize_from_saved_profile() {
    let host = tempfile::tempdir().unwrap();
    fs::write(host.path().join("app.conf"), "port 9000\n").unwrap();

    let out = tempfile::tempdir().unwrap();
    let profile = out.path().join("777/profile");
    fs::create_dir_all(&profile).unwrap();
    fs::write(profile.join("snapshot.yaml"), SNAPSHOT).unwrap();
    fs::write(
        profile.join("strace_filtered.log"),
        format!("{}\n", host.path().join("app.conf").display()),
    )
    .unwrap();

    let output = vm2container(out.path(), &["dockerize", "777"]);
    assert!(
        output.status.success(),
        "dockerize failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let context = out.path().join("777/dockerize");
    assert!(context.join("profile.tar.gz").is_file());
    let copied = context
        .join("profile")
        .join(host.path().strip_prefix("/").unwrap())
        .join("app.conf");
    assert_eq!(fs::read_to_string(copied).unwrap(), "port 9000\n");

    let dockerfile = fs::read_to_string(context.join("Dockerfile")).unwrap();
    assert!(dockerfile.contains("FROM debian:12\n"));
    assert!(dockerfile.contains("ENV APP_MODE=\"production\"\n"));
    assert!(dockerfile.contains("EXPOSE 9000/tcp\n"));
    assert!(dockerfile.ends_with("CMD [\"/usr/bin/app\", \"--port\", \"9000\"]\n"));
}

#[test]
fn test_dockerize_without_profile_fails() {
    let out = tempfile::tempdir().unwrap();
    let output = vm2container(out.path(), &["dockerize", "4242"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("run `vm2container profile 4242` first"),
        "unexpected error output: {stderr}"
    );
    assert!(!out.path().join("4242/dockerize").exists());
}

#[test]
fn test_profile_missing_process_fails() {
    let out = tempfile::tempdir().unwrap();
    // Pid numbers are capped well below this on Linux.
    let output = vm2container(out.path(), &["profile", "2147483000"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("process 2147483000 not found"),
        "unexpected error output: {stderr}"
    );
    assert!(!out.path().join("2147483000/profile/snapshot.yaml").exists());
}

/// Stands in for strace: records one openat in the `-o` file, then runs the
/// gated workload.
const FAKE_TRACER: &str = r#"#!/bin/sh
log=""
while [ $# -gt 0 ]; do
    case "$1" in
        -o) log="$2"; shift 2 ;;
        --) shift; break ;;
        *) shift ;;
    esac
done
echo "$$ openat(AT_FDCWD, \"/etc/fake.conf\", O_RDONLY|O_CLOEXEC) = 3" > "$log"
exec "$@"
"#;

const FAST_TRACER_CONFIG: &str = "tracer:
  grace_period_ms: 200
  terminate_timeout_secs: 2
  run_as_owner: false
";

fn write_tools(dir: &Path) -> (PathBuf, PathBuf) {
    let tracer = dir.join("fake-strace");
    fs::write(&tracer, FAKE_TRACER).unwrap();
    fs::set_permissions(&tracer, fs::Permissions::from_mode(0o755)).unwrap();
    let config = dir.join("config.yaml");
    fs::write(&config, FAST_TRACER_CONFIG).unwrap();
    (tracer, config)
}

/// Kills every process carrying `marker` in its environment.
fn kill_marked(marker: &str) {
    let needle = format!("VM2C_TEST_MARKER={marker}");
    for entry in fs::read_dir("/proc").unwrap().flatten() {
        let Ok(environ) = fs::read(entry.path().join("environ")) else {
            continue;
        };
        if environ
            .split(|b| *b == 0)
            .any(|var| var == needle.as_bytes())
        {
            let _ = Command::new("kill")
                .arg("-9")
                .arg(entry.file_name())
                .status();
        }
    }
}

#[test]
fn test_profile_with_default_output_dir() {
    let operator_dir = tempfile::tempdir().unwrap();
    let workload_dir = tempfile::tempdir().unwrap();
    let tools = tempfile::tempdir().unwrap();
    let (tracer, config) = write_tools(tools.path());

    let marker = operator_dir.path().display().to_string();
    let workload = Command::new("sleep")
        .arg("30")
        .current_dir(workload_dir.path())
        .env("VM2C_TEST_MARKER", &marker)
        .stdout(Stdio::null())
        .spawn()
        .unwrap();
    let pid = workload.id().to_string();
    let _cleanup = scopeguard::guard(workload, |mut workload| {
        let _ = workload.kill();
        let _ = workload.wait();
        kill_marked(&marker);
    });

    let output = Command::new(BIN)
        .current_dir(operator_dir.path())
        .arg("--config")
        .arg(&config)
        .args(["profile", "--trace-wait", "1", &pid])
        .env("VM2C_TRACER", &tracer)
        .env_remove("VM2C_OUTPUT_DIR")
        .env("VM2C_LOG_LEVEL", "debug")
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "profile failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let profile = operator_dir.path().join("output").join(&pid).join("profile");
    assert!(profile.join("snapshot.yaml").is_file());
    assert!(
        profile.join("strace.log").is_file(),
        "the raw trace should land in the operator's output directory"
    );
    let filtered = fs::read_to_string(profile.join("strace_filtered.log")).unwrap();
    assert!(filtered.lines().any(|line| line == "/etc/fake.conf"));
    assert!(profile.join("strace_merged.log").is_file());
    assert!(
        !workload_dir.path().join("output").exists(),
        "nothing should be written in the workload's directory"
    );
}
