//! Terminal Ctrl-C during a batch.
//!
//! The test process becomes its own process group leader and then sends
//! SIGINT to that whole group, the way a terminal does. It lives in a separate
//! test binary so no other test shares the signalled group.
#![cfg(unix)]

use gifbatch::config::BinaryLayout;
use gifbatch::{
    BatchPlan, BatchRunner, ConversionJob, EncodeSettings, PathResolver, Platform,
    SupervisorTimeouts, SystemLauncher,
};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::{getpgrp, setpgid, Pid};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

const SLOW_FFMPEG: &str = r#"#!/bin/sh
last=""
for arg in "$@"; do
  last="$arg"
done
dir=$(dirname "$last")
echo "frame=    0 fps=0.0" >&2
sleep 1
for i in 0001 0002; do
  : > "$dir/frame$i.png"
done
"#;

const FAKE_GIFSKI: &str = r#"#!/bin/sh
out=""
prev=""
for arg in "$@"; do
  if [ "$prev" = "-o" ]; then out="$arg"; fi
  prev="$arg"
done
printf 'GIF89a' > "$out"
"#;

#[tokio::test]
async fn test_ctrl_c_lets_running_job_finish() {
    setpgid(Pid::from_raw(0), Pid::from_raw(0)).unwrap();

    let dir = TempDir::new().unwrap();
    let bin = dir.path().join("app").join("bin").join("linux-x64");
    fs::create_dir_all(&bin).unwrap();
    for (name, body) in [("ffmpeg", SLOW_FFMPEG), ("gifski", FAKE_GIFSKI)] {
        let path = bin.join(name);
        fs::write(&path, body).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }
    let scratch = dir.path().join("scratch");
    fs::create_dir_all(&scratch).unwrap();
    let videos = dir.path().join("videos");
    fs::create_dir_all(&videos).unwrap();
    let inputs: Vec<_> = ["a.mp4", "b.mp4"]
        .iter()
        .map(|name| {
            let path = videos.join(name);
            fs::write(&path, b"video").unwrap();
            path
        })
        .collect();

    let runner = BatchRunner::new(ConversionJob::new(
        Arc::new(PathResolver::new(
            BinaryLayout::Bundled,
            dir.path().join("app"),
            Platform {
                os: "linux".to_string(),
                arch: "x86_64".to_string(),
            },
        )),
        Arc::new(SystemLauncher),
        SupervisorTimeouts {
            startup: Duration::from_secs(5),
            kill_grace: Duration::from_millis(100),
            poll_interval: Duration::from_millis(50),
            stall_threshold: Duration::from_secs(5),
        },
        scratch.clone(),
    ));
    let plan = BatchPlan::from_inputs(
        &inputs,
        None,
        EncodeSettings {
            fps: 10,
            width: 320,
            quality: 80,
        },
        "gifs",
    )
    .unwrap();

    // Same wiring as the CLI: interrupt requests a cooperative cancel
    let token = CancellationToken::new();
    let mut interrupts = signal(SignalKind::interrupt()).unwrap();
    let handler = {
        let token = token.clone();
        tokio::spawn(async move {
            if interrupts.recv().await.is_some() {
                token.cancel();
            }
        })
    };

    let sender = tokio::spawn(async {
        tokio::time::sleep(Duration::from_millis(400)).await;
        killpg(getpgrp(), Signal::SIGINT).unwrap();
    });

    let result = runner.run(&plan, &token).await.unwrap();
    sender.await.unwrap();
    handler.abort();

    assert!(token.is_cancelled());
    assert!(result.cancelled);
    assert_eq!(result.converted, 1);
    assert_eq!(fs::read(videos.join("gifs").join("a.gif")).unwrap(), b"GIF89a");
    assert!(!videos.join("gifs").join("b.gif").exists());
    assert_eq!(fs::read_dir(&scratch).unwrap().count(), 0);
}
