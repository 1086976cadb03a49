//! Ctrl+C handling of the collector binary.
#![cfg(unix)]

use anyhow::Result;
use std::{
    process::{Command, Stdio},
    thread,
    time::Duration,
};
use tempfile::tempdir;

#[test]
fn sigint_exits_with_status_one_and_a_message() -> Result<()> {
    // nothing listens on the status port, so every cycle is skipped
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();
    drop(listener);

    let dir = tempdir()?;
    let config = dir.path().join("collector.json");
    std::fs::write(
        &config,
        serde_json::json!({
            "last_update_url": format!("http://127.0.0.1:{}/lastupdate.txt", port),
            "events_dir": dir.path().join("events"),
            "collection_period_secs": 1,
        })
        .to_string(),
    )?;

    let child = Command::new(env!("CARGO_BIN_EXE_gdelt-events-collector"))
        .arg(&config)
        .env("NO_PROXY", "*")
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()?;

    thread::sleep(Duration::from_millis(1500));
    let status = Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()?;
    assert!(status.success());

    let output = child.wait_with_output()?;
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("detected a keyboard interrupt, exiting"),
        "stderr was: {}",
        stderr
    );
    assert!(dir.path().join("events/merged.parquet").exists());
    Ok(())
}
