//! End-to-end: replay a directory of frames through the binary, then read
//! the database back with `history --json`.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::Path;
use std::process::{Command, Output};

use chrono::DateTime;
use image::{Rgb, RgbImage};

/// LED centres in a default-calibrated 1280x720 frame, power first.
const LEDS: [(u32, u32); 3] = [(632, 127), (632, 134), (639, 134)];

fn write_frame(dir: &Path, name: &str, lit: &[usize]) {
    let image = RgbImage::from_fn(1280, 720, |x, y| {
        let on = lit.iter().any(|&i| {
            let (cx, cy) = LEDS[i];
            x.abs_diff(cx) <= 1 && y.abs_diff(cy) <= 1
        });
        if on { Rgb([220, 220, 220]) } else { Rgb([3, 3, 3]) }
    });
    image.save(dir.join(name)).expect("write frame");
}

fn hvacmon(args: &[&str]) -> Output {
    let output = Command::new(env!("CARGO_BIN_EXE_hvacmon"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("run hvacmon");
    assert!(
        output.status.success(),
        "hvacmon {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    output
}

#[test]
fn replay_records_change_and_failure() {
    let work = tempfile::tempdir().unwrap();
    let frames = work.path().join("frames");
    std::fs::create_dir(&frames).unwrap();
    write_frame(&frames, "2018-03-04_06-30-00.png", &[0]);
    write_frame(&frames, "2018-03-04_06-30-05.png", &[0, 1]);
    write_frame(&frames, "2018-03-04_06-30-10.png", &[0, 1]);
    write_frame(&frames, "2018-03-04_06-30-20.png", &[]);
    write_frame(&frames, "snapshot-copy.png", &[0, 2]);

    let db = work.path().join("hvac.db");
    let snapshots = work.path().join("snapshots");
    let db_arg = db.to_str().unwrap();

    let replay = hvacmon(&[
        "--utc",
        "replay",
        frames.to_str().unwrap(),
        "--db",
        db_arg,
        "--snapshot-dir",
        snapshots.to_str().unwrap(),
    ]);
    let summary = String::from_utf8(replay.stdout).unwrap();
    assert!(summary.contains("4 frames processed, 2 readings recorded"), "{summary}");

    let history = hvacmon(&["history", "--db", db_arg, "--json"]);
    let json: serde_json::Value = serde_json::from_slice(&history.stdout).unwrap();
    let zones = json["zone_readings"].as_array().unwrap();
    assert_eq!(zones.len(), 2);

    let time = |v: &serde_json::Value| DateTime::parse_from_rfc3339(v.as_str().unwrap()).unwrap();
    assert_eq!(
        time(&zones[0]["start"]),
        DateTime::parse_from_rfc3339("2018-03-04T06:30:00Z").unwrap()
    );
    assert_eq!(
        time(&zones[1]["end"]),
        DateTime::parse_from_rfc3339("2018-03-04T06:30:20Z").unwrap()
    );
    assert_eq!(zones[0]["status"]["zones"][0]["call"], false);
    assert_eq!(zones[1]["status"]["zones"][0]["call"], true);
    assert_eq!(zones[1]["status"]["zones"][0]["valve"], false);

    assert!(
        snapshots
            .join("statechange/2018-03-04_06-30-00_2018-03-04_06-30-05.png")
            .is_file()
    );
    assert!(
        snapshots
            .join("failures/2018-03-04_06-30-05_2018-03-04_06-30-20.png")
            .is_file()
    );
}

#[test]
fn temperature_is_appended() {
    let work = tempfile::tempdir().unwrap();
    let db = work.path().join("hvac.db");
    let db_arg = db.to_str().unwrap();

    hvacmon(&["temperature", "-3.5", "--db", db_arg]);
    hvacmon(&["temperature", "41", "--db", db_arg]);

    let history = hvacmon(&["history", "--db", db_arg, "--json"]);
    let json: serde_json::Value = serde_json::from_slice(&history.stdout).unwrap();
    let temps: Vec<f64> = json["temperature_readings"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["fahrenheit"].as_f64().unwrap())
        .collect();
    assert_eq!(temps, [-3.5, 41.0]);
    assert!(json["zone_readings"].as_array().unwrap().is_empty());
}

#[test]
fn decode_reports_status_as_json() {
    let work = tempfile::tempdir().unwrap();
    write_frame(work.path(), "frame.png", &[0, 2]);

    let output = hvacmon(&["decode", work.path().join("frame.png").to_str().unwrap(), "--json"]);
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let zone1 = &json["outcome"]["Decoded"]["zones"][0];
    assert_eq!(zone1["call"], false);
    assert_eq!(zone1["valve"], true);
    assert!(json["measurements"]["means"][0].as_f64().unwrap() > 200.0);
}

#[test]
fn bad_config_fails_with_message() {
    let work = tempfile::tempdir().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_hvacmon"))
        .args(["--threshold=-1", "decode", "missing.png"])
        .current_dir(work.path())
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error:"), "{stderr}");
}
