#![cfg(all(unix, feature = "cli"))]

use std::path::PathBuf;
use std::process::{Command, Output};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/fifolink-cli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn fifolink(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_fifolink"))
        .env_remove("FIFOLINK_CONFIG")
        .args(["--log-level", "error"])
        .args(args)
        .output()
        .expect("fifolink should run")
}

fn json_stdout(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be json")
}

#[test]
fn loopback_copies_input_to_output() {
    let dir = unique_temp_dir("loopback");
    let input = dir.join("in.bin");
    let output = dir.join("out.bin");
    let data: Vec<u8> = (0..12u8).map(|i| i.wrapping_mul(37)).collect();
    std::fs::write(&input, &data).expect("input should be writable");

    let out = fifolink(&[
        "--format",
        "json",
        "--frame-size",
        "4",
        "loopback",
        "--input",
        input.to_str().unwrap(),
        "--output",
        output.to_str().unwrap(),
    ]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    assert_eq!(std::fs::read(&output).expect("output should exist"), data);
    let report = json_stdout(&out);
    assert_eq!(report["command"], "loopback");
    assert_eq!(report["wire_bytes"], 18);
    assert_eq!(report["ends"][0]["stats"]["frames_sent"], 3);
    assert_eq!(report["ends"][1]["stats"]["frames_received"], 3);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn tx_capture_replays_through_rx_and_decode() {
    let dir = unique_temp_dir("tx-rx");
    let input = dir.join("in.bin");
    let wire = dir.join("air.bin");
    let output = dir.join("out.bin");
    std::fs::write(&input, b"0123456789").expect("input should be writable");

    let tx = fifolink(&[
        "--format",
        "json",
        "--frame-size",
        "4",
        "tx",
        "--input",
        input.to_str().unwrap(),
        "--wire-out",
        wire.to_str().unwrap(),
    ]);
    assert!(tx.status.success(), "stderr: {}", String::from_utf8_lossy(&tx.stderr));
    let capture = std::fs::read(&wire).expect("capture should exist");
    assert_eq!(
        capture,
        b"\x37\x690123\x37\x694567\x37\x6989\0\0".to_vec()
    );

    let rx = fifolink(&[
        "--format",
        "json",
        "--frame-size",
        "4",
        "rx",
        "--wire-in",
        wire.to_str().unwrap(),
        "--output",
        output.to_str().unwrap(),
    ]);
    assert!(rx.status.success(), "stderr: {}", String::from_utf8_lossy(&rx.stderr));
    assert_eq!(
        std::fs::read(&output).expect("output should exist"),
        b"0123456789\0\0".to_vec()
    );

    let decode = fifolink(&[
        "--format",
        "json",
        "--frame-size",
        "4",
        "decode",
        "--wire-in",
        wire.to_str().unwrap(),
    ]);
    assert!(decode.status.success());
    let report = json_stdout(&decode);
    let frames = report["frames"].as_array().expect("frames should be an array");
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[2]["trailing_pad"], 2);
    assert_eq!(report["leftover_bytes"], 0);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn decode_without_frames_reports_invalid_data() {
    let dir = unique_temp_dir("decode-junk");
    let wire = dir.join("junk.bin");
    std::fs::write(&wire, [1u8, 2, 3, 4, 5]).expect("capture should be writable");

    let out = fifolink(&["--format", "json", "decode", "--wire-in", wire.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(60));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn config_reflects_file_and_flags() {
    let dir = unique_temp_dir("config");
    let file = dir.join("link.json");
    std::fs::write(&file, r#"{"frame_size": 25000, "link_timeout_ms": 3000}"#)
        .expect("config should be writable");

    let out = fifolink(&[
        "--format",
        "json",
        "--config",
        file.to_str().unwrap(),
        "--sync",
        "00:ff",
        "--flush-timeout",
        "35ms",
        "config",
    ]);
    assert!(out.status.success());
    let config = json_stdout(&out);
    assert_eq!(config["frame_size"], 25000);
    assert_eq!(config["link_timeout_ms"], 3000);
    assert_eq!(config["flush_timeout_ms"], 35);
    assert_eq!(config["sync"], serde_json::json!([0, 255]));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn invalid_settings_exit_with_usage_code() {
    let out = fifolink(&["--frame-size", "0", "config"]);
    assert_eq!(out.status.code(), Some(64));
    assert!(String::from_utf8_lossy(&out.stderr).contains("frame_size"));
}

#[test]
fn bad_config_file_is_invalid_data() {
    let dir = unique_temp_dir("bad-config");
    let file = dir.join("link.json");
    std::fs::write(&file, r#"{"frame_size": "big"}"#).expect("config should be writable");

    let out = fifolink(&["--config", file.to_str().unwrap(), "config"]);
    assert_eq!(out.status.code(), Some(60));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn version_prints_package_version() {
    let out = fifolink(&["version"]);
    assert!(out.status.success());
    let text = String::from_utf8_lossy(&out.stdout);
    assert_eq!(text.trim(), format!("fifolink {}", env!("CARGO_PKG_VERSION")));
}
