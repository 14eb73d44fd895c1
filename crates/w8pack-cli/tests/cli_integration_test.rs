//! End-to-end integration tests for the w8pack CLI.
//!
//! These tests build small containers on disk and drive the binary through
//! the quantize, repack, calibrate, inspect and verify workflows.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use w8pack_serialize::{
    load_container, load_repacked, save_container, Container, ContainerFormat, DType,
    TensorRecord,
};

// =============================================================================
// Test Helpers
// =============================================================================

/// Get a Command for the w8pack binary, run inside `dir`
fn w8pack_cmd(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("w8pack").unwrap();
    cmd.current_dir(dir);
    cmd
}

/// Float container with two weights and a bias.
///
/// `model.0.conv.weight` peaks at 127 (scale 1.0, multiplier 65536) and
/// `model.1.conv.weight` peaks at 0.5 (multiplier 258).
fn write_float_weights(dir: &Path) -> PathBuf {
    let mut w0: Vec<f32> = (0..16).map(|i| (i * 8 - 60) as f32).collect();
    w0[0] = 127.0;
    let container = Container::from_records(vec![
        TensorRecord::float32("model.0.conv.weight", vec![4, 4, 1, 1], w0).unwrap(),
        TensorRecord::float32("model.0.conv.bias", vec![4], vec![0.5, -0.5, 1.0, 0.0]).unwrap(),
        TensorRecord::float32("model.1.conv.weight", vec![2, 1, 1, 1], vec![0.5, -0.25]).unwrap(),
    ])
    .unwrap();
    let path = dir.join("weights.bin");
    save_container(&container, &path, ContainerFormat::Float).unwrap();
    path
}

fn quantize(dir: &Path) -> PathBuf {
    let input = write_float_weights(dir);
    let output = dir.join("weights_w8.bin");
    w8pack_cmd(dir)
        .arg("quantize")
        .arg("-i")
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .assert()
        .success();
    output
}

// =============================================================================
// Help and Version
// =============================================================================

#[test]
fn test_cli_help() {
    let temp_dir = TempDir::new().unwrap();
    w8pack_cmd(temp_dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("calibrate"));
}

#[test]
fn test_cli_version() {
    let temp_dir = TempDir::new().unwrap();
    w8pack_cmd(temp_dir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("w8pack"));
}

// =============================================================================
// Quantize
// =============================================================================

#[test]
fn test_quantize_writes_typed_container() {
    let temp_dir = TempDir::new().unwrap();
    let output = quantize(temp_dir.path());

    let typed = load_container(&output, ContainerFormat::Typed).unwrap();
    assert_eq!(typed.len(), 3);

    let w0 = typed.get("model.0.conv.weight").unwrap();
    assert_eq!(w0.dtype(), DType::I8);
    assert_eq!(w0.scale(), Some(1.0));
    assert_eq!(typed.get("model.0.conv.bias").unwrap().dtype(), DType::F32);
}

#[test]
fn test_quantize_missing_input_fails_with_path() {
    let temp_dir = TempDir::new().unwrap();
    w8pack_cmd(temp_dir.path())
        .arg("quantize")
        .arg("-i")
        .arg("no_such_weights.bin")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("no_such_weights.bin"));
}

#[test]
fn test_quantize_then_inspect() {
    let temp_dir = TempDir::new().unwrap();
    let output = quantize(temp_dir.path());

    w8pack_cmd(temp_dir.path())
        .arg("inspect")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("model.0.conv.weight"))
        .stdout(predicate::str::contains("[4, 4, 1, 1]"))
        .stdout(predicate::str::contains("i8"));
}

#[test]
fn test_inspect_json() {
    let temp_dir = TempDir::new().unwrap();
    let output = quantize(temp_dir.path());

    let assert = w8pack_cmd(temp_dir.path())
        .arg("inspect")
        .arg(&output)
        .arg("--json")
        .assert()
        .success();
    let report: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(report["tensors"], 3);
    assert_eq!(report["entries"][0]["dtype"], "i8");
}

// =============================================================================
// Default Paths and Configuration
// =============================================================================

#[test]
fn test_default_asset_paths() {
    let temp_dir = TempDir::new().unwrap();
    let assets = temp_dir.path().join("assets");
    std::fs::create_dir(&assets).unwrap();
    std::fs::rename(write_float_weights(temp_dir.path()), assets.join("weights.bin")).unwrap();

    w8pack_cmd(temp_dir.path()).arg("quantize").assert().success();
    let typed = load_container(assets.join("weights_w8.bin"), ContainerFormat::Typed).unwrap();
    assert_eq!(typed.int8_count(), 2);

    w8pack_cmd(temp_dir.path()).arg("repack").assert().success();
    assert!(assets.join("weights_acc_repack.bin").is_file());

    w8pack_cmd(temp_dir.path()).arg("calibrate").assert().success();
    let header = std::fs::read_to_string(assets.join("layers_config.h")).unwrap();
    assert!(header.contains("#define LAYER_MULTIPLIER_0   65536U"));
}

#[test]
fn test_config_file_overrides_defaults() {
    let temp_dir = TempDir::new().unwrap();
    write_float_weights(temp_dir.path());
    std::fs::write(
        temp_dir.path().join("w8pack.toml"),
        r#"
[paths]
float_weights = "weights.bin"
typed_weights = "out/model_w8.bin"
layers_header = "out/shifts.txt"

[calibration]
mode = "shift"
"#,
    )
    .unwrap();

    w8pack_cmd(temp_dir.path()).arg("quantize").assert().success();
    assert!(temp_dir.path().join("out/model_w8.bin").is_file());

    w8pack_cmd(temp_dir.path()).arg("calibrate").assert().success();
    let text = std::fs::read_to_string(temp_dir.path().join("out/shifts.txt")).unwrap();
    assert!(text.starts_with("LAYER_SHIFT_0 = 0\n"));
}

// =============================================================================
// Repack
// =============================================================================

#[test]
fn test_repack_typed_container() {
    let temp_dir = TempDir::new().unwrap();
    let typed = quantize(temp_dir.path());
    let output = temp_dir.path().join("weights_acc_repack.bin");
    let biases = temp_dir.path().join("bias_acc_repack.bin");

    w8pack_cmd(temp_dir.path())
        .arg("repack")
        .arg("-i")
        .arg(&typed)
        .arg("-o")
        .arg(&output)
        .arg("--bias-out")
        .arg(&biases)
        .assert()
        .success();

    let repacked = load_repacked(&output).unwrap();
    assert_eq!(repacked.len(), 2);
    // One 32-channel block of 4 input channels, 8 clusters of 4 lanes
    assert_eq!(repacked.get("model.0.conv.weight").unwrap().len(), 128);

    let bias = load_repacked(&biases).unwrap();
    assert_eq!(bias.get("model.0.conv.bias").unwrap().len(), 32 * 4);
}

#[test]
fn test_repack_rejects_repacked_input() {
    let temp_dir = TempDir::new().unwrap();
    w8pack_cmd(temp_dir.path())
        .arg("repack")
        .arg("-i")
        .arg("weights_acc_repack.bin")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already a repacked"));
}

// =============================================================================
// Calibrate
// =============================================================================

#[test]
fn test_calibrate_to_stdout() {
    let temp_dir = TempDir::new().unwrap();
    let typed = quantize(temp_dir.path());

    w8pack_cmd(temp_dir.path())
        .arg("calibrate")
        .arg("-i")
        .arg(&typed)
        .arg("-o")
        .arg("-")
        .assert()
        .success()
        .stdout(predicate::str::contains("LAYER_MULTIPLIER_0 = 65536"))
        .stdout(predicate::str::contains("LAYER_MULTIPLIER_1 = 258"))
        .stdout(predicate::str::contains("LAYER_MULTIPLIER_2 = 64"))
        .stdout(predicate::str::contains("LAYER_MULTIPLIER_24 = 64"))
        .stderr(predicate::str::contains("model.2.cv1.conv.weight"));
}

#[test]
fn test_calibrate_float_input_shift_mode() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_float_weights(temp_dir.path());

    w8pack_cmd(temp_dir.path())
        .arg("calibrate")
        .arg("-i")
        .arg(&input)
        .arg("--mode")
        .arg("shift")
        .arg("-o")
        .arg("-")
        .assert()
        .success()
        .stdout(predicate::str::contains("LAYER_SHIFT_0 = 0"))
        .stdout(predicate::str::contains("LAYER_SHIFT_1 = 8"))
        .stdout(predicate::str::contains("LAYER_SHIFT_2 = 10"));
}

#[test]
fn test_calibrate_writes_header() {
    let temp_dir = TempDir::new().unwrap();
    let typed = quantize(temp_dir.path());
    let header = temp_dir.path().join("include").join("layers_config.h");

    w8pack_cmd(temp_dir.path())
        .arg("calibrate")
        .arg("-i")
        .arg(&typed)
        .arg("-o")
        .arg(&header)
        .assert()
        .success();

    let text = std::fs::read_to_string(&header).unwrap();
    assert!(text.contains("#ifndef LAYERS_CONFIG_H"));
    assert!(text.contains("#define LAYER_MULTIPLIER_0   65536U"));
    assert!(text.contains("#define LAYER_MULTIPLIER_24   64U"));
}

#[test]
fn test_calibrate_deny_degenerate() {
    let temp_dir = TempDir::new().unwrap();
    let container = Container::from_records(vec![TensorRecord::float32(
        "unrelated.weight",
        vec![1],
        vec![1.0],
    )
    .unwrap()])
    .unwrap();
    let input = temp_dir.path().join("weights.bin");
    save_container(&container, &input, ContainerFormat::Float).unwrap();
    let header = temp_dir.path().join("layers_config.h");

    w8pack_cmd(temp_dir.path())
        .arg("calibrate")
        .arg("-i")
        .arg(&input)
        .arg("-o")
        .arg(&header)
        .arg("--deny-degenerate")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("degenerate"))
        .stderr(predicate::str::contains(
            "layer 0: weight key \"model.0.conv.weight\" not found",
        ))
        .stderr(predicate::str::contains("model.24.m.0.weight"));
    assert!(!header.exists());

    // Without the flag the run succeeds with a warning
    w8pack_cmd(temp_dir.path())
        .arg("calibrate")
        .arg("-i")
        .arg(&input)
        .arg("-o")
        .arg(&header)
        .assert()
        .success()
        .stderr(predicate::str::contains("degenerate"));
    assert!(header.exists());
}

// =============================================================================
// Verify
// =============================================================================

#[test]
fn test_verify_fresh_quantization() {
    let temp_dir = TempDir::new().unwrap();
    let typed = quantize(temp_dir.path());

    w8pack_cmd(temp_dir.path())
        .arg("verify")
        .arg("--float")
        .arg(temp_dir.path().join("weights.bin"))
        .arg("--quantized")
        .arg(&typed)
        .assert()
        .success()
        .stdout(predicate::str::contains("matches"));
}

#[test]
fn test_verify_detects_tampering() {
    let temp_dir = TempDir::new().unwrap();
    let typed_path = quantize(temp_dir.path());

    let mut records = load_container(&typed_path, ContainerFormat::Typed)
        .unwrap()
        .into_records();
    records[2] = TensorRecord::int8("model.1.conv.weight", vec![2, 1, 1, 1], vec![127, -60], 0.5 / 127.0)
        .unwrap();
    save_container(
        &Container::from_records(records).unwrap(),
        &typed_path,
        ContainerFormat::Typed,
    )
    .unwrap();

    w8pack_cmd(temp_dir.path())
        .arg("verify")
        .arg("--float")
        .arg(temp_dir.path().join("weights.bin"))
        .arg("--quantized")
        .arg(&typed_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Verification failed"));
}
