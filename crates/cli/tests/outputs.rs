use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

use cptsim_core::arch::ArchState;
use cptsim_core::checkpoint::compress::GzipCompressor;
use cptsim_core::checkpoint::path::DirPathManager;
use cptsim_core::checkpoint::serializer::Serializer;
use cptsim_core::checkpoint::simpoint::{SimPoint, SimPointManifest};
use cptsim_core::memory::PhysicalMemory;

fn temp_dir(prefix: &str) -> PathBuf {
    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir()
        .join("cptsim-cli-tests")
        .join(format!("{}-{}", prefix, nonce));
    std::fs::create_dir_all(&dir).expect("Failed to create temp dir");
    dir
}

fn write_simpoints(root: &Path, workload: &str) {
    let dir = root.join(workload);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("simpoints0"), "9 1\n5 0\n").unwrap();
    std::fs::write(dir.join("weights0"), "0.8 1\n0.2 0\n").unwrap();
}

fn write_config(dir: &Path) -> PathBuf {
    let path = dir.join("sim.yaml");
    let yaml = format!(
        r#"
memory:
  size: "64 KiB"
io_space:
  size: "64 KiB"
checkpoint:
  mode: simpoint
  interval: 1000
  simpoint_dir: "{}"
  output_dir: "{}"
  workload: "wl"
"#,
        dir.join("simpoints").display(),
        dir.join("out").display()
    );
    std::fs::write(&path, yaml).expect("Failed to write config");
    path
}

#[test]
fn test_cli_help() {
    let output = Command::new(env!("CARGO_BIN_EXE_cptsim"))
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("CptSim checkpoint tool"));
    assert!(stdout.contains("inspect"));
    assert!(stdout.contains("plan"));
}

#[test]
fn test_cli_plan_lists_triggers() {
    let dir = temp_dir("plan");
    write_simpoints(&dir.join("simpoints"), "wl");
    let config = write_config(&dir);

    let output = Command::new(env!("CARGO_BIN_EXE_cptsim"))
        .args(["plan", "--config", config.to_str().unwrap()])
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success(), "{:?}", output);
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("2 simpoints, interval 1000 instructions"));
    let first = stdout.find("at 105000").expect("first trigger listed");
    let second = stdout.find("at 109000").expect("second trigger listed");
    assert!(first < second);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_cli_inspect_json() {
    let dir = temp_dir("inspect");
    let paths = DirPathManager::new(dir.join("out"), dir.join("simpoints"), "cli", "wl");
    let mut serializer = Serializer::new(Box::new(paths), Box::new(GzipCompressor::default()))
        .with_simpoints(
            1000,
            SimPointManifest::from_points([SimPoint {
                location: 5,
                weight: 0.2,
                id: 0,
            }]),
        )
        .unwrap();

    let mut arch = ArchState::new();
    arch.pc = 0x8000_1234;
    arch.gpr[2] = 0x8000_f000;
    arch.csr[0x300] = 0x1800;
    let mut pmem = PhysicalMemory::new(0x10000, 0x8000_0000);
    let checkpoint = serializer.take_checkpoint(&arch, &mut pmem).unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_cptsim"))
        .args(["inspect", "--json", checkpoint.to_str().unwrap()])
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success(), "{:?}", output);
    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["pc"], 0x8000_1234u64);
    assert_eq!(summary["image_size"], 0x10000);
    assert_eq!(summary["gpr"][2], 0x8000_f000u64);
    assert_eq!(summary["csr"]["0x300"], 0x1800);
    assert_eq!(summary["sha256"].as_str().unwrap().len(), 64);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_cli_restore_raw_image() {
    let dir = temp_dir("restore");
    write_simpoints(&dir.join("simpoints"), "wl");
    let config = write_config(&dir);
    let image = dir.join("restorer.bin");
    std::fs::write(&image, vec![0x13u8; 0x20000]).unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_cptsim"))
        .args([
            "restore",
            "--config",
            config.to_str().unwrap(),
            image.to_str().unwrap(),
        ])
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success(), "{:?}", output);
    let stdout = String::from_utf8(output.stdout).unwrap();
    // Clamped to the 64 KiB of simulated memory.
    assert!(stdout.contains("Loaded 0x10000 bytes"));
    assert!(stdout.contains("no register state"));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_cli_inspect_missing_file() {
    let output = Command::new(env!("CARGO_BIN_EXE_cptsim"))
        .args(["inspect", "non_existent_checkpoint.gz"])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
}
