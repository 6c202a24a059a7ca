use std::{
    fs::{self, File},
    io::Read,
    process::Command,
};

use asserting::prelude::*;
use flate2::read::MultiGzDecoder;

fn generate(dir: &std::path::Path, seed: &str) -> String {
    let out = Command::new(env!("CARGO_BIN_EXE_noise-maker"))
        .args([
            "--dir",
            dir.to_str().unwrap(),
            "--generations",
            "3",
            "--lines",
            "200",
            "--seed",
            seed,
            "--start",
            "2022-01-05T10:00:00+00:00",
        ])
        .output()
        .expect("Failed to start noise-maker");
    assert!(out.status.success());
    String::from_utf8(out.stdout).unwrap()
}

#[test]
fn writes_rotated_generations() {
    let dir = tempfile::tempdir().unwrap();
    let stdout = generate(dir.path(), "1");

    let live = fs::read_to_string(dir.path().join("access.log")).unwrap();
    let first = fs::read_to_string(dir.path().join("access.log.1")).unwrap();
    let mut oldest = String::new();
    MultiGzDecoder::new(File::open(dir.path().join("access.log.2.gz")).unwrap())
        .read_to_string(&mut oldest)
        .unwrap();

    for body in [&live, &first, &oldest] {
        assert_that!(body.lines().count()).is_equal_to(200);
    }
    assert_that!(oldest.as_str()).starts_with("192.168.");
    assert_that!(stdout.as_str()).contains("expected downloads: ");
}

#[test]
fn same_seed_same_logs() {
    let a = tempfile::tempdir().unwrap();
    let b = tempfile::tempdir().unwrap();
    generate(a.path(), "9");
    generate(b.path(), "9");

    assert_that!(fs::read(a.path().join("access.log")).unwrap())
        .is_equal_to(fs::read(b.path().join("access.log")).unwrap());
}
