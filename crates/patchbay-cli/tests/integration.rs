//! Integration tests for patchbay-cli.
//!
//! Tests run the built binary: the `objects` listing, and a `play` session fed
//! from stdin against a relay that is not there.

use std::io::Write;
use std::process::{Command, Stdio};

use tempfile::TempDir;

/// Helper to get the path to the `patchbay` binary built by cargo.
fn patchbay_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_patchbay"))
}

// ---------------------------------------------------------------------------
// `patchbay objects`
// ---------------------------------------------------------------------------

#[test]
fn cli_objects_lists_every_class() {
    let output = patchbay_bin()
        .arg("objects")
        .output()
        .expect("failed to run patchbay objects");
    assert!(output.status.success(), "patchbay objects failed");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Object Classes"));
    for class in [
        "print", "bang", "pass", "loadmess", "sig~", "+~", "*~", "adc~", "dac~", "errorbox",
    ] {
        assert!(stdout.contains(class), "listing should contain '{class}'");
    }
}

#[test]
fn cli_objects_shows_pins_of_one_class() {
    let output = patchbay_bin()
        .args(["objects", "+~"])
        .output()
        .expect("failed to run patchbay objects +~");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Category: Signal"), "{stdout}");
    assert!(stdout.contains("Inlets:   signal, signal"), "{stdout}");
    assert!(stdout.contains("Outlets:  signal"), "{stdout}");
}

#[test]
fn cli_objects_rejects_unknown_class() {
    let output = patchbay_bin()
        .args(["objects", "osc~"])
        .output()
        .expect("failed to run patchbay objects osc~");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Unknown object class: osc~"), "{stderr}");
}

// ---------------------------------------------------------------------------
// `patchbay play`
// ---------------------------------------------------------------------------

#[test]
fn cli_play_edits_offline_and_quits() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("patchbay.toml");
    // Port 9 (discard) is closed on test machines, so edits stay local.
    std::fs::write(
        &config,
        "[client]\nhost = \"127.0.0.1\"\nport = 9\nsession = \"cli\"\n\n[audio]\nvector_size = 64\n",
    )
    .unwrap();

    let mut child = patchbay_bin()
        .arg("play")
        .arg("--config")
        .arg(&config)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to start patchbay play");

    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"add + 1\nadd print\nlink 1 1 2 1\nsend 1 1 41\nlist\nbogus\nquit\n")
        .unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Session 'cli' on 127.0.0.1:9"), "{stdout}");
    assert!(stdout.contains("#1 + 1"), "{stdout}");
    assert!(stdout.contains("#3 #1 outlet 1 -> #2 inlet 1"), "{stdout}");
    assert!(stdout.contains("post: print: 42"), "{stdout}");
    assert!(stdout.contains("unknown command 'bogus'"), "{stdout}");
    assert!(stdout.contains("Done!"), "{stdout}");
}

#[test]
fn cli_play_rejects_an_invalid_config() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("patchbay.toml");
    std::fs::write(&config, "[audio]\nvector_size = 100\n").unwrap();

    let output = patchbay_bin()
        .arg("play")
        .arg("--config")
        .arg(&config)
        .stdin(Stdio::null())
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("vector size must be a power of two"), "{stderr}");
}
