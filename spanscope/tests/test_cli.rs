use std::path::PathBuf;
use std::process::Command;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

fn spanscope() -> Command {
    Command::new(env!("CARGO_BIN_EXE_spanscope"))
}

#[test]
fn test_summary_and_export() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let trace = dir.path().join("trace.json");

    let output = spanscope()
        .arg(fixture("request.cpuprofile"))
        .arg("--export")
        .arg(&trace)
        .output()
        .expect("Failed to run spanscope");

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("SPANS"));
    assert!(stdout.contains("queryDb"));
    assert!(stdout.contains("saved:"));

    // (program) and the gc frame under queryDb are dropped: 2 of 18 frames
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("18 frames (11.1% filtered)"), "stderr: {stderr}");

    let parsed: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&trace).expect("trace not written")).expect("Invalid JSON");
    assert!(parsed["traceEvents"].as_array().is_some_and(|events| !events.is_empty()));
}

#[test]
fn test_quiet_prints_nothing() {
    let output = spanscope().arg(fixture("request.cpuprofile")).arg("--quiet").output().unwrap();
    assert!(output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn test_invalid_profile_exit_code() {
    let output = spanscope().arg(fixture("cyclic.cpuprofile")).output().unwrap();
    assert_eq!(output.status.code(), Some(65));
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid profile"));
}

#[test]
fn test_bad_pattern_exit_code() {
    let output = spanscope().arg(fixture("request.cpuprofile")).args(["--exclude", "(unclosed"]).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("(unclosed"));
}

#[test]
fn test_missing_file_exit_code() {
    let output = spanscope().arg("/nonexistent/app.cpuprofile").output().unwrap();
    assert_eq!(output.status.code(), Some(1));
}
