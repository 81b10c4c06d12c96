use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_daemon() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_classsightd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn classsightd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

#[test]
fn proof_lookup_resolves_per_student_image() {
    let workspace = temp_dir("classsight-proofs-ws");
    let proofs = temp_dir("classsight-proofs-blob");
    std::fs::write(proofs.join("1CS001.jpg"), b"jpegbytes").expect("write proof");

    let (mut child, mut stdin, mut reader) = spawn_daemon();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({
            "path": workspace.to_string_lossy(),
            "proofsDir": proofs.to_string_lossy()
        }),
    );

    // USN is canonicalized before filename resolution.
    let hit = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "proof.lookup",
        json!({ "studentUsn": " 1cs001 ", "date": "2025-03-10" }),
    );
    assert_eq!(hit.get("exists").and_then(|v| v.as_bool()), Some(true));
    let path = hit.get("path").and_then(|v| v.as_str()).expect("path");
    assert!(path.ends_with("1CS001.jpg"), "unexpected path {}", path);

    // The date parameter plays no part: a different date finds the same image.
    let other_day = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "proof.lookup",
        json!({ "studentUsn": "1CS001", "date": "1999-01-01" }),
    );
    assert_eq!(other_day.get("exists").and_then(|v| v.as_bool()), Some(true));

    let miss = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "proof.lookup",
        json!({ "studentUsn": "1CS999" }),
    );
    assert_eq!(miss.get("exists").and_then(|v| v.as_bool()), Some(false));
    assert!(miss.get("message").and_then(|v| v.as_str()).is_some());

    drop(stdin);
    let _ = child.wait();

    // A session with no proofsDir reports unconfigured rather than missing.
    let (mut child2, mut stdin2, mut reader2) = spawn_daemon();
    let _ = request_ok(
        &mut stdin2,
        &mut reader2,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let unconfigured = request_ok(
        &mut stdin2,
        &mut reader2,
        "2",
        "proof.lookup",
        json!({ "studentUsn": "1CS001" }),
    );
    assert_eq!(unconfigured.get("exists").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        unconfigured.get("message").and_then(|v| v.as_str()),
        Some("proof directory not configured")
    );

    drop(stdin2);
    let _ = child2.wait();
    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(proofs);
}
