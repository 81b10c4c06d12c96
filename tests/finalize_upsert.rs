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
fn finalize_upserts_instead_of_duplicating() {
    let workspace = temp_dir("classsight-finalize-upsert");
    let (mut child, mut stdin, mut reader) = spawn_daemon();
    let date = "2025-03-10";

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let teacher_a = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "teachers.register",
        json!({ "name": "First Locker", "email": "a@school.test", "federatedUid": "fed-a" }),
    )
    .get("teacherId")
    .and_then(|v| v.as_i64())
    .expect("teacherId");
    let teacher_b = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "teachers.register",
        json!({ "name": "Second Locker", "email": "b@school.test", "federatedUid": "fed-b" }),
    )
    .get("teacherId")
    .and_then(|v| v.as_i64())
    .expect("teacherId");
    let class_id = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "timetable.add",
        json!({
            "teacherId": teacher_a,
            "section": "B",
            "subject": "Chemistry",
            "weekday": "Monday",
            "startTime": "09:00",
            "endTime": "10:00"
        }),
    )
    .get("classId")
    .and_then(|v| v.as_i64())
    .expect("classId");

    // Finalizing before any save is a zero-row no-op with a note.
    let empty = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "attendance.finalize",
        json!({ "classId": class_id, "teacherId": teacher_a, "date": date }),
    );
    assert_eq!(empty.get("rows").and_then(|v| v.as_i64()), Some(0));
    assert!(empty.get("note").and_then(|v| v.as_str()).is_some());
    let ledger = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "attendance.finalized",
        json!({ "classId": class_id, "date": date }),
    );
    assert_eq!(
        ledger.get("records").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(0)
    );

    // First lock: two students.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "attendance.save",
        json!({
            "classId": class_id,
            "date": date,
            "records": [
                { "studentUsn": "1CS010", "status": "Present" },
                { "studentUsn": "1CS011", "status": "Absent" }
            ]
        }),
    );
    let first = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "attendance.finalize",
        json!({ "classId": class_id, "teacherId": teacher_a, "date": date }),
    );
    assert_eq!(first.get("rows").and_then(|v| v.as_i64()), Some(2));

    // Second lock with different contents and a different teacher: the
    // overlapping rows are updated in place, never duplicated.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "attendance.save",
        json!({
            "classId": class_id,
            "date": date,
            "records": [
                { "studentUsn": "1CS010", "status": "Absent" },
                { "studentUsn": "1CS011", "status": "Present" },
                { "studentUsn": "1CS012", "status": "Present" }
            ]
        }),
    );
    let second = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "attendance.finalize",
        json!({ "classId": class_id, "teacherId": teacher_b, "date": date }),
    );
    assert_eq!(second.get("rows").and_then(|v| v.as_i64()), Some(3));

    let ledger = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "attendance.finalized",
        json!({ "classId": class_id, "date": date }),
    );
    let records = ledger.get("records").and_then(|v| v.as_array()).expect("records");
    assert_eq!(records.len(), 3);
    for r in records {
        assert_eq!(r.get("teacherId").and_then(|v| v.as_i64()), Some(teacher_b));
        assert!(r.get("lockedAt").and_then(|v| v.as_str()).map(|s| !s.is_empty()).unwrap_or(false));
    }
    let by_usn: Vec<(&str, &str)> = records
        .iter()
        .map(|r| {
            (
                r.get("studentUsn").and_then(|v| v.as_str()).unwrap(),
                r.get("finalStatus").and_then(|v| v.as_str()).unwrap(),
            )
        })
        .collect();
    assert_eq!(
        by_usn,
        vec![
            ("1CS010", "Absent"),
            ("1CS011", "Present"),
            ("1CS012", "Present"),
        ]
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
