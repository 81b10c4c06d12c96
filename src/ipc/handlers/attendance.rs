use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::helpers::{canonical_usn, get_optional_str, get_required_i64};
use crate::ipc::types::{AppState, Request};
use crate::schedule;
use chrono::Utc;
use rusqlite::Connection;
use serde_json::json;

fn resolve_date_param(params: &serde_json::Value) -> Result<String, HandlerErr> {
    let date = get_optional_str(params, "date");
    schedule::resolve_date(date.as_deref()).map_err(|e| HandlerErr::bad_params(e.to_string()))
}

/// Replace the whole working copy for (class, date). Not a merge: a student
/// omitted from the payload loses their working row and reads back as Absent.
fn attendance_save(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_i64(params, "classId")?;
    let date = resolve_date_param(params)?;
    let Some(records_json) = params.get("records").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing records"));
    };

    // Validate the full payload before the first storage write.
    let mut records: Vec<(String, String)> = Vec::with_capacity(records_json.len());
    for item in records_json {
        let usn = item
            .get("studentUsn")
            .and_then(|v| v.as_str())
            .ok_or_else(|| HandlerErr::bad_params("records[].studentUsn must be a string"))?;
        let usn = canonical_usn(usn);
        if usn.is_empty() {
            return Err(HandlerErr::bad_params("records[].studentUsn must not be empty"));
        }
        let status = item
            .get("status")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .ok_or_else(|| HandlerErr::bad_params("records[].status must be a string"))?;
        if status != "Present" && status != "Absent" {
            return Err(HandlerErr::bad_params(format!(
                "records[].status must be Present or Absent, got '{}'",
                status
            )));
        }
        records.push((usn, status.to_string()));
    }

    let tx = conn.unchecked_transaction().map_err(|e| HandlerErr {
        code: "db_tx_failed",
        message: e.to_string(),
        details: None,
    })?;
    tx.execute(
        "DELETE FROM attendance WHERE class_id = ? AND date = ?",
        (class_id, &date),
    )
    .map_err(|e| HandlerErr {
        code: "db_delete_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "attendance" })),
    })?;
    for (usn, status) in &records {
        tx.execute(
            "INSERT INTO attendance(class_id, student_usn, date, status)
             VALUES(?, ?, ?, ?)",
            (class_id, usn, &date, status),
        )
        .map_err(|e| HandlerErr {
            code: "db_insert_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "attendance" })),
        })?;
    }
    tx.commit().map_err(|e| HandlerErr {
        code: "db_commit_failed",
        message: e.to_string(),
        details: None,
    })?;

    Ok(json!({ "rows": records.len(), "date": date }))
}

fn attendance_revoke(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_i64(params, "classId")?;
    let date = resolve_date_param(params)?;

    // Idempotent: revoking a day with no working rows deletes nothing.
    conn.execute(
        "DELETE FROM attendance WHERE class_id = ? AND date = ?",
        (class_id, &date),
    )
    .map_err(|e| HandlerErr {
        code: "db_delete_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "attendance" })),
    })?;

    Ok(json!({ "ok": true, "date": date }))
}

/// Lock the working copy into the final ledger. Upsert per student: a second
/// finalize overwrites status, teacher and lock timestamp, never adds rows.
fn attendance_finalize(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_i64(params, "classId")?;
    let teacher_id = get_required_i64(params, "teacherId")?;
    let date = resolve_date_param(params)?;

    let mut stmt = conn.prepare(
        "SELECT student_usn, status FROM attendance WHERE class_id = ? AND date = ?",
    )?;
    let rows = stmt
        .query_map((class_id, &date), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    // Finalizing an untouched day is a legal no-op, not an error.
    if rows.is_empty() {
        return Ok(json!({
            "rows": 0,
            "date": date,
            "note": "no working attendance to finalize"
        }));
    }

    let locked_at = Utc::now().to_rfc3339();
    let tx = conn.unchecked_transaction().map_err(|e| HandlerErr {
        code: "db_tx_failed",
        message: e.to_string(),
        details: None,
    })?;
    for (usn, status) in &rows {
        let final_status = if status.trim().is_empty() {
            "Absent"
        } else {
            status.as_str()
        };
        tx.execute(
            "INSERT INTO final_attendance(class_id, student_usn, date, final_status, teacher_id, locked_at)
             VALUES(?, ?, ?, ?, ?, ?)
             ON CONFLICT(class_id, date, student_usn) DO UPDATE SET
               final_status = excluded.final_status,
               teacher_id = excluded.teacher_id,
               locked_at = excluded.locked_at",
            (class_id, usn, &date, final_status, teacher_id, &locked_at),
        )
        .map_err(|e| HandlerErr {
            code: "db_update_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "final_attendance" })),
        })?;
    }
    tx.commit().map_err(|e| HandlerErr {
        code: "db_commit_failed",
        message: e.to_string(),
        details: None,
    })?;

    Ok(json!({ "rows": rows.len(), "date": date }))
}

fn attendance_finalized(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_i64(params, "classId")?;
    let date = resolve_date_param(params)?;

    let mut stmt = conn.prepare(
        "SELECT student_usn, final_status, teacher_id, locked_at
         FROM final_attendance
         WHERE class_id = ? AND date = ?
         ORDER BY student_usn ASC",
    )?;
    let records = stmt
        .query_map((class_id, &date), |r| {
            Ok(json!({
                "studentUsn": r.get::<_, String>(0)?,
                "finalStatus": r.get::<_, String>(1)?,
                "teacherId": r.get::<_, i64>(2)?,
                "lockedAt": r.get::<_, String>(3)?
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    Ok(json!({ "records": records, "date": date }))
}

fn handle_attendance_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match attendance_save(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_attendance_revoke(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match attendance_revoke(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_attendance_finalize(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match attendance_finalize(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_attendance_finalized(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match attendance_finalized(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.save" => Some(handle_attendance_save(state, req)),
        "attendance.revoke" => Some(handle_attendance_revoke(state, req)),
        "attendance.finalize" => Some(handle_attendance_finalize(state, req)),
        "attendance.finalized" => Some(handle_attendance_finalized(state, req)),
        _ => None,
    }
}
