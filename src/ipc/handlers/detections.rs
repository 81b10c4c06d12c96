use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::helpers::{canonical_usn, get_required_i64, get_required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

/// Append one camera sighting. The ledger is append-only and unvalidated:
/// duplicates are harmless (presence reads use existence) and a bogus
/// (class, student) pair is the detection pipeline's mistake to make.
fn detections_record(
    conn: &rusqlite::Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let camera = get_required_i64(params, "camera")?;
    if camera != 1 && camera != 2 {
        return Err(HandlerErr::bad_params(format!(
            "camera must be 1 or 2, got {}",
            camera
        )));
    }
    let class_id = get_required_i64(params, "classId")?;
    let usn = canonical_usn(&get_required_str(params, "studentUsn")?);
    if usn.is_empty() {
        return Err(HandlerErr::bad_params("studentUsn must not be empty"));
    }

    conn.execute(
        "INSERT INTO detections(camera, class_id, student_usn) VALUES(?, ?, ?)",
        (camera, class_id, &usn),
    )
    .map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "detections" })),
    })?;

    Ok(json!({ "ok": true, "camera": camera }))
}

fn handle_detections_record(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match detections_record(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "detections.record" => Some(handle_detections_record(state, req)),
        _ => None,
    }
}
