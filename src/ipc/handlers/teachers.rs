use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::helpers::{get_optional_str, get_required_i64, get_required_str};
use crate::ipc::types::{AppState, Request};
use crate::schedule;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

fn teacher_info(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let federated_uid = get_required_str(params, "federatedUid")?;

    let row = conn
        .query_row(
            "SELECT teacher_id, name, email FROM teachers WHERE federated_uid = ?",
            [federated_uid.trim()],
            |r| {
                Ok(json!({
                    "teacherId": r.get::<_, i64>(0)?,
                    "name": r.get::<_, String>(1)?,
                    "email": r.get::<_, String>(2)?
                }))
            },
        )
        .optional()?;

    row.ok_or_else(|| HandlerErr::not_found("teacher not found"))
}

fn teacher_classes(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = get_required_i64(params, "teacherId")?;
    let fake_time = get_optional_str(params, "fakeTime");

    let weekday = schedule::resolve_weekday(fake_time.as_deref())
        .map_err(|e| HandlerErr::bad_params(e.to_string()))?;

    let mut stmt = conn.prepare(
        "SELECT class_id, section, subject, weekday, start_time, end_time
         FROM timetable
         WHERE teacher_id = ? AND LOWER(weekday) = LOWER(?)
         ORDER BY start_time",
    )?;
    let classes = stmt
        .query_map((teacher_id, &weekday), |r| {
            Ok(json!({
                "classId": r.get::<_, i64>(0)?,
                "section": r.get::<_, String>(1)?,
                "subject": r.get::<_, String>(2)?,
                "weekday": r.get::<_, String>(3)?,
                "startTime": r.get::<_, String>(4)?,
                "endTime": r.get::<_, String>(5)?
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    Ok(json!({ "weekday": weekday, "classes": classes }))
}

fn handle_teacher_info(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match teacher_info(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_teacher_classes(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match teacher_classes(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "teacher.info" => Some(handle_teacher_info(state, req)),
        "teacher.classes" => Some(handle_teacher_classes(state, req)),
        _ => None,
    }
}
