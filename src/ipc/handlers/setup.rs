use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::helpers::{canonical_usn, get_required_i64, get_required_str};
use crate::ipc::types::{AppState, Request};
use chrono::NaiveTime;
use rusqlite::Connection;
use serde_json::json;

fn teachers_register(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let name = get_required_str(params, "name")?.trim().to_string();
    let email = get_required_str(params, "email")?.trim().to_string();
    let federated_uid = get_required_str(params, "federatedUid")?.trim().to_string();
    if name.is_empty() || email.is_empty() || federated_uid.is_empty() {
        return Err(HandlerErr::bad_params(
            "name, email and federatedUid must not be empty",
        ));
    }

    conn.execute(
        "INSERT INTO teachers(name, email, federated_uid) VALUES(?, ?, ?)",
        (&name, &email, &federated_uid),
    )
    .map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "teachers" })),
    })?;

    Ok(json!({ "teacherId": conn.last_insert_rowid() }))
}

fn timetable_add(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = get_required_i64(params, "teacherId")?;
    let section = get_required_str(params, "section")?.trim().to_string();
    let subject = get_required_str(params, "subject")?.trim().to_string();
    let weekday = get_required_str(params, "weekday")?.trim().to_string();
    let start_time = get_required_str(params, "startTime")?.trim().to_string();
    let end_time = get_required_str(params, "endTime")?.trim().to_string();
    if section.is_empty() || subject.is_empty() || weekday.is_empty() {
        return Err(HandlerErr::bad_params(
            "section, subject and weekday must not be empty",
        ));
    }
    for (key, value) in [("startTime", &start_time), ("endTime", &end_time)] {
        if NaiveTime::parse_from_str(value, "%H:%M").is_err() {
            return Err(HandlerErr::bad_params(format!(
                "{} must be HH:MM, got '{}'",
                key, value
            )));
        }
    }

    conn.execute(
        "INSERT INTO timetable(teacher_id, section, subject, weekday, start_time, end_time)
         VALUES(?, ?, ?, ?, ?, ?)",
        (&teacher_id, &section, &subject, &weekday, &start_time, &end_time),
    )
    .map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "timetable" })),
    })?;

    Ok(json!({ "classId": conn.last_insert_rowid() }))
}

fn students_upsert(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let usn = canonical_usn(&get_required_str(params, "usn")?);
    let name_raw = get_required_str(params, "studentName")?;
    let section = get_required_str(params, "studentSection")?.trim().to_string();
    if usn.is_empty() || section.is_empty() {
        return Err(HandlerErr::bad_params("usn and studentSection must not be empty"));
    }

    // Enrollment kiosks tend to paste the USN into the name field; strip it.
    let name = name_raw.replace(&usn, "").trim().to_string();
    if name.is_empty() {
        return Err(HandlerErr::bad_params("studentName must not be empty"));
    }

    conn.execute(
        "INSERT INTO students(usn, student_name, section)
         VALUES(?, ?, ?)
         ON CONFLICT(usn) DO UPDATE SET
           student_name = excluded.student_name,
           section = excluded.section",
        (&usn, &name, &section),
    )
    .map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "students" })),
    })?;

    Ok(json!({ "usn": usn }))
}

fn handle_teachers_register(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match teachers_register(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_timetable_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match timetable_add(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_students_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match students_upsert(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "teachers.register" => Some(handle_teachers_register(state, req)),
        "timetable.add" => Some(handle_timetable_add(state, req)),
        "students.upsert" => Some(handle_students_upsert(state, req)),
        _ => None,
    }
}
