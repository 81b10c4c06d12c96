use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::helpers::{get_optional_str, get_required_i64};
use crate::ipc::types::{AppState, Request};
use crate::schedule;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

/// Working status, camera flags and roster membership merged into one read.
/// Membership is derived from the class's section at query time, so students
/// never have to be linked to a class row directly.
fn class_roster(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_i64(params, "classId")?;
    let date = get_optional_str(params, "date");
    let date_used = schedule::resolve_date(date.as_deref())
        .map_err(|e| HandlerErr::bad_params(e.to_string()))?;

    let section: Option<String> = conn
        .query_row(
            "SELECT section FROM timetable WHERE class_id = ?",
            [class_id],
            |r| r.get(0),
        )
        .optional()?;
    let Some(section) = section else {
        return Err(HandlerErr::not_found("class not found"));
    };

    // Camera flags via correlated subqueries: duplicate sightings are allowed
    // in detections, a join would fan out the roster rows.
    let mut stmt = conn.prepare(
        "SELECT
           s.usn,
           s.student_name,
           COALESCE(a.status, 'Absent') AS current_status,
           EXISTS(SELECT 1 FROM detections d
                  WHERE d.camera = 1 AND d.class_id = ?1 AND d.student_usn = s.usn) AS cam1_present,
           EXISTS(SELECT 1 FROM detections d
                  WHERE d.camera = 2 AND d.class_id = ?1 AND d.student_usn = s.usn) AS cam2_present
         FROM students s
         LEFT JOIN attendance a
           ON a.student_usn = s.usn
           AND a.class_id = ?1
           AND a.date = ?2
         WHERE TRIM(s.section) = TRIM(?3)
         ORDER BY s.usn ASC",
    )?;
    let students = stmt
        .query_map((class_id, &date_used, section.trim()), |r| {
            Ok(json!({
                "usn": r.get::<_, String>(0)?,
                "studentName": r.get::<_, String>(1)?,
                "currentStatus": r.get::<_, String>(2)?,
                "cam1Present": r.get::<_, i64>(3)? != 0,
                "cam2Present": r.get::<_, i64>(4)? != 0
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    Ok(json!({ "students": students, "dateUsed": date_used }))
}

fn handle_class_roster(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match class_roster(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "class.roster" => Some(handle_class_roster(state, req)),
        _ => None,
    }
}
