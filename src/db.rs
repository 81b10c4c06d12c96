use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("classsight.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            teacher_id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            federated_uid TEXT NOT NULL UNIQUE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS timetable(
            class_id INTEGER PRIMARY KEY,
            teacher_id INTEGER NOT NULL,
            section TEXT NOT NULL,
            subject TEXT NOT NULL,
            weekday TEXT NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            FOREIGN KEY(teacher_id) REFERENCES teachers(teacher_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_timetable_teacher ON timetable(teacher_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            usn TEXT PRIMARY KEY,
            student_name TEXT NOT NULL,
            section TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_section ON students(section)",
        [],
    )?;

    // One table for both camera feeds, parameterized by camera id. Append-only;
    // duplicate sightings are allowed and presence queries use existence.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS detections(
            camera INTEGER NOT NULL,
            class_id INTEGER NOT NULL,
            student_usn TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_detections_class_student
         ON detections(class_id, student_usn, camera)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            class_id INTEGER NOT NULL,
            student_usn TEXT NOT NULL,
            date TEXT NOT NULL,
            status TEXT NOT NULL,
            PRIMARY KEY(class_id, date, student_usn)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS final_attendance(
            class_id INTEGER NOT NULL,
            student_usn TEXT NOT NULL,
            date TEXT NOT NULL,
            final_status TEXT NOT NULL,
            teacher_id INTEGER NOT NULL,
            locked_at TEXT NOT NULL,
            PRIMARY KEY(class_id, date, student_usn)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_final_attendance_class_date
         ON final_attendance(class_id, date)",
        [],
    )?;

    // Older workspaces kept one table per camera. Fold them into detections.
    migrate_legacy_camera_tables(&conn)?;

    Ok(conn)
}

fn migrate_legacy_camera_tables(conn: &Connection) -> anyhow::Result<()> {
    for (camera, table) in [(1, "attendance_cam1"), (2, "attendance_cam2")] {
        if !table_exists(conn, table)? {
            continue;
        }
        conn.execute(
            &format!(
                "INSERT INTO detections(camera, class_id, student_usn)
                 SELECT {}, class_id, student_usn FROM {}",
                camera, table
            ),
            [],
        )?;
        conn.execute(&format!("DROP TABLE {}", table), [])?;
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> anyhow::Result<bool> {
    let mut stmt =
        conn.prepare("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?")?;
    let mut rows = stmt.query([table])?;
    Ok(rows.next()?.is_some())
}
