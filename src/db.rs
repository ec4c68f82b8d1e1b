use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "classdesk.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            code TEXT,
            archived INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS trainers(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT,
            active INTEGER NOT NULL DEFAULT 1
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS batches(
            id TEXT PRIMARY KEY,
            course_id TEXT NOT NULL,
            title TEXT NOT NULL,
            employee_id TEXT,
            start_date TEXT,
            end_date TEXT,
            start_time TEXT,
            end_time TEXT,
            archived INTEGER NOT NULL DEFAULT 0,
            created_at TEXT,
            updated_at TEXT,
            FOREIGN KEY(course_id) REFERENCES courses(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_batches_course ON batches(course_id)",
        [],
    )?;

    // Existing workspaces may predate trainer assignment on batches.
    ensure_batches_employee_id(&conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schedules(
            id TEXT PRIMARY KEY,
            batch_id TEXT NOT NULL,
            course_id TEXT NOT NULL,
            employee_id TEXT NOT NULL,
            scheduled_date TEXT NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            recurrence_type TEXT NOT NULL,
            days_of_week_json TEXT NOT NULL DEFAULT '[]',
            class_link TEXT,
            is_online INTEGER NOT NULL DEFAULT 0,
            archived INTEGER NOT NULL DEFAULT 0,
            created_at TEXT,
            updated_at TEXT,
            FOREIGN KEY(batch_id) REFERENCES batches(id),
            FOREIGN KEY(course_id) REFERENCES courses(id),
            FOREIGN KEY(employee_id) REFERENCES trainers(id)
        )",
        [],
    )?;
    ensure_schedules_class_link(&conn)?;
    ensure_schedules_is_online(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_schedules_batch ON schedules(batch_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_schedules_course ON schedules(course_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_schedules_employee ON schedules(employee_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_schedules_date ON schedules(scheduled_date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

fn ensure_batches_employee_id(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "batches", "employee_id")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE batches ADD COLUMN employee_id TEXT", [])?;
    Ok(())
}

fn ensure_schedules_class_link(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "schedules", "class_link")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE schedules ADD COLUMN class_link TEXT", [])?;
    Ok(())
}

fn ensure_schedules_is_online(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "schedules", "is_online")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE schedules ADD COLUMN is_online INTEGER NOT NULL DEFAULT 0",
        [],
    )?;
    Ok(())
}

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row("SELECT value FROM settings WHERE key = ?", [key], |r| {
            r.get(0)
        })
        .optional()?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    Ok(Some(serde_json::from_str(&raw)?))
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    let raw = serde_json::to_string(value)?;
    conn.execute(
        "INSERT INTO settings(key, value) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        (key, raw),
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
