use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rusqlite_migration::{Migrations, M};

use crate::app::{CoursewareError, Result};
use crate::domain::{
    CourseStructure, DownloadModel, DownloadedState, EnrolledCourse, FileType, TokenPair, User,
};
use crate::store::Store;

const DOWNLOAD_COLUMNS: &str =
    "id, course_id, title, size, path, url, file_type, state, last_modified";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        let migrations = Migrations::new(vec![M::up(include_str!(
            "../../migrations/001-initial/up.sql"
        ))]);

        let mut conn = self.conn()?;

        conn.execute("PRAGMA foreign_keys = ON", [])?;
        migrations
            .to_latest(&mut conn)
            .map_err(|_| CoursewareError::Database(rusqlite::Error::InvalidQuery))?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| {
            CoursewareError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(1),
                Some(e.to_string()),
            ))
        })
    }

    fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| s.parse::<DateTime<Utc>>().ok())
    }

    fn download_from_row(row: &Row<'_>) -> rusqlite::Result<DownloadModel> {
        Ok(DownloadModel {
            id: row.get(0)?,
            course_id: row.get(1)?,
            title: row.get(2)?,
            size: row.get::<_, i64>(3)?.max(0) as u64,
            path: PathBuf::from(row.get::<_, String>(4)?),
            url: row.get(5)?,
            file_type: FileType::parse(&row.get::<_, String>(6)?),
            state: DownloadedState::parse(&row.get::<_, String>(7)?),
            last_modified: row
                .get::<_, Option<String>>(8)?
                .and_then(|s| Self::parse_datetime(&s)),
        })
    }

    /// Make sure the single session row exists before a partial update.
    fn ensure_session_row(conn: &Connection) -> Result<()> {
        conn.execute(
            "INSERT OR IGNORE INTO session (id, updated_at) VALUES (1, ?1)",
            params![Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

impl Store for SqliteStore {
    fn load_tokens(&self) -> Result<Option<TokenPair>> {
        let conn = self.conn()?;

        let result = conn
            .query_row(
                "SELECT access_token, refresh_token FROM session WHERE id = 1",
                [],
                |row| {
                    Ok(TokenPair {
                        access_token: row.get(0)?,
                        refresh_token: row.get(1)?,
                    })
                },
            )
            .optional()?;

        Ok(result.filter(|t| !t.is_empty()))
    }

    fn save_tokens(&self, tokens: &TokenPair) -> Result<()> {
        let conn = self.conn()?;
        Self::ensure_session_row(&conn)?;

        conn.execute(
            "UPDATE session SET access_token = ?1, refresh_token = ?2, updated_at = ?3 WHERE id = 1",
            params![
                tokens.access_token,
                tokens.refresh_token,
                Utc::now().to_rfc3339()
            ],
        )?;

        Ok(())
    }

    fn load_user(&self) -> Result<Option<User>> {
        let conn = self.conn()?;

        let json: Option<Option<String>> = conn
            .query_row("SELECT user_json FROM session WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;

        match json.flatten() {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn save_user(&self, user: &User) -> Result<()> {
        let json = serde_json::to_string(user)?;
        let conn = self.conn()?;
        Self::ensure_session_row(&conn)?;

        conn.execute(
            "UPDATE session SET user_json = ?1, updated_at = ?2 WHERE id = 1",
            params![json, Utc::now().to_rfc3339()],
        )?;

        Ok(())
    }

    fn clear_session(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM session", [])?;
        Ok(())
    }

    fn get_course_structure(&self, course_id: &str) -> Result<Option<CourseStructure>> {
        let conn = self.conn()?;

        let json: Option<String> = conn
            .query_row(
                "SELECT data FROM course_structures WHERE course_id = ?1",
                params![course_id],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn save_course_structure(&self, structure: &CourseStructure) -> Result<()> {
        let json = serde_json::to_string(structure)?;
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO course_structures (course_id, data, fetched_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(course_id) DO UPDATE SET data = ?2, fetched_at = ?3",
            params![structure.id, json, Utc::now().to_rfc3339()],
        )?;

        Ok(())
    }

    fn get_enrolled_courses(&self, username: &str) -> Result<Vec<EnrolledCourse>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT data FROM enrolled_courses WHERE username = ?1 ORDER BY position",
        )?;

        let rows = stmt
            .query_map(params![username], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut courses = Vec::with_capacity(rows.len());
        for json in rows {
            courses.push(serde_json::from_str(&json)?);
        }

        Ok(courses)
    }

    fn replace_enrolled_courses(&self, username: &str, courses: &[EnrolledCourse]) -> Result<()> {
        let mut conn = self.conn()?;
        let now = Utc::now().to_rfc3339();

        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM enrolled_courses WHERE username = ?1",
            params![username],
        )?;

        for (position, course) in courses.iter().enumerate() {
            tx.execute(
                "INSERT OR REPLACE INTO enrolled_courses (username, course_id, position, data, fetched_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    username,
                    course.course_id,
                    position as i64,
                    serde_json::to_string(course)?,
                    now
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn add_downloads(&self, downloads: &[DownloadModel]) -> Result<usize> {
        let mut conn = self.conn()?;

        let tx = conn.transaction()?;
        let mut count = 0;

        for download in downloads {
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO downloads (id, course_id, title, size, path, url, file_type, state, last_modified, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    download.id,
                    download.course_id,
                    download.title,
                    download.size as i64,
                    download.path.to_string_lossy(),
                    download.url,
                    download.file_type.as_str(),
                    download.state.as_str(),
                    download.last_modified.map(|dt| dt.to_rfc3339()),
                    Utc::now().to_rfc3339()
                ],
            )?;
            count += inserted;
        }

        tx.commit()?;
        Ok(count)
    }

    fn get_download(&self, id: &str) -> Result<Option<DownloadModel>> {
        let conn = self.conn()?;

        let result = conn
            .query_row(
                &format!("SELECT {} FROM downloads WHERE id = ?1", DOWNLOAD_COLUMNS),
                params![id],
                Self::download_from_row,
            )
            .optional()?;

        Ok(result)
    }

    fn get_all_downloads(&self) -> Result<Vec<DownloadModel>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM downloads ORDER BY created_at, rowid",
            DOWNLOAD_COLUMNS
        ))?;

        let downloads = stmt
            .query_map([], Self::download_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(downloads)
    }

    fn get_downloads_by_state(&self, state: DownloadedState) -> Result<Vec<DownloadModel>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM downloads WHERE state = ?1 ORDER BY created_at, rowid",
            DOWNLOAD_COLUMNS
        ))?;

        let downloads = stmt
            .query_map(params![state.as_str()], Self::download_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(downloads)
    }

    fn update_download(&self, download: &DownloadModel) -> Result<()> {
        let conn = self.conn()?;

        let updated = conn.execute(
            "UPDATE downloads SET title = ?1, size = ?2, path = ?3, url = ?4, file_type = ?5,
                    state = ?6, last_modified = ?7
             WHERE id = ?8",
            params![
                download.title,
                download.size as i64,
                download.path.to_string_lossy(),
                download.url,
                download.file_type.as_str(),
                download.state.as_str(),
                download.last_modified.map(|dt| dt.to_rfc3339()),
                download.id
            ],
        )?;

        if updated == 0 {
            return Err(CoursewareError::DownloadNotFound(download.id.clone()));
        }

        Ok(())
    }

    fn remove_download(&self, id: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM downloads WHERE id = ?1", params![id])?;
        Ok(())
    }
}
