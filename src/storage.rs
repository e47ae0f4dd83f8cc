use crate::api::models::Group;
use crate::error::Result;
use directories::ProjectDirs;
use rusqlite::{params, Connection};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const DEFAULT_LIMIT: usize = 500;

pub fn default_path() -> Option<PathBuf> {
    let proj = ProjectDirs::from("com", "roundup", "RoundUp")?;
    Some(proj.data_dir().join("cache.sqlite"))
}

fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Local mirror of discovered groups so lists render before the network answers.
/// Never authoritative: the backend owns every record.
pub struct Cache {
    conn: Connection,
}

impl Cache {
    pub fn open(path: &Path) -> Result<Self> {
        ensure_dir(path)?;
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            CREATE TABLE IF NOT EXISTS groups (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                raw_json TEXT NOT NULL
            );
            "#,
        )?;
        Ok(Self { conn })
    }

    pub fn upsert_groups(&mut self, groups: &[Group]) -> Result<()> {
        let now = now_secs();
        let tx = self.conn.transaction()?;
        for g in groups {
            let raw = serde_json::to_string(g)?;
            tx.execute(
                r#"
                INSERT INTO groups (id, name, updated_at, raw_json)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(id) DO UPDATE SET
                    name=excluded.name,
                    updated_at=excluded.updated_at,
                    raw_json=excluded.raw_json
                "#,
                params![g.id, g.name, now, raw],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Rows whose JSON no longer decodes are skipped.
    pub fn get_groups(&self, limit: Option<usize>) -> Result<Vec<Group>> {
        let mut stmt = self
            .conn
            .prepare("SELECT raw_json FROM groups ORDER BY updated_at DESC, name ASC LIMIT ?1")?;
        let lim = limit.unwrap_or(DEFAULT_LIMIT) as i64;
        let rows = stmt.query_map(params![lim], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for raw in rows {
            let raw = raw?;
            match serde_json::from_str::<Group>(&raw) {
                Ok(group) => out.push(group),
                Err(e) => log::warn!("dropping unreadable cached group: {e}"),
            }
        }
        Ok(out)
    }

    /// Unix time of the most recent upsert, `None` while the cache is empty.
    pub fn last_synced_at(&self) -> Result<Option<i64>> {
        let ts: Option<i64> = self.conn.query_row("SELECT MAX(updated_at) FROM groups", [], |row| row.get(0))?;
        Ok(ts)
    }
}
