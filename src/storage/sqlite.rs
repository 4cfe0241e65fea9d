//! SQLite backend.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};

use super::{CompanyStore, StoreStats, parse_flags};
use crate::error::{AppError, Result};
use crate::models::{ClassifiedJob, NoiseRecord};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS seed_companies (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    company_name        TEXT NOT NULL COLLATE NOCASE,
    company_url         TEXT NOT NULL,
    visited             INTEGER NOT NULL DEFAULT 0,
    testimonial_scraped INTEGER NOT NULL DEFAULT 0,
    job_scraped         INTEGER NOT NULL DEFAULT 0,
    created_at          TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE UNIQUE INDEX IF NOT EXISTS uniq_seed_company_url ON seed_companies (company_url);
CREATE UNIQUE INDEX IF NOT EXISTS uniq_seed_company_name ON seed_companies (company_name COLLATE NOCASE);

CREATE TABLE IF NOT EXISTS jobs (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    seed_company_id INTEGER NOT NULL REFERENCES seed_companies(id) ON DELETE CASCADE,
    job_title       TEXT NOT NULL COLLATE NOCASE,
    job_url         TEXT NOT NULL,
    is_engineering  INTEGER NOT NULL DEFAULT 0,
    job_type        TEXT NOT NULL DEFAULT 'other',
    created_at      TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE UNIQUE INDEX IF NOT EXISTS uniq_job ON jobs (seed_company_id, job_title COLLATE NOCASE);
CREATE INDEX IF NOT EXISTS idx_jobs_engineering ON jobs (is_engineering);

CREATE TABLE IF NOT EXISTS noise (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    seed_company_id INTEGER NOT NULL REFERENCES seed_companies(id) ON DELETE CASCADE,
    noise_url       TEXT NOT NULL,
    noise_text      TEXT NOT NULL,
    created_at      TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE UNIQUE INDEX IF NOT EXISTS uniq_noise_url ON noise (noise_url);
CREATE INDEX IF NOT EXISTS idx_noise_company ON noise (seed_company_id);

CREATE TABLE IF NOT EXISTS testimonial_companies (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    seed_company_id INTEGER NOT NULL REFERENCES seed_companies(id) ON DELETE CASCADE,
    company_name    TEXT NOT NULL COLLATE NOCASE,
    created_at      TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE UNIQUE INDEX IF NOT EXISTS uniq_testimonial_name ON testimonial_companies (company_name COLLATE NOCASE);
CREATE INDEX IF NOT EXISTS idx_testimonial_company ON testimonial_companies (seed_company_id);
"#;

/// SQLite-backed store. The connection is shared behind a mutex and all
/// queries run on the blocking pool.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database file and apply the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        log::info!("Opened database {}", path.display());
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        log::debug!("SQLite journal mode: {}", mode);
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| AppError::Io(std::io::Error::other("database lock poisoned")))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| AppError::Io(std::io::Error::other(e)))?
    }
}

fn count(conn: &Connection, sql: &str) -> Result<usize> {
    let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
    Ok(usize::try_from(n).unwrap_or_default())
}

#[async_trait]
impl CompanyStore for SqliteStore {
    async fn upsert_seed_company(&self, name: &str, url: &str) -> Result<i64> {
        let (name, url) = (name.trim().to_string(), url.trim().to_string());
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let existing: Option<i64> = tx
                .query_row(
                    "SELECT id FROM seed_companies
                     WHERE company_url = ?1 OR company_name = ?2 COLLATE NOCASE
                     ORDER BY id LIMIT 1",
                    params![url, name],
                    |row| row.get(0),
                )
                .optional()?;

            let id = match existing {
                Some(id) => {
                    tx.execute(
                        "UPDATE seed_companies SET visited = 1 WHERE id = ?1",
                        params![id],
                    )?;
                    id
                }
                None => {
                    tx.execute(
                        "INSERT INTO seed_companies (company_name, company_url, visited)
                         VALUES (?1, ?2, 1)",
                        params![name, url],
                    )?;
                    tx.last_insert_rowid()
                }
            };
            tx.commit()?;
            Ok(id)
        })
        .await
    }

    async fn upsert_jobs(&self, company_id: i64, jobs: &[ClassifiedJob]) -> Result<usize> {
        if jobs.is_empty() {
            return Ok(0);
        }
        let jobs = jobs.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let mut inserted = 0;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR IGNORE INTO jobs
                     (seed_company_id, job_title, job_url, is_engineering, job_type)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                for job in &jobs {
                    inserted += stmt.execute(params![
                        company_id,
                        job.link.text,
                        job.link.url,
                        job.classification.is_engineering(),
                        job.classification.as_str(),
                    ])?;
                }
            }
            tx.commit()?;
            Ok(inserted)
        })
        .await
    }

    async fn upsert_noise(&self, company_id: i64, noise: &[NoiseRecord]) -> Result<usize> {
        if noise.is_empty() {
            return Ok(0);
        }
        let noise = noise.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let mut inserted = 0;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR IGNORE INTO noise (seed_company_id, noise_url, noise_text)
                     VALUES (?1, ?2, ?3)",
                )?;
                for record in &noise {
                    inserted += stmt.execute(params![company_id, record.url, record.text])?;
                }
            }
            tx.commit()?;
            Ok(inserted)
        })
        .await
    }

    async fn upsert_testimonials(&self, company_id: i64, names: &[String]) -> Result<usize> {
        let names: Vec<String> = names
            .iter()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect();
        if names.is_empty() {
            return Ok(0);
        }
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let mut inserted = 0;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR IGNORE INTO testimonial_companies (seed_company_id, company_name)
                     VALUES (?1, ?2)",
                )?;
                for name in &names {
                    inserted += stmt.execute(params![company_id, name])?;
                }
            }
            tx.commit()?;
            Ok(inserted)
        })
        .await
    }

    async fn update_company_flags(
        &self,
        company_id: i64,
        flags: &BTreeMap<String, bool>,
    ) -> Result<()> {
        let flags = parse_flags(flags)?;
        if flags.is_empty() {
            return Ok(());
        }
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            for (flag, value) in &flags {
                // Column names come from the allow-listed enum, never from input.
                let sql = format!(
                    "UPDATE seed_companies SET {} = ?1 WHERE id = ?2",
                    flag.column()
                );
                tx.execute(&sql, params![value, company_id])?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn stats(&self) -> Result<StoreStats> {
        self.with_conn(|conn| {
            Ok(StoreStats {
                companies: count(conn, "SELECT COUNT(*) FROM seed_companies")?,
                jobs: count(conn, "SELECT COUNT(*) FROM jobs")?,
                engineering_jobs: count(conn, "SELECT COUNT(*) FROM jobs WHERE is_engineering = 1")?,
                noise: count(conn, "SELECT COUNT(*) FROM noise")?,
                testimonials: count(conn, "SELECT COUNT(*) FROM testimonial_companies")?,
                job_scraped: count(
                    conn,
                    "SELECT COUNT(*) FROM seed_companies WHERE job_scraped = 1",
                )?,
                testimonial_scraped: count(
                    conn,
                    "SELECT COUNT(*) FROM seed_companies WHERE testimonial_scraped = 1",
                )?,
            })
        })
        .await
    }
}
