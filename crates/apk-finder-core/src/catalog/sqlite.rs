//! SQLite-based catalog implementation.

use super::traits::{CatalogEntry, CatalogStore};
use crate::config::ScanConfig;
use crate::error::{ApkFinderError, Result};
use crate::models::{top_level_directory, DirectoryMeta, FileRecord};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// SQLite-based catalog store.
///
/// Thread-safe via internal mutex on the connection. Each bucket is one row
/// holding its records as a JSON array.
pub struct SqliteCatalog {
    /// Database connection (wrapped for thread safety).
    conn: Arc<Mutex<Connection>>,
}

fn db_error(context: &str, e: rusqlite::Error) -> ApkFinderError {
    ApkFinderError::Database {
        message: format!("{}: {}", context, e),
        source: Some(e),
    }
}

fn parse_time(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Decode and validate a stored record list.
fn decode_files(share: &str, directory: &str, json: &str) -> Result<Vec<FileRecord>> {
    let files: Vec<FileRecord> = serde_json::from_str(json).map_err(|e| ApkFinderError::Json {
        message: format!("Corrupt catalog entry {}:{}: {}", share, directory, e),
        source: Some(e),
    })?;
    for record in &files {
        record.validate()?;
    }
    Ok(files)
}

impl SqliteCatalog {
    /// Open (or create) the catalog at the specified database path.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        // Create parent directory if needed
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ApkFinderError::Io {
                message: format!("Failed to create catalog directory: {}", e),
                path: Some(parent.to_path_buf()),
                source: Some(e),
            })?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| db_error("Failed to open catalog database", e))?;

        // Enable WAL mode for better concurrent access
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| db_error("Failed to set pragmas", e))?;

        Self::from_connection(conn)
    }

    /// Catalog that lives only as long as this value.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| db_error("Failed to open in-memory catalog", e))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let catalog = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        catalog.init_schema()?;
        Ok(catalog)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| ApkFinderError::Database {
            message: format!("Failed to lock database: {}", e),
            source: None,
        })
    }

    /// Initialize database schema.
    fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            -- One row per (share, top-level directory) bucket
            CREATE TABLE IF NOT EXISTS catalog_entries (
                share TEXT NOT NULL,
                directory TEXT NOT NULL,
                files TEXT NOT NULL,
                file_count INTEGER NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (share, directory)
            );

            -- Change-detection state per bucket
            CREATE TABLE IF NOT EXISTS directory_meta (
                share TEXT NOT NULL,
                directory TEXT NOT NULL,
                subdirectory_count INTEGER NOT NULL,
                last_scan_time TEXT,
                file_count INTEGER NOT NULL,
                PRIMARY KEY (share, directory)
            );
            "#,
        )
        .map_err(|e| db_error("Failed to initialize catalog schema", e))?;

        Ok(())
    }

    fn read_files(
        conn: &Connection,
        share: &str,
        directory: &str,
    ) -> Result<Option<Vec<FileRecord>>> {
        let json: Option<String> = conn
            .query_row(
                "SELECT files FROM catalog_entries WHERE share = ?1 AND directory = ?2",
                params![share, directory],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| db_error("Failed to query catalog entry", e))?;

        json.map(|j| decode_files(share, directory, &j)).transpose()
    }

    fn write_files(
        tx: &Transaction<'_>,
        share: &str,
        directory: &str,
        files: &[FileRecord],
    ) -> Result<()> {
        let json = serde_json::to_string(files)?;
        tx.execute(
            r#"
            INSERT OR REPLACE INTO catalog_entries
            (share, directory, files, file_count, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                share,
                directory,
                json,
                files.len() as i64,
                Utc::now().to_rfc3339()
            ],
        )
        .map_err(|e| db_error("Failed to write catalog entry", e))?;
        Ok(())
    }

    /// Apply `update` to one stored record inside a single transaction.
    fn update_record(
        &self,
        share: &str,
        relative_path: &str,
        update: impl FnOnce(&mut FileRecord),
    ) -> Result<bool> {
        let Some(directory) = top_level_directory(relative_path) else {
            return Ok(false);
        };

        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        let Some(mut files) = Self::read_files(&tx, share, directory)? else {
            return Ok(false);
        };
        let Some(record) = files.iter_mut().find(|r| r.relative_path == relative_path) else {
            return Ok(false);
        };
        update(record);

        Self::write_files(&tx, share, directory, &files)?;
        tx.commit()
            .map_err(|e| db_error("Failed to commit record update", e))?;
        Ok(true)
    }
}

impl CatalogStore for SqliteCatalog {
    fn get_files(&self, share: &str, directory: &str) -> Result<Option<Vec<FileRecord>>> {
        let conn = self.lock()?;
        Self::read_files(&conn, share, directory)
    }

    fn set_files(&self, share: &str, directory: &str, records: Vec<FileRecord>) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        let previous = match Self::read_files(&tx, share, directory) {
            Ok(files) => files.unwrap_or_default(),
            Err(e) => {
                warn!(
                    "Discarding unreadable catalog entry {}:{}: {}",
                    share, directory, e
                );
                Vec::new()
            }
        };
        let previous: HashMap<&str, &FileRecord> = previous
            .iter()
            .map(|r| (r.relative_path.as_str(), r))
            .collect();

        let merged: Vec<FileRecord> = records
            .into_iter()
            .map(|mut record| {
                if let Some(old) = previous.get(record.relative_path.as_str()) {
                    record.download_count = record.download_count.max(old.download_count);
                    if record.content_hash.is_none() && old.file_size == record.file_size {
                        record.content_hash = old.content_hash.clone();
                    }
                }
                record
            })
            .collect();

        Self::write_files(&tx, share, directory, &merged)?;
        tx.commit()
            .map_err(|e| db_error("Failed to commit catalog entry", e))?;

        debug!(
            "Stored {} records for {}:{}",
            merged.len(),
            share,
            directory
        );
        Ok(())
    }

    fn get_meta(&self, share: &str, directory: &str) -> Result<Option<DirectoryMeta>> {
        let conn = self.lock()?;

        conn.query_row(
            r#"
            SELECT subdirectory_count, last_scan_time, file_count
            FROM directory_meta
            WHERE share = ?1 AND directory = ?2
            "#,
            params![share, directory],
            |row| {
                let subdirectory_count: i64 = row.get(0)?;
                let last_scan_time: Option<String> = row.get(1)?;
                let file_count: i64 = row.get(2)?;
                Ok(DirectoryMeta {
                    subdirectory_count,
                    last_scan_time: parse_time(last_scan_time),
                    file_count: file_count.max(0) as u64,
                })
            },
        )
        .optional()
        .map_err(|e| db_error("Failed to query directory meta", e))
    }

    fn set_meta(&self, share: &str, directory: &str, meta: &DirectoryMeta) -> Result<()> {
        let conn = self.lock()?;

        conn.execute(
            r#"
            INSERT OR REPLACE INTO directory_meta
            (share, directory, subdirectory_count, last_scan_time, file_count)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                share,
                directory,
                meta.subdirectory_count,
                meta.last_scan_time.map(|t| t.to_rfc3339()),
                meta.file_count as i64
            ],
        )
        .map_err(|e| db_error("Failed to write directory meta", e))?;

        Ok(())
    }

    fn reset_meta(&self, share: Option<&str>) -> Result<usize> {
        let conn = self.lock()?;

        let reset = match share {
            Some(share) => conn.execute(
                "UPDATE directory_meta SET subdirectory_count = ?1 WHERE share = ?2",
                params![ScanConfig::FORCE_RESCAN_SENTINEL, share],
            ),
            None => conn.execute(
                "UPDATE directory_meta SET subdirectory_count = ?1",
                params![ScanConfig::FORCE_RESCAN_SENTINEL],
            ),
        }
        .map_err(|e| db_error("Failed to reset directory meta", e))?;

        debug!("Reset {} directory meta entries for rescan", reset);
        Ok(reset)
    }

    fn list_entries(&self, share: Option<&str>) -> Result<Vec<CatalogEntry>> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare(
                r#"
                SELECT share, directory, files, updated_at
                FROM catalog_entries
                WHERE ?1 IS NULL OR share = ?1
                ORDER BY share, directory
                "#,
            )
            .map_err(|e| db_error("Failed to prepare catalog query", e))?;

        let rows: Vec<(String, String, String, String)> = stmt
            .query_map(params![share], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })
            .map_err(|e| db_error("Failed to query catalog entries", e))?
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| db_error("Failed to read catalog row", e))?;

        let entries = rows
            .into_iter()
            .filter_map(|(share, directory, json, updated_at)| {
                match decode_files(&share, &directory, &json) {
                    Ok(files) => Some(CatalogEntry {
                        files,
                        updated_at: parse_time(Some(updated_at)).unwrap_or_else(Utc::now),
                        share,
                        directory,
                    }),
                    Err(e) => {
                        warn!("Skipping unreadable catalog entry: {}", e);
                        None
                    }
                }
            })
            .collect();

        Ok(entries)
    }

    fn list_directories(&self, share: &str) -> Result<Vec<String>> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare(
                r#"
                SELECT directory FROM catalog_entries WHERE share = ?1
                UNION
                SELECT directory FROM directory_meta WHERE share = ?1
                "#,
            )
            .map_err(|e| db_error("Failed to prepare directory query", e))?;

        let directories: BTreeSet<String> = stmt
            .query_map(params![share], |row| row.get(0))
            .map_err(|e| db_error("Failed to query directories", e))?
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| db_error("Failed to read directory row", e))?;

        Ok(directories.into_iter().collect())
    }

    fn remove_directory(&self, share: &str, directory: &str) -> Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        let mut removed = tx
            .execute(
                "DELETE FROM catalog_entries WHERE share = ?1 AND directory = ?2",
                params![share, directory],
            )
            .map_err(|e| db_error("Failed to delete catalog entry", e))?;
        removed += tx
            .execute(
                "DELETE FROM directory_meta WHERE share = ?1 AND directory = ?2",
                params![share, directory],
            )
            .map_err(|e| db_error("Failed to delete directory meta", e))?;

        tx.commit()
            .map_err(|e| db_error("Failed to commit directory removal", e))?;
        Ok(removed > 0)
    }

    fn increment_download_count(&self, share: &str, relative_path: &str) -> Result<bool> {
        self.update_record(share, relative_path, |record| {
            record.download_count += 1;
        })
    }

    fn set_content_hash(&self, share: &str, relative_path: &str, hash: &str) -> Result<bool> {
        self.update_record(share, relative_path, |record| {
            record.content_hash = Some(hash.to_string());
        })
    }

    fn find_file(&self, share: &str, relative_path: &str) -> Result<Option<FileRecord>> {
        let Some(directory) = top_level_directory(relative_path) else {
            return Ok(None);
        };
        let conn = self.lock()?;
        Ok(Self::read_files(&conn, share, directory)?
            .and_then(|files| files.into_iter().find(|r| r.relative_path == relative_path)))
    }

    fn ping(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(|e| db_error("Catalog ping failed", e))?;
        Ok(())
    }
}
