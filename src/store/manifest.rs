use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::StoreError;

/// A completed download, keyed by the URL-derived content identifier
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRecord {
    pub id: String,
    pub podcast: String,
    pub title: String,
    pub url: String,
    pub path: PathBuf,
    pub downloaded_at: String,
}

impl DownloadRecord {
    /// Create a record stamped with the current UTC time
    pub fn new(
        id: impl Into<String>,
        podcast: impl Into<String>,
        title: impl Into<String>,
        url: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: id.into(),
            podcast: podcast.into(),
            title: title.into(),
            url: url.into(),
            path: path.into(),
            downloaded_at: Utc::now().to_rfc3339(),
        }
    }
}

/// Durable record of completed downloads.
///
/// A record is authoritative evidence of completion only while its file
/// still exists on disk; `is_downloaded` purges stale records before
/// answering.
pub struct ManifestStore {
    conn: Mutex<Connection>,
}

impl ManifestStore {
    /// Open (or create) the manifest database at the given path
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::CreateDirectoryFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let conn = Connection::open(path).map_err(|e| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS manifest (
                id TEXT PRIMARY KEY,
                podcast TEXT,
                title TEXT,
                url TEXT,
                path TEXT,
                downloaded_at TEXT
            )",
            [],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Returns true iff a record exists for `id` and its file is still on
    /// disk. A record whose file has vanished is deleted inside the same
    /// transaction and the call returns false.
    pub fn is_downloaded(&self, id: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let path: Option<String> = tx
            .query_row(
                "SELECT path FROM manifest WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        let downloaded = match path {
            Some(ref p) if Path::new(p).exists() => true,
            Some(_) => {
                tx.execute("DELETE FROM manifest WHERE id = ?1", params![id])?;
                false
            }
            None => false,
        };

        tx.commit()?;
        Ok(downloaded)
    }

    /// Idempotent upsert keyed by identifier; last write wins.
    /// Persists immediately.
    pub fn add(&self, record: &DownloadRecord) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO manifest (id, podcast, title, url, path, downloaded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.id,
                record.podcast,
                record.title,
                record.url,
                record.path.to_string_lossy().into_owned(),
                record.downloaded_at,
            ],
        )?;
        Ok(())
    }

    /// Look up the most recent record's path by natural key.
    ///
    /// The playback controller knows an entry's display title, not its
    /// content identifier.
    pub fn resolve_path(&self, podcast: &str, title: &str) -> Result<Option<PathBuf>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let path: Option<String> = conn
            .query_row(
                "SELECT path FROM manifest WHERE podcast = ?1 AND title = ?2
                 ORDER BY downloaded_at DESC LIMIT 1",
                params![podcast, title],
                |row| row.get(0),
            )
            .optional()?;
        Ok(path.map(PathBuf::from))
    }

    /// Delete all records for a podcast, returning how many were removed
    pub fn clear_podcast(&self, podcast: &str) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute("DELETE FROM manifest WHERE podcast = ?1", params![podcast])?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (ManifestStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = ManifestStore::open(&dir.path().join("manifest.db")).unwrap();
        (store, dir)
    }

    fn record_with_file(dir: &TempDir, id: &str, title: &str) -> DownloadRecord {
        let file = dir.path().join(format!("{title}.mp3"));
        std::fs::write(&file, b"audio").unwrap();
        DownloadRecord::new(id, "tech", title, "https://example.com/ep.mp3", file)
    }

    #[test]
    fn unknown_id_is_not_downloaded() {
        let (store, _dir) = setup();
        assert!(!store.is_downloaded("missing").unwrap());
    }

    #[test]
    fn add_then_is_downloaded() {
        let (store, dir) = setup();
        let record = record_with_file(&dir, "abc", "Ep1");
        store.add(&record).unwrap();
        assert!(store.is_downloaded("abc").unwrap());
    }

    #[test]
    fn add_is_idempotent() {
        let (store, dir) = setup();
        let record = record_with_file(&dir, "abc", "Ep1");
        store.add(&record).unwrap();
        store.add(&record).unwrap();

        let path = store.resolve_path("tech", "Ep1").unwrap();
        assert_eq!(path, Some(record.path.clone()));
    }

    #[test]
    fn stale_record_is_purged_when_file_missing() {
        let (store, dir) = setup();
        let record = record_with_file(&dir, "abc", "Ep1");
        store.add(&record).unwrap();

        std::fs::remove_file(&record.path).unwrap();

        // First call self-heals and answers false
        assert!(!store.is_downloaded("abc").unwrap());
        // Record is gone, not just ignored
        assert_eq!(store.resolve_path("tech", "Ep1").unwrap(), None);
    }

    #[test]
    fn resolve_path_by_natural_key() {
        let (store, dir) = setup();
        let record = record_with_file(&dir, "abc", "Ep1");
        store.add(&record).unwrap();

        assert_eq!(
            store.resolve_path("tech", "Ep1").unwrap(),
            Some(record.path.clone())
        );
        assert_eq!(store.resolve_path("tech", "Ep2").unwrap(), None);
        assert_eq!(store.resolve_path("news", "Ep1").unwrap(), None);
    }

    #[test]
    fn clear_podcast_removes_only_that_podcast() {
        let (store, dir) = setup();
        store.add(&record_with_file(&dir, "a1", "Ep1")).unwrap();
        store.add(&record_with_file(&dir, "a2", "Ep2")).unwrap();

        let other = DownloadRecord::new(
            "b1",
            "news",
            "Other",
            "https://example.com/other.mp3",
            dir.path().join("other.mp3"),
        );
        store.add(&other).unwrap();

        assert_eq!(store.clear_podcast("tech").unwrap(), 2);
        assert_eq!(store.resolve_path("tech", "Ep1").unwrap(), None);
        assert!(store.resolve_path("news", "Other").unwrap().is_some());
    }
}
