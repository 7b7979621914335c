use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, params};

use crate::error::StoreError;

/// Episodes queued for a later batch download
pub struct QueueStore {
    conn: Mutex<Connection>,
}

impl QueueStore {
    /// Open (or create) the queue database at the given path
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
            "CREATE TABLE IF NOT EXISTS queue (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                podcast TEXT,
                title TEXT
            )",
            [],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Queue an episode; queueing the same (podcast, title) twice is a no-op
    pub fn add(&self, podcast: &str, title: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO queue (podcast, title)
             SELECT ?1, ?2
             WHERE NOT EXISTS (SELECT 1 FROM queue WHERE podcast = ?1 AND title = ?2)",
            params![podcast, title],
        )?;
        Ok(())
    }

    /// Queued (podcast, title) pairs in queueing order
    pub fn list(&self) -> Result<Vec<(String, String)>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT podcast, title FROM queue ORDER BY id")?;
        let entries = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Remove a queued episode by title
    pub fn remove(&self, title: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM queue WHERE title = ?1", params![title])?;
        Ok(())
    }

    /// Empty the queue
    pub fn reset(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM queue", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (QueueStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = QueueStore::open(&dir.path().join("queue.db")).unwrap();
        (store, dir)
    }

    #[test]
    fn add_deduplicates_pairs() {
        let (store, _dir) = setup();
        store.add("tech", "Ep1").unwrap();
        store.add("tech", "Ep1").unwrap();
        store.add("news", "Ep1").unwrap();

        assert_eq!(
            store.list().unwrap(),
            vec![
                ("tech".to_string(), "Ep1".to_string()),
                ("news".to_string(), "Ep1".to_string()),
            ]
        );
    }

    #[test]
    fn remove_and_reset() {
        let (store, _dir) = setup();
        store.add("tech", "Ep1").unwrap();
        store.add("tech", "Ep2").unwrap();

        store.remove("Ep1").unwrap();
        assert_eq!(store.list().unwrap().len(), 1);

        store.reset().unwrap();
        assert!(store.list().unwrap().is_empty());
    }
}
