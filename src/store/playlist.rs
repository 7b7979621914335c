use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, params};

use crate::error::StoreError;

/// One episode in a playlist, in insertion order
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistEntry {
    pub podcast: String,
    pub title: String,
    pub played: bool,
    /// Resume offset in whole seconds; meaningful only while unplayed
    pub position: u64,
}

/// Durable ordered playlists with per-entry played flags and resume offsets
pub struct PlaylistStore {
    conn: Mutex<Connection>,
}

impl PlaylistStore {
    /// Open (or create) the playlist database at the given path
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

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS playlists (
                name TEXT PRIMARY KEY
            );
            CREATE TABLE IF NOT EXISTS playlist_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                playlist TEXT,
                podcast TEXT,
                title TEXT,
                position INTEGER DEFAULT 0,
                played INTEGER DEFAULT 0,
                FOREIGN KEY (playlist) REFERENCES playlists(name)
            );",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create a playlist; creating an existing one is a no-op
    pub fn create(&self, name: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO playlists (name) VALUES (?1)",
            params![name],
        )?;
        Ok(())
    }

    /// Delete a playlist and all its entries
    pub fn delete(&self, name: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM playlist_entries WHERE playlist = ?1",
            params![name],
        )?;
        tx.execute("DELETE FROM playlists WHERE name = ?1", params![name])?;
        tx.commit()?;
        Ok(())
    }

    /// Rename a playlist, repointing its entries in the same transaction
    pub fn rename(&self, old: &str, new: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE playlists SET name = ?1 WHERE name = ?2",
            params![new, old],
        )?;
        tx.execute(
            "UPDATE playlist_entries SET playlist = ?1 WHERE playlist = ?2",
            params![new, old],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// All playlist names, ordered by name
    pub fn list_playlists(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT name FROM playlists ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    /// Whether a playlist with this name exists
    pub fn exists(&self, name: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM playlists WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Append an episode to a playlist. Does not verify the episode is
    /// downloaded; entries may precede their downloads.
    pub fn add_episode(&self, playlist: &str, podcast: &str, title: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO playlist_entries (playlist, podcast, title) VALUES (?1, ?2, ?3)",
            params![playlist, podcast, title],
        )?;
        Ok(())
    }

    /// Entries of a playlist in insertion order (the playback order)
    pub fn get_entries(&self, playlist: &str) -> Result<Vec<PlaylistEntry>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT podcast, title, played, position FROM playlist_entries
             WHERE playlist = ?1 ORDER BY id",
        )?;
        let entries = stmt
            .query_map(params![playlist], |row| {
                Ok(PlaylistEntry {
                    podcast: row.get(0)?,
                    title: row.get(1)?,
                    played: row.get::<_, i64>(2)? != 0,
                    position: row.get::<_, i64>(3)?.max(0) as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Mark an entry played. Terminal: the resume offset is no longer
    /// updatable afterwards.
    pub fn mark_played(&self, playlist: &str, title: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE playlist_entries SET played = 1 WHERE playlist = ?1 AND title = ?2",
            params![playlist, title],
        )?;
        Ok(())
    }

    /// Persist a resume offset for an unplayed entry. A no-op once the
    /// entry is played.
    pub fn update_position(
        &self,
        playlist: &str,
        title: &str,
        position: u64,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE playlist_entries SET position = ?1
             WHERE playlist = ?2 AND title = ?3 AND played = 0",
            params![position as i64, playlist, title],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (PlaylistStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = PlaylistStore::open(&dir.path().join("playlists.db")).unwrap();
        (store, dir)
    }

    #[test]
    fn create_is_idempotent() {
        let (store, _dir) = setup();
        store.create("commute").unwrap();
        store.create("commute").unwrap();
        assert_eq!(store.list_playlists().unwrap(), vec!["commute"]);
    }

    #[test]
    fn list_is_ordered_by_name() {
        let (store, _dir) = setup();
        store.create("zeta").unwrap();
        store.create("alpha").unwrap();
        assert_eq!(store.list_playlists().unwrap(), vec!["alpha", "zeta"]);
    }

    #[test]
    fn entries_keep_insertion_order() {
        let (store, _dir) = setup();
        store.create("commute").unwrap();
        store.add_episode("commute", "tech", "Ep3").unwrap();
        store.add_episode("commute", "tech", "Ep1").unwrap();
        store.add_episode("commute", "news", "Ep2").unwrap();

        let titles: Vec<_> = store
            .get_entries("commute")
            .unwrap()
            .into_iter()
            .map(|e| e.title)
            .collect();
        assert_eq!(titles, vec!["Ep3", "Ep1", "Ep2"]);
    }

    #[test]
    fn new_entries_are_unplayed_at_position_zero() {
        let (store, _dir) = setup();
        store.create("commute").unwrap();
        store.add_episode("commute", "tech", "Ep1").unwrap();

        let entries = store.get_entries("commute").unwrap();
        assert_eq!(
            entries,
            vec![PlaylistEntry {
                podcast: "tech".to_string(),
                title: "Ep1".to_string(),
                played: false,
                position: 0,
            }]
        );
    }

    #[test]
    fn delete_cascades_to_entries() {
        let (store, _dir) = setup();
        store.create("commute").unwrap();
        store.add_episode("commute", "tech", "Ep1").unwrap();
        store.delete("commute").unwrap();

        assert!(store.list_playlists().unwrap().is_empty());
        assert!(store.get_entries("commute").unwrap().is_empty());
    }

    #[test]
    fn rename_repoints_entries() {
        let (store, _dir) = setup();
        store.create("commute").unwrap();
        store.add_episode("commute", "tech", "Ep1").unwrap();
        store.rename("commute", "drive").unwrap();

        assert_eq!(store.list_playlists().unwrap(), vec!["drive"]);
        assert!(store.get_entries("commute").unwrap().is_empty());
        assert_eq!(store.get_entries("drive").unwrap().len(), 1);
    }

    #[test]
    fn update_position_persists_for_unplayed_entries() {
        let (store, _dir) = setup();
        store.create("commute").unwrap();
        store.add_episode("commute", "tech", "Ep1").unwrap();
        store.update_position("commute", "Ep1", 42).unwrap();

        let entries = store.get_entries("commute").unwrap();
        assert_eq!(entries[0].position, 42);
        assert!(!entries[0].played);
    }

    #[test]
    fn update_position_is_noop_once_played() {
        let (store, _dir) = setup();
        store.create("commute").unwrap();
        store.add_episode("commute", "tech", "Ep1").unwrap();
        store.update_position("commute", "Ep1", 42).unwrap();
        store.mark_played("commute", "Ep1").unwrap();

        store.update_position("commute", "Ep1", 99).unwrap();

        let entries = store.get_entries("commute").unwrap();
        assert!(entries[0].played);
        assert_eq!(entries[0].position, 42);
    }

    #[test]
    fn exists_reflects_creation() {
        let (store, _dir) = setup();
        assert!(!store.exists("commute").unwrap());
        store.create("commute").unwrap();
        assert!(store.exists("commute").unwrap());
    }
}
