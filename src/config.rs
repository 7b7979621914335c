use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// The podcast registry: names mapped to feed URLs and download
/// directories. Loaded and saved as one JSON document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodFile {
    /// Podcast name -> RSS feed URL
    #[serde(default)]
    pub podcasts: BTreeMap<String, String>,

    /// Podcast name -> download directory override
    #[serde(default)]
    pub directories: BTreeMap<String, PathBuf>,

    /// Download directory for podcasts without an override
    #[serde(default = "default_directory")]
    pub default_directory: PathBuf,
}

fn default_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Podcasts")
}

impl Default for PodFile {
    fn default() -> Self {
        Self {
            podcasts: BTreeMap::new(),
            directories: BTreeMap::new(),
            default_directory: default_directory(),
        }
    }
}

impl PodFile {
    /// Load the registry from a JSON file. A missing file is an empty
    /// registry, not an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        serde_json::from_str(&content).map_err(|e| ConfigError::JsonParseFailed {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Write the registry back to disk, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path, json).map_err(|e| ConfigError::WriteFailed {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Feed URL for a registered podcast
    pub fn feed_url(&self, name: &str) -> Option<&str> {
        self.podcasts.get(name).map(String::as_str)
    }

    /// Target download directory for a podcast, falling back to the
    /// default directory
    pub fn directory_for(&self, name: &str) -> PathBuf {
        self.directories
            .get(name)
            .cloned()
            .unwrap_or_else(|| self.default_directory.clone())
    }

    /// Register a podcast, optionally with a directory override
    pub fn add_podcast(&mut self, name: &str, rss_url: &str, directory: Option<PathBuf>) {
        self.podcasts.insert(name.to_string(), rss_url.to_string());
        if let Some(dir) = directory {
            self.directories.insert(name.to_string(), dir);
        }
    }

    /// Remove a podcast and its directory override. Returns false if the
    /// podcast was not registered.
    pub fn remove_podcast(&mut self, name: &str) -> bool {
        let removed = self.podcasts.remove(name).is_some();
        self.directories.remove(name);
        removed
    }

    /// Rename a podcast, carrying its feed URL and directory override
    /// along. Returns false if the old name was not registered.
    pub fn rename_podcast(&mut self, old: &str, new: &str) -> bool {
        let Some(rss_url) = self.podcasts.remove(old) else {
            return false;
        };
        self.podcasts.insert(new.to_string(), rss_url);
        if let Some(dir) = self.directories.remove(old) {
            self.directories.insert(new.to_string(), dir);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_missing_file_is_empty_registry() {
        let dir = tempdir().unwrap();
        let podfile = PodFile::load(&dir.path().join("podfile.json")).unwrap();
        assert!(podfile.podcasts.is_empty());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("podfile.json");

        let mut podfile = PodFile::default();
        podfile.add_podcast(
            "tech",
            "https://example.com/feed.xml",
            Some(PathBuf::from("/media/tech")),
        );
        podfile.save(&path).unwrap();

        let loaded = PodFile::load(&path).unwrap();
        assert_eq!(loaded.feed_url("tech"), Some("https://example.com/feed.xml"));
        assert_eq!(loaded.directory_for("tech"), PathBuf::from("/media/tech"));
    }

    #[test]
    fn directory_falls_back_to_default() {
        let mut podfile = PodFile::default();
        podfile.default_directory = PathBuf::from("/media/podcasts");
        podfile.add_podcast("tech", "https://example.com/feed.xml", None);

        assert_eq!(podfile.directory_for("tech"), PathBuf::from("/media/podcasts"));
    }

    #[test]
    fn rename_carries_directory_override() {
        let mut podfile = PodFile::default();
        podfile.add_podcast(
            "tech",
            "https://example.com/feed.xml",
            Some(PathBuf::from("/media/tech")),
        );

        assert!(podfile.rename_podcast("tech", "technology"));
        assert_eq!(podfile.feed_url("tech"), None);
        assert_eq!(
            podfile.feed_url("technology"),
            Some("https://example.com/feed.xml")
        );
        assert_eq!(
            podfile.directory_for("technology"),
            PathBuf::from("/media/tech")
        );
    }

    #[test]
    fn rename_unknown_podcast_is_rejected() {
        let mut podfile = PodFile::default();
        assert!(!podfile.rename_podcast("tech", "technology"));
    }

    #[test]
    fn remove_clears_both_maps() {
        let mut podfile = PodFile::default();
        podfile.add_podcast(
            "tech",
            "https://example.com/feed.xml",
            Some(PathBuf::from("/media/tech")),
        );

        assert!(podfile.remove_podcast("tech"));
        assert!(!podfile.remove_podcast("tech"));
        assert!(podfile.directories.is_empty());
    }
}
