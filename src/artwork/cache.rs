// Durable artwork cache
// Maps an artwork identifier to the public URL it was published under

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// In-memory mapping backed by a pretty-printed JSON object on disk
#[derive(Debug)]
pub struct ArtCache {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl ArtCache {
    /// Load the cache file, starting empty if it is missing, empty or unreadable
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = read_entries(&path);
        let cache = Self { path, entries };

        if !cache.is_empty() {
            log::info!("Loaded {} cached artwork URLs from {:?}", cache.len(), cache.path());
        }

        cache
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Memory only; call `save` (or use `insert_and_persist`) to write it out
    pub fn set(&mut self, key: impl Into<String>, url: impl Into<String>) {
        self.entries.insert(key.into(), url.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the whole mapping to disk. Failures are logged, never returned.
    pub fn save(&self) {
        if let Err(e) = self.try_save() {
            log::error!("Failed to save artwork cache to {:?}: {:#}", self.path, e);
        }
    }

    pub fn insert_and_persist(&mut self, key: impl Into<String>, url: impl Into<String>) {
        self.set(key, url);
        self.save();
    }

    fn try_save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).context("Failed to create cache directory")?;
        }

        let content =
            serde_json::to_string_pretty(&self.entries).context("Failed to serialize cache")?;

        // Readers only ever see the old file or the complete new one
        let tmp = self.path.with_extension("json.tmp");
        let replaced = fs::write(&tmp, content)
            .context("Failed to write temporary cache file")
            .and_then(|_| fs::rename(&tmp, &self.path).context("Failed to replace cache file"));
        if replaced.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        replaced?;

        log::debug!("Saved {} artwork URLs to {:?}", self.entries.len(), self.path);
        Ok(())
    }
}

fn read_entries(path: &Path) -> BTreeMap<String, String> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
        Err(e) => {
            log::warn!("Could not read artwork cache {:?}, starting empty: {}", path, e);
            return BTreeMap::new();
        }
    };

    if content.trim().is_empty() {
        return BTreeMap::new();
    }

    serde_json::from_str(&content).unwrap_or_else(|e| {
        log::warn!("Artwork cache {:?} is malformed, starting empty: {}", path, e);
        BTreeMap::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cache_in(temp: &TempDir) -> ArtCache {
        ArtCache::load(temp.path().join("art_cache.json"))
    }

    #[test]
    fn missing_file_starts_empty() {
        let temp = TempDir::new().unwrap();
        let cache = cache_in(&temp);
        assert!(cache.is_empty());
    }

    #[test]
    fn empty_file_starts_empty() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("art_cache.json"), "").unwrap();
        assert!(cache_in(&temp).is_empty());
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("art_cache.json"), "{not json").unwrap();
        assert!(cache_in(&temp).is_empty());
    }

    #[test]
    fn wrong_shape_starts_empty() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("art_cache.json"), r#"["a", "b"]"#).unwrap();
        assert!(cache_in(&temp).is_empty());
    }

    #[test]
    fn saved_mapping_reloads_identically() {
        let temp = TempDir::new().unwrap();
        let mut cache = cache_in(&temp);
        cache.set("A123", "https://files.catbox.moe/abc.jpg");
        cache.set("T456", "https://files.catbox.moe/def.png");
        cache.set("with \"quotes\" and ünïcode", "https://example.com/x");
        cache.save();

        let reloaded = cache_in(&temp);
        assert_eq!(reloaded.entries, cache.entries);
        assert!(!temp.path().join("art_cache.json.tmp").exists());
    }

    #[test]
    fn set_does_not_touch_disk() {
        let temp = TempDir::new().unwrap();
        let mut cache = cache_in(&temp);
        cache.set("A123", "https://example.com/a.jpg");

        assert_eq!(cache.get("A123"), Some("https://example.com/a.jpg"));
        assert!(!cache.path().exists());
    }

    #[test]
    fn insert_and_persist_writes_pretty_json() {
        let temp = TempDir::new().unwrap();
        let mut cache = cache_in(&temp);
        cache.insert_and_persist("A123", "https://example.com/a.jpg");

        let content = fs::read_to_string(cache.path()).unwrap();
        assert!(content.contains("\n  \"A123\": \"https://example.com/a.jpg\""));
    }

    #[test]
    fn save_creates_missing_directories() {
        let temp = TempDir::new().unwrap();
        let mut cache = ArtCache::load(temp.path().join("state").join("art_cache.json"));
        cache.insert_and_persist("A123", "https://example.com/a.jpg");

        let reloaded = ArtCache::load(temp.path().join("state").join("art_cache.json"));
        assert_eq!(reloaded.get("A123"), Some("https://example.com/a.jpg"));
    }

    #[test]
    fn failed_save_is_not_fatal() {
        let temp = TempDir::new().unwrap();
        // A directory where the file should be makes the rename fail
        let path = temp.path().join("art_cache.json");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("keep"), "x").unwrap();

        let mut cache = ArtCache::load(&path);
        cache.insert_and_persist("A123", "https://example.com/a.jpg");

        assert_eq!(cache.get("A123"), Some("https://example.com/a.jpg"));
        assert!(!temp.path().join("art_cache.json.tmp").exists());
        assert!(path.join("keep").exists());
    }
}
