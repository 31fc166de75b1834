use crate::error::ReconError;
use crate::models::{ReferenceVbanMap, VbanRow};
use std::path::{Path, PathBuf};
use tracing::debug;

/// File-backed store for the accumulated reference-to-VBAN map.
///
/// The map is loaded once at the start of a run, extended by ingestion and
/// rewritten in full by [`persist`](Self::persist). Concurrent runs against
/// the same file are not supported.
pub struct MapStore {
    path: PathBuf,
}

impl MapStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted map. A missing file is an empty map, not an
    /// error: the first run starts from nothing.
    pub fn load(&self) -> Result<ReferenceVbanMap, ReconError> {
        if !self.path.exists() {
            debug!("no store at {:?}, starting empty", self.path);
            return Ok(ReferenceVbanMap::new());
        }

        let mut reader = csv::Reader::from_path(&self.path).map_err(ReconError::Store)?;
        let mut map = ReferenceVbanMap::new();
        for row in reader.deserialize::<VbanRow>() {
            map.push(row.map_err(ReconError::Store)?);
        }

        debug!("loaded {} reference rows from {:?}", map.len(), self.path);
        Ok(map)
    }

    /// Rewrite the store with the full map.
    pub fn persist(&self, map: &ReferenceVbanMap) -> Result<(), ReconError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut writer = csv::Writer::from_path(&self.path).map_err(ReconError::Store)?;
        for row in map.rows() {
            writer.serialize(row).map_err(ReconError::Store)?;
        }
        writer.flush()?;

        debug!("persisted {} reference rows to {:?}", map.len(), self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn pair(reference: &str, vban: &str) -> VbanRow {
        VbanRow {
            reference: reference.to_string(),
            vban: vban.to_string(),
        }
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = MapStore::new(dir.path().join("main_data.csv"));

        let map = store.load().unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn test_persist_and_reload_round_trip() {
        let dir = tempdir().unwrap();
        let store = MapStore::new(dir.path().join("main_data.csv"));

        let mut map = ReferenceVbanMap::new();
        map.push(pair("REF1", "VBAN1"));
        map.push(pair("REF2", "VBAN2"));
        store.persist(&map).unwrap();

        let reloaded = store.load().unwrap();
        assert_eq!(reloaded, map);
    }

    #[test]
    fn test_persist_creates_parent_directory() {
        let dir = tempdir().unwrap();
        let store = MapStore::new(dir.path().join("nested").join("main_data.csv"));

        let mut map = ReferenceVbanMap::new();
        map.push(pair("REF1", "VBAN1"));
        store.persist(&map).unwrap();

        assert_eq!(store.load().unwrap().len(), 1);
    }

    #[test]
    fn test_reload_then_extend_stays_deduplicated() {
        let dir = tempdir().unwrap();
        let store = MapStore::new(dir.path().join("main_data.csv"));

        let mut map = ReferenceVbanMap::new();
        map.push(pair("REF1", "VBAN1"));
        store.persist(&map).unwrap();

        // A second run appending the same pair must not grow the store
        let mut reloaded = store.load().unwrap();
        let added = reloaded.extend(vec![pair("REF1", "VBAN1")]);
        assert_eq!(added, 0);
        store.persist(&reloaded).unwrap();

        assert_eq!(store.load().unwrap().len(), 1);
    }
}
