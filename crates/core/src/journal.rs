//! ID<->slug journal.
//!
//! Sites address the same title by numeric ID in one place and by slug
//! in another. The journal remembers every pairing seen so that `open`
//! can resolve one from the other without rescanning the titles
//! directory. Stored state is read once on open and rewritten wholesale
//! on every update; concurrent writers are out of scope.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use crate::error::Result;

/// Resolves between the two identifier forms of a title.
pub trait CacheJournal {
    fn id_by_slug(&self, slug: &str) -> Option<i64>;
    fn slug_by_id(&self, id: i64) -> Option<String>;
    fn update(&mut self, id: i64, slug: &str) -> Result<()>;
}

/// JSON-file-backed journal, one file per parser.
pub struct FileJournal {
    path: PathBuf,
    entries: BTreeMap<String, i64>,
}

impl FileJournal {
    /// Opens the journal at `path`, starting empty when no file exists.
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            serde_json::from_str(&fs::read_to_string(&path)?)?
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All known pairings, ordered by slug.
    pub fn entries(&self) -> impl Iterator<Item = (&str, i64)> {
        self.entries.iter().map(|(slug, id)| (slug.as_str(), *id))
    }

    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&self.entries)?)?;
        Ok(())
    }
}

impl CacheJournal for FileJournal {
    fn id_by_slug(&self, slug: &str) -> Option<i64> {
        self.entries.get(slug).copied()
    }

    fn slug_by_id(&self, id: i64) -> Option<String> {
        self.entries.iter().find(|(_, known)| **known == id).map(|(slug, _)| slug.clone())
    }

    fn update(&mut self, id: i64, slug: &str) -> Result<()> {
        if self.entries.get(slug) == Some(&id) {
            return Ok(());
        }
        self.entries.insert(slug.to_string(), id);
        self.persist()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_journal_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.json");

        let mut journal = FileJournal::open(&path).unwrap();
        assert!(journal.is_empty());

        journal.update(17, "some-novel").unwrap();
        assert_eq!(journal.id_by_slug("some-novel"), Some(17));
        assert_eq!(journal.slug_by_id(17).as_deref(), Some("some-novel"));

        // Re-open from disk.
        let reloaded = FileJournal::open(&path).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.id_by_slug("some-novel"), Some(17));
    }

    #[test]
    fn test_unknown_lookups() {
        let dir = tempfile::tempdir().unwrap();
        let journal = FileJournal::open(dir.path().join("journal.json")).unwrap();
        assert_eq!(journal.id_by_slug("missing"), None);
        assert_eq!(journal.slug_by_id(404), None);
    }
}
