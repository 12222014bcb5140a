//! Branch: one translation/release line of a title.

use serde::{Deserialize, Serialize};

use crate::error::{MelonError, Result};
use crate::model::chapter::{Chapter, numeric_key};

/// Ordered chapter collection keyed by chapter ID.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub id: Option<i64>,
    chapters: Vec<Chapter>,
}

/// Derived `{id, chapters_count}` entry stored in the document's
/// `branches` list. Recomputed on every save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchSummary {
    pub id: i64,
    pub chapters_count: usize,
}

impl Branch {
    pub fn new(id: i64) -> Self {
        Self { id: Some(id), chapters: Vec::new() }
    }

    pub fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }

    pub fn chapters_mut(&mut self) -> &mut [Chapter] {
        &mut self.chapters
    }

    pub fn chapters_count(&self) -> usize {
        self.chapters.len()
    }

    /// Chapters still awaiting their content body.
    pub fn empty_chapters_count(&self) -> usize {
        self.chapters.iter().filter(|chapter| !chapter.has_content()).count()
    }

    /// Attaches a chapter. The chapter must carry an ID; a duplicate ID
    /// is a silent no-op.
    pub fn add_chapter(&mut self, chapter: Chapter) -> Result<()> {
        let id = chapter
            .id
            .ok_or_else(|| MelonError::Parsing("chapter has no ID".to_string()))?;

        if self.chapters.iter().any(|known| known.id == Some(id)) {
            log::debug!("Skipped duplicate chapter {id}.");
            return Ok(());
        }

        self.chapters.push(chapter);
        Ok(())
    }

    pub fn get_chapter(&self, id: i64) -> Result<&Chapter> {
        self.chapters
            .iter()
            .find(|chapter| chapter.id == Some(id))
            .ok_or(MelonError::ChapterNotFound(id))
    }

    pub fn get_chapter_mut(&mut self, id: i64) -> Result<&mut Chapter> {
        self.chapters
            .iter_mut()
            .find(|chapter| chapter.id == Some(id))
            .ok_or(MelonError::ChapterNotFound(id))
    }

    pub fn contains_chapter(&self, id: i64) -> bool {
        self.chapters.iter().any(|chapter| chapter.id == Some(id))
    }

    /// Replaces the chapter with the same ID wholesale.
    pub fn replace_chapter(&mut self, chapter: Chapter) -> Result<()> {
        let id = chapter
            .id
            .ok_or_else(|| MelonError::Parsing("chapter has no ID".to_string()))?;
        *self.get_chapter_mut(id)? = chapter;
        Ok(())
    }

    /// Stable sort by `(volume, number)` as dot-separated integer
    /// tuples, ascending. Chapters without a volume/number carry the
    /// empty key and sort first.
    ///
    /// Fails without reordering anything when any numeration segment is
    /// non-numeric.
    pub fn sort(&mut self) -> Result<()> {
        let mut keys = Vec::with_capacity(self.chapters.len());
        for chapter in &self.chapters {
            keys.push((
                numeric_key(chapter.volume.as_deref())?,
                numeric_key(chapter.number.as_deref())?,
            ));
        }

        let mut keyed: Vec<_> = keys.into_iter().zip(self.chapters.drain(..)).collect();
        keyed.sort_by(|a, b| a.0.cmp(&b.0));
        self.chapters = keyed.into_iter().map(|(_, chapter)| chapter).collect();
        Ok(())
    }

    pub fn reverse(&mut self) {
        self.chapters.reverse();
    }

    pub fn summary(&self) -> Option<BranchSummary> {
        self.id.map(|id| BranchSummary { id, chapters_count: self.chapters.len() })
    }

    /// Rebuilds a branch from its stored content-map entry.
    pub fn from_chapters(id: i64, chapters: Vec<Chapter>) -> Result<Self> {
        let mut branch = Branch::new(id);
        for chapter in chapters {
            branch.add_chapter(chapter)?;
        }
        Ok(branch)
    }
}
