//! Document model: the title -> branch -> chapter aggregate.
//!
//! Titles own branches, branches own chapters, and a chapter carries
//! either HTML paragraphs (ranobe) or image slides (manga). The model
//! serializes to the canonical JSON document and back, and hosts the
//! merge/amend/repair lifecycle.

pub mod branch;
pub mod chapter;
pub mod title;

use serde::{Deserialize, Serialize};

use crate::error::{MelonError, Result};

pub use branch::Branch;
pub use chapter::{Chapter, ChapterContent, Slide};
pub use title::{AmendSummary, ContentSource, Title};

/// Declared format tag of a stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Format {
    #[serde(rename = "melon-manga")]
    Manga,
    #[serde(rename = "melon-ranobe")]
    Ranobe,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Manga => "melon-manga",
            Format::Ranobe => "melon-ranobe",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "melon-manga" => Ok(Format::Manga),
            "melon-ranobe" => Ok(Format::Ranobe),
            other => Err(MelonError::UnsupportedFormat(Some(other.to_string()))),
        }
    }
}

/// Publication status of a title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Announced,
    Ongoing,
    Completed,
    Dropped,
}

/// Chapter classification extracted from its header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChapterKind {
    Afterword,
    Art,
    Chapter,
    Epilogue,
    Extra,
    Glossary,
    Prologue,
    Trash,
}

/// Cover image reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cover {
    pub link: String,
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

/// A person credited on the title (author, artist, publisher).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub name: String,
    #[serde(default)]
    pub another_names: Vec<String>,
    #[serde(default)]
    pub images: Vec<serde_json::Value>,
    #[serde(default)]
    pub description: Option<String>,
}

/// How `Title::open` interprets its identificator argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum By {
    Filename,
    Slug,
    Id,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_tags() {
        assert_eq!(Format::Ranobe.as_str(), "melon-ranobe");
        assert_eq!(Format::parse("melon-manga").unwrap(), Format::Manga);
        assert!(matches!(
            Format::parse("melon-comic"),
            Err(MelonError::UnsupportedFormat(Some(tag))) if tag == "melon-comic"
        ));
    }

    #[test]
    fn test_chapter_kind_serialization() {
        assert_eq!(serde_json::to_string(&ChapterKind::Prologue).unwrap(), "\"prologue\"");
        let kind: ChapterKind = serde_json::from_str("\"extra\"").unwrap();
        assert_eq!(kind, ChapterKind::Extra);
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&Status::Ongoing).unwrap(), "\"ongoing\"");
    }
}
