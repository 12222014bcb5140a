//! Chapter: one content unit within a branch.

use serde::{Deserialize, Serialize};

use crate::error::{MelonError, Result};
use crate::fetch::ImageClient;
use crate::header::{ChapterHeader, ChapterHeaderParser};
use crate::illustration::{IllustrationContext, IllustrationResolver};
use crate::model::ChapterKind;
use crate::sanitize::{ParagraphVerdict, Sanitizer};
use crate::words::WordsDictionary;

/// One manga page reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slide {
    pub index: usize,
    pub link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

/// Content payload, variant by media kind.
///
/// Exactly one kind is populated per chapter; the serialized form
/// carries either a `slides` key or a `paragraphs` key, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChapterContent {
    Slides {
        slides: Vec<Slide>,
    },
    Text {
        paragraphs: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        footnotes: Option<Vec<String>>,
    },
}

impl ChapterContent {
    pub fn empty_text() -> Self {
        ChapterContent::Text { paragraphs: Vec::new(), footnotes: None }
    }

    pub fn empty_slides() -> Self {
        ChapterContent::Slides { slides: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ChapterContent::Slides { slides } => slides.is_empty(),
            ChapterContent::Text { paragraphs, .. } => paragraphs.is_empty(),
        }
    }

    fn clear(&mut self) {
        match self {
            ChapterContent::Slides { slides } => slides.clear(),
            ChapterContent::Text { paragraphs, footnotes } => {
                paragraphs.clear();
                *footnotes = None;
            }
        }
    }
}

/// A single chapter. Created empty and populated incrementally during
/// scraping, or loaded in bulk from a stored document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: Option<i64>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub volume: Option<String>,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<ChapterKind>,
    #[serde(default)]
    pub is_paid: Option<bool>,
    #[serde(default)]
    pub workers: Vec<String>,
    #[serde(flatten)]
    content: ChapterContent,
}

impl Chapter {
    pub fn new_text(id: i64) -> Self {
        Self::with_content(id, ChapterContent::empty_text())
    }

    pub fn new_slides(id: i64) -> Self {
        Self::with_content(id, ChapterContent::empty_slides())
    }

    fn with_content(id: i64, content: ChapterContent) -> Self {
        Self {
            id: Some(id),
            slug: None,
            volume: None,
            number: None,
            name: None,
            kind: None,
            is_paid: None,
            workers: Vec::new(),
            content,
        }
    }

    pub fn content(&self) -> &ChapterContent {
        &self.content
    }

    pub fn has_content(&self) -> bool {
        !self.content.is_empty()
    }

    /// Wholesale content replacement. Used by merge and amend; atomic
    /// at the chapter level.
    pub fn set_content(&mut self, content: ChapterContent) {
        self.content = content;
    }

    /// Drops all content, keeping the variant kind. Used by repair.
    pub fn clear_content(&mut self) {
        self.content.clear();
    }

    /// Stores the cleaned volume marker. Ranges are truncated to their
    /// first element; an empty result clears the field.
    pub fn set_volume<V: ToString>(&mut self, volume: V) {
        self.volume = clean_numeration(&volume.to_string());
    }

    /// Same cleaning as [`Chapter::set_volume`].
    pub fn set_number<N: ToString>(&mut self, number: N) {
        self.number = clean_numeration(&number.to_string());
    }

    /// Stores the chapter name.
    ///
    /// Pretty mode runs the full cleanup: the name is fed through the
    /// header parser (backfilling a still-missing volume/number and
    /// keeping only the residual), dot runs at either end collapse to an
    /// ellipsis glyph, a trailing period or dash goes, NBSP becomes a
    /// plain space, leading `:`/`.` punctuation and duplicate spaces go.
    /// Without a dictionary the parse step is skipped.
    pub fn set_name(&mut self, name: &str, pretty: bool, dictionary: Option<&WordsDictionary>) {
        let mut name = name.trim().to_string();

        if pretty {
            if let Some(dictionary) = dictionary {
                let header = ChapterHeaderParser::new(&name, dictionary).parse(true);
                if self.volume.is_none() {
                    self.volume = header.volume.as_deref().and_then(clean_numeration);
                }
                if self.number.is_none() {
                    self.number = header.number.as_deref().and_then(clean_numeration);
                }
                if let Some(residual) = header.name {
                    name = residual;
                }
            }

            if name.ends_with("...") {
                name = format!("{}…", name.trim_end_matches('.'));
            } else {
                name = name.trim_end_matches(['.', '–']).to_string();
            }

            if name.starts_with("...") {
                name = format!("…{}", name.trim_start_matches('.'));
            }

            name = name.replace('\u{a0}', " ");
            name = name.trim_start_matches([':', '.']).to_string();
            while name.contains("  ") {
                name = name.replace("  ", " ");
            }
        }

        let name = name.trim();
        self.name = if name.is_empty() { None } else { Some(name.to_string()) };
    }

    pub fn add_worker(&mut self, worker: &str) {
        self.workers.push(worker.to_string());
    }

    pub fn paragraphs(&self) -> &[String] {
        match &self.content {
            ChapterContent::Text { paragraphs, .. } => paragraphs,
            ChapterContent::Slides { .. } => &[],
        }
    }

    pub fn slides(&self) -> &[Slide] {
        match &self.content {
            ChapterContent::Slides { slides } => slides,
            ChapterContent::Text { .. } => &[],
        }
    }

    /// Appends an already-normalized paragraph. Fails on a slides
    /// chapter.
    pub fn push_paragraph(&mut self, html: String) -> Result<()> {
        match &mut self.content {
            ChapterContent::Text { paragraphs, .. } => {
                paragraphs.push(html);
                Ok(())
            }
            ChapterContent::Slides { .. } => {
                Err(MelonError::Parsing("paragraph appended to a slides chapter".to_string()))
            }
        }
    }

    pub fn push_footnote(&mut self, html: String) -> Result<()> {
        match &mut self.content {
            ChapterContent::Text { footnotes, .. } => {
                footnotes.get_or_insert_with(Vec::new).push(html);
                Ok(())
            }
            ChapterContent::Slides { .. } => {
                Err(MelonError::Parsing("footnote appended to a slides chapter".to_string()))
            }
        }
    }

    /// Appends a slide, assigning the next 1-based index. Fails on a
    /// text chapter.
    pub fn push_slide(
        &mut self,
        link: String,
        width: Option<u32>,
        height: Option<u32>,
    ) -> Result<()> {
        match &mut self.content {
            ChapterContent::Slides { slides } => {
                let index = slides.len() + 1;
                slides.push(Slide { index, link, width, height });
                Ok(())
            }
            ChapterContent::Text { .. } => {
                Err(MelonError::Parsing("slide appended to a text chapter".to_string()))
            }
        }
    }

    /// Full normalization pipeline for one raw scraped fragment:
    /// illustrations are resolved to local mount paths, the result is
    /// sanitized, and the verdict is applied. A discarded repeated
    /// heading may backfill still-missing header fields.
    ///
    /// Returns whether a paragraph was actually stored.
    pub fn add_paragraph<C: ImageClient>(
        &mut self,
        raw: &str,
        used_filename: &str,
        localized_name: Option<&str>,
        sanitizer: &Sanitizer<'_>,
        resolver: &mut IllustrationResolver<'_, C>,
    ) -> Result<bool> {
        let id = self
            .id
            .ok_or_else(|| MelonError::Parsing("chapter has no ID".to_string()))?;

        let context = IllustrationContext { used_filename, chapter_id: id };
        let resolved = resolver.resolve_fragment(raw, context)?;

        let paragraph_context = crate::sanitize::ParagraphContext {
            chapter_name: self.name.as_deref(),
            chapter_number: self.number.as_deref(),
            localized_name,
            position: self.paragraphs().len(),
        };

        match sanitizer.sanitize(&resolved, &paragraph_context)? {
            ParagraphVerdict::Keep(html) => {
                self.push_paragraph(html)?;
                Ok(true)
            }
            ParagraphVerdict::Discard => Ok(false),
            ParagraphVerdict::Backfill(header) => {
                self.backfill_header(header);
                Ok(false)
            }
        }
    }

    /// Fills only the fields that are still missing; an already-known
    /// value is never overwritten. Numeration goes through the same
    /// cleaning as the setters, so an empty or padded value can never
    /// reach the sort key.
    pub fn backfill_header(&mut self, header: ChapterHeader) {
        if self.volume.is_none() {
            self.volume = header.volume.as_deref().and_then(clean_numeration);
        }
        if self.number.is_none() {
            self.number = header.number.as_deref().and_then(clean_numeration);
        }
        if self.name.is_none() {
            self.name = header.name;
        }
        if self.kind.is_none() {
            self.kind = header.kind;
        }
    }
}

/// Cleans a raw volume/chapter number into its stored string form:
/// ranges keep only their first element, surrounding dots, spaces and
/// tabs go, an empty result becomes `None`. Not validated as numeric
/// here; [`numeric_key`] rejects non-numeric segments at sort time.
pub(crate) fn clean_numeration(raw: &str) -> Option<String> {
    let value = raw.split('-').next().unwrap_or(raw);
    let value = value.trim_matches([' ', '.', '\t', '\n']);
    if value.is_empty() { None } else { Some(value.to_string()) }
}

/// Sort key of a numeration string: its dot-separated segments as
/// integers. A missing value yields the empty key, which sorts first.
pub(crate) fn numeric_key(value: Option<&str>) -> Result<Vec<u64>> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };
    value
        .split('.')
        .map(|segment| {
            segment.parse::<u64>().map_err(|_| MelonError::InvalidNumber(value.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeration_cleaning() {
        assert_eq!(clean_numeration("12.5"), Some("12.5".to_string()));
        assert_eq!(clean_numeration("5-6"), Some("5".to_string()));
        assert_eq!(clean_numeration(" 7. "), Some("7".to_string()));
        assert_eq!(clean_numeration(" .. "), None);
    }

    #[test]
    fn test_numeric_key() {
        assert_eq!(numeric_key(None).unwrap(), Vec::<u64>::new());
        assert_eq!(numeric_key(Some("12.5")).unwrap(), vec![12, 5]);
        assert!(matches!(
            numeric_key(Some("12a")),
            Err(MelonError::InvalidNumber(v)) if v == "12a"
        ));
    }

    #[test]
    fn test_set_name_pretty_cleanup() {
        let mut chapter = Chapter::new_text(1);
        chapter.set_name("Возвращение.", true, None);
        assert_eq!(chapter.name.as_deref(), Some("Возвращение"));

        // Trailing dot runs become the ellipsis glyph, leading ones too.
        chapter.set_name("И вдруг...", true, None);
        assert_eq!(chapter.name.as_deref(), Some("И вдруг…"));

        chapter.set_name("...и снова", true, None);
        assert_eq!(chapter.name.as_deref(), Some("…и снова"));

        chapter.set_name(": Введение –", true, None);
        assert_eq!(chapter.name.as_deref(), Some("Введение"));

        chapter.set_name("Два\u{a0}\u{a0}слова", true, None);
        assert_eq!(chapter.name.as_deref(), Some("Два слова"));

        chapter.set_name("Возвращение.", false, None);
        assert_eq!(chapter.name.as_deref(), Some("Возвращение."));
    }

    #[test]
    fn test_set_name_backfills_from_header() {
        let dictionary = crate::words::dictionary_preset("rus").unwrap().unwrap();

        let mut chapter = Chapter::new_text(1);
        chapter.set_name("Глава 5. Начало...", true, Some(dictionary));
        assert_eq!(chapter.number.as_deref(), Some("5"));
        assert_eq!(chapter.name.as_deref(), Some("Начало…"));

        // A known number is never overwritten.
        let mut chapter = Chapter::new_text(2);
        chapter.set_number("3");
        chapter.set_name("Глава 5. Начало", true, Some(dictionary));
        assert_eq!(chapter.number.as_deref(), Some("3"));
        assert_eq!(chapter.name.as_deref(), Some("Начало"));
    }

    #[test]
    fn test_content_kind_guards() {
        let mut text = Chapter::new_text(1);
        assert!(text.push_paragraph("<p>x</p>".to_string()).is_ok());
        assert!(text.push_slide("a.png".to_string(), None, None).is_err());

        let mut slides = Chapter::new_slides(2);
        assert!(slides.push_slide("a.png".to_string(), Some(100), Some(200)).is_ok());
        assert!(slides.push_paragraph("<p>x</p>".to_string()).is_err());
        assert_eq!(slides.slides()[0].index, 1);
    }

    #[test]
    fn test_clear_keeps_variant() {
        let mut chapter = Chapter::new_slides(3);
        chapter.push_slide("a.png".to_string(), None, None).unwrap();
        assert!(chapter.has_content());

        chapter.clear_content();
        assert!(!chapter.has_content());
        assert!(matches!(chapter.content(), ChapterContent::Slides { .. }));
    }

    #[test]
    fn test_serialization_round_trip() {
        let mut chapter = Chapter::new_text(10);
        chapter.slug = Some("ch-10".to_string());
        chapter.set_number("10");
        chapter.kind = Some(ChapterKind::Chapter);
        chapter.push_paragraph("<p>Текст</p>".to_string()).unwrap();

        let json = serde_json::to_value(&chapter).unwrap();
        assert_eq!(json["type"], "chapter");
        assert_eq!(json["paragraphs"][0], "<p>Текст</p>");
        assert!(json.get("slides").is_none());

        let back: Chapter = serde_json::from_value(json).unwrap();
        assert_eq!(back, chapter);
    }

    #[test]
    fn test_slides_deserialization() {
        let json = serde_json::json!({
            "id": 5, "slug": null, "volume": "1", "number": "2",
            "name": null, "type": "chapter", "is_paid": false,
            "workers": [], "slides": [{"index": 1, "link": "p/1.png"}]
        });
        let chapter: Chapter = serde_json::from_value(json).unwrap();
        assert_eq!(chapter.slides().len(), 1);
        assert!(matches!(chapter.content(), ChapterContent::Slides { .. }));
    }

    #[test]
    fn test_backfill_only_missing_fields() {
        let mut chapter = Chapter::new_text(1);
        chapter.set_number("4");

        let header = ChapterHeader {
            volume: Some("2".to_string()),
            number: Some("9".to_string()),
            kind: Some(ChapterKind::Chapter),
            name: Some("Имя".to_string()),
        };
        chapter.backfill_header(header);

        assert_eq!(chapter.volume.as_deref(), Some("2"));
        assert_eq!(chapter.number.as_deref(), Some("4"));
        assert_eq!(chapter.name.as_deref(), Some("Имя"));
    }

    #[test]
    fn test_backfill_cleans_numeration() {
        let mut chapter = Chapter::new_text(1);
        chapter.backfill_header(ChapterHeader {
            volume: Some(String::new()),
            number: Some(" 7. ".to_string()),
            kind: None,
            name: None,
        });

        assert_eq!(chapter.volume, None);
        assert_eq!(chapter.number.as_deref(), Some("7"));
        assert_eq!(numeric_key(chapter.volume.as_deref()).unwrap(), Vec::<u64>::new());
    }
}
