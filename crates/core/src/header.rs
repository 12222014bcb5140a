//! Chapter header parsing.
//!
//! Free-text chapter headers ("Том 3. Глава 7. Возвращение") carry the
//! volume, the chapter number, the chapter type, and the residual name
//! all mashed into one string. [`ChapterHeaderParser`] peels those apart
//! using the title's [`WordsDictionary`], mutating a private working
//! copy of the header and never the original. Parsing cannot fail:
//! fields that do not match simply stay `None`.
//!
//! # Example
//!
//! ```rust
//! use melon_core::header::ChapterHeaderParser;
//! use melon_core::words::dictionary_preset;
//!
//! let dict = dictionary_preset("rus").unwrap().unwrap();
//! let header = ChapterHeaderParser::new("Глава 12.5 Новое начало", dict).parse(true);
//! assert_eq!(header.number.as_deref(), Some("12.5"));
//! assert_eq!(header.name.as_deref(), Some("Новое начало"));
//! ```

use regex::Regex;

use crate::model::ChapterKind;
use crate::words::WordsDictionary;

/// Structured data extracted from a free-text chapter header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChapterHeader {
    pub volume: Option<String>,
    pub number: Option<String>,
    pub kind: Option<ChapterKind>,
    pub name: Option<String>,
}

/// One-shot parser over a single header string.
///
/// Steps run in strict order: volume extraction, type classification,
/// number extraction, residual type-keyword removal, and (pretty mode
/// only) trailing part extraction. Each step trims its match out of the
/// working copy before the next step runs, so a number that matched as a
/// volume can never match again as a chapter number.
pub struct ChapterHeaderParser<'a> {
    header: String,
    dictionary: &'a WordsDictionary,
    volume: Option<String>,
    number: Option<String>,
    kind: Option<ChapterKind>,
}

impl<'a> ChapterHeaderParser<'a> {
    pub fn new(header: &str, dictionary: &'a WordsDictionary) -> Self {
        Self {
            header: header.trim().to_string(),
            dictionary,
            volume: None,
            number: None,
            kind: None,
        }
    }

    /// Runs the full extraction pipeline.
    ///
    /// `pretty` additionally folds a trailing part number ("Часть 2")
    /// into the chapter number.
    pub fn parse(mut self, pretty: bool) -> ChapterHeader {
        self.extract_volume();
        if let Some(volume) = self.volume.clone() {
            self.left_cut(&volume);
            self.lstrip();
        }

        self.classify_kind();

        self.extract_number(true);
        if let Some(number) = self.number.clone() {
            self.left_cut(&number);
            self.lstrip();
        }

        self.remove_type_keywords();

        if pretty {
            self.extract_part();
        }

        if self.kind.is_none() && self.number.is_some() {
            self.kind = Some(ChapterKind::Chapter);
        }

        let name = zerotify(&self.header);
        ChapterHeader { volume: self.volume, number: self.number, kind: self.kind, name }
    }

    /// Searches for `<volume keyword><digits>` and remembers the digits.
    fn extract_volume(&mut self) {
        let Some(volume_word) = self.dictionary.volume() else { return };

        let pattern = format!(r"(?i)\b{}\s*(\d+)[^\d]?", regex::escape(volume_word));
        let re = Regex::new(&pattern).unwrap();

        if let Some(captures) = re.captures(&self.header) {
            self.volume = Some(captures[1].to_string());
        }
    }

    /// Case-insensitive prefix match against the non-numbering keywords,
    /// in declared priority order. First match wins.
    fn classify_kind(&mut self) {
        let determinations = [
            (ChapterKind::Prologue, self.dictionary.prologue()),
            (ChapterKind::Epilogue, self.dictionary.epilogue()),
            (ChapterKind::Art, self.dictionary.art()),
            (ChapterKind::Afterword, self.dictionary.afterword()),
            (ChapterKind::Glossary, self.dictionary.glossary()),
            (ChapterKind::Extra, self.dictionary.extra()),
        ];

        let lower = self.header.to_lowercase();

        for (kind, word) in determinations {
            if let Some(word) = word
                && lower.starts_with(word)
            {
                self.kind = Some(kind);
                break;
            }
        }
    }

    /// Searches for a chapter number: the chapter keyword first, then
    /// (with `full_search`) every other keyword except volume and part,
    /// finally a bare digit run at the very start of the string.
    fn extract_number(&mut self, full_search: bool) {
        let mut keywords: Vec<&str> = Vec::new();
        keywords.extend(self.dictionary.chapter());

        if full_search {
            for word in self.dictionary.keywords() {
                let skip = Some(word) == self.dictionary.volume()
                    || Some(word) == self.dictionary.chapter()
                    || Some(word) == self.dictionary.part();
                if !skip {
                    keywords.push(word);
                }
            }
        }

        for keyword in keywords {
            let pattern = format!(r"(?i)\b{}\s*([\d.]+)", regex::escape(keyword));
            let re = Regex::new(&pattern).unwrap();

            // The capture class admits dots alone; a capture that is
            // empty after trimming is no number at all.
            if let Some(captures) = re.captures(&self.header) {
                let number = captures[1].trim_matches('.');
                if !number.is_empty() {
                    self.number = Some(number.to_string());
                    return;
                }
            }
        }

        let leading = Regex::new(r"^([\d.]+)").unwrap();
        if let Some(captures) = leading.captures(&self.header) {
            let number = captures[1].trim_matches('.');
            if !number.is_empty() {
                self.number = Some(number.to_string());
            }
        }
    }

    /// Cuts the working copy after the FIRST occurrence of `value`.
    ///
    /// When the extracted value coincidentally recurs later in the prose
    /// this removes the first occurrence, which may not be the marker —
    /// documented behavior, see the regression test.
    fn left_cut(&mut self, value: &str) {
        if let Some(index) = self.header.find(value) {
            self.header = self.header[index + value.len()..].to_string();
        }
    }

    /// Strips leading non-alphabetic characters. A stripped prefix of
    /// three-plus dots or an ellipsis glyph is retained as a single `…`.
    fn lstrip(&mut self) {
        let boundary = self
            .header
            .char_indices()
            .find(|(_, c)| c.is_alphabetic())
            .map(|(i, _)| i)
            .unwrap_or(self.header.len());

        let prefix = &self.header[..boundary];
        let keep_ellipsis = prefix.matches('.').count() >= 3 || prefix.contains('…');

        let mut rest = self.header[boundary..].to_string();
        if keep_ellipsis {
            rest = format!("…{rest}");
        }
        self.header = rest;
    }

    /// Drops a leftover type keyword from the start of the residual name
    /// (e.g. "Пролог" after its number was already consumed).
    fn remove_type_keywords(&mut self) {
        if self.header.is_empty() {
            return;
        }

        let lower = self.header.to_lowercase();

        for word in self.dictionary.keywords() {
            let skip = Some(word) == self.dictionary.volume()
                || Some(word) == self.dictionary.chapter()
                || Some(word) == self.dictionary.part();
            if skip {
                continue;
            }

            if lower.starts_with(word) {
                self.header = self.header[word.len()..].to_string();
                self.lstrip();
                break;
            }
        }
    }

    /// Collects a maximal trailing run of digits/dots and folds it into
    /// the chapter number as `<number>.<part>`, consuming an optional
    /// preceding part keyword and bracket padding from the name.
    fn extract_part(&mut self) {
        if self.header.is_empty() || self.number.is_none() {
            return;
        }

        let trimmed = self.header.trim_end_matches([')', ']', ' ']);
        let mut tail_start = trimmed.len();
        let mut buffer = String::new();

        for (index, character) in trimmed.char_indices().rev() {
            tail_start = index;
            if character.is_ascii_digit() || character == '.' {
                buffer.insert(0, character);
            } else {
                break;
            }
        }

        let part = buffer.trim_matches('.');
        if part.is_empty() {
            return;
        }

        let Some(number) = self.number.take() else { return };
        self.number = Some(format!("{number}.{part}"));

        let mut name = trimmed[..tail_start].to_string();
        name = name.trim_end_matches(['(', ')', '[', ']', ' ']).to_string();

        if let Some(part_word) = self.dictionary.part() {
            let lower = name.to_lowercase();
            if lower.ends_with(part_word) {
                name.truncate(name.len() - part_word.len());
            }
        }

        self.header = name.trim_end_matches(['(', ')', '[', ']', ' ']).to_string();
    }
}

/// Trims a string and maps empty to `None`.
pub(crate) fn zerotify(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
}
