//! Per-language keyword dictionaries.
//!
//! A [`WordsDictionary`] holds the structural markers (chapter, volume,
//! prologue, ...) used to recognize numbering and typing information
//! inside free-text chapter headers. Presets are built once into an
//! immutable process-wide registry and looked up by ISO 639-3 code.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::{MelonError, Result};

/// The fixed structural slots every dictionary carries.
///
/// Order matters: type classification and number search iterate slots in
/// this declared priority order.
pub const STANDARD_KEYS: [&str; 9] = [
    "chapter",
    "volume",
    "prologue",
    "epilogue",
    "art",
    "afterword",
    "glossary",
    "extra",
    "part",
];

/// Checks a language code against the ISO 639-3 shape rule:
/// exactly 3 characters, all alphabetic, all lowercase.
pub fn check_language_code(language_code: &str) -> Result<()> {
    let valid = language_code.chars().count() == 3
        && language_code.chars().all(|c| c.is_alphabetic() && c.is_lowercase());

    if valid {
        Ok(())
    } else {
        Err(MelonError::InvalidLanguageCode(language_code.to_string()))
    }
}

/// Keyword table for one language.
///
/// Exactly the [`STANDARD_KEYS`] slots are present; anything else goes
/// through the additional-data side map. Presets are immutable once
/// registered; the only sanctioned mutation is the language-code setter.
///
/// # Example
///
/// ```rust
/// use melon_core::words::dictionary_preset;
///
/// let dict = dictionary_preset("rus").unwrap().unwrap();
/// assert_eq!(dict.chapter(), Some("глава"));
/// assert_eq!(dict.volume(), Some("том"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct WordsDictionary {
    language_code: Option<String>,
    data: BTreeMap<String, Option<String>>,
    additional_data: BTreeMap<String, String>,
}

impl WordsDictionary {
    /// Creates an empty dictionary with all standard slots unset.
    ///
    /// Errors with [`MelonError::InvalidLanguageCode`] when a code is
    /// given and fails the shape check.
    pub fn new(language_code: Option<&str>) -> Result<Self> {
        if let Some(code) = language_code {
            check_language_code(code)?;
        }

        let data = STANDARD_KEYS.iter().map(|key| (key.to_string(), None)).collect();

        Ok(Self {
            language_code: language_code.map(str::to_string),
            data,
            additional_data: BTreeMap::new(),
        })
    }

    /// ISO 639-3 code of this dictionary's language, when known.
    pub fn language_code(&self) -> Option<&str> {
        self.language_code.as_deref()
    }

    /// Sets the language code, validating its shape.
    pub fn set_language_code(&mut self, language_code: &str) -> Result<()> {
        check_language_code(language_code)?;
        self.language_code = Some(language_code.to_string());
        Ok(())
    }

    /// Sets one of the standard slots.
    ///
    /// Errors with [`MelonError::UnknownDictionaryKey`] for anything
    /// outside [`STANDARD_KEYS`].
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        if !self.data.contains_key(key) {
            return Err(MelonError::UnknownDictionaryKey(key.to_string()));
        }
        self.data.insert(key.to_string(), Some(value.to_string()));
        Ok(())
    }

    /// Reads one of the standard slots.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_deref())
    }

    /// Open-ended extra keywords outside the standard slot set.
    pub fn additional_data(&self) -> &BTreeMap<String, String> {
        &self.additional_data
    }

    /// Stores an extra keyword outside the standard slot set.
    pub fn add_additional_data(&mut self, key: &str, value: &str) {
        self.additional_data.insert(key.to_string(), value.to_string());
    }

    /// Keyword marking chapters ("глава", "chapter").
    pub fn chapter(&self) -> Option<&str> {
        self.get("chapter")
    }

    /// Keyword marking volumes ("том", "volume").
    pub fn volume(&self) -> Option<&str> {
        self.get("volume")
    }

    pub fn prologue(&self) -> Option<&str> {
        self.get("prologue")
    }

    pub fn epilogue(&self) -> Option<&str> {
        self.get("epilogue")
    }

    pub fn art(&self) -> Option<&str> {
        self.get("art")
    }

    pub fn afterword(&self) -> Option<&str> {
        self.get("afterword")
    }

    pub fn glossary(&self) -> Option<&str> {
        self.get("glossary")
    }

    pub fn extra(&self) -> Option<&str> {
        self.get("extra")
    }

    /// Keyword marking chapter parts ("часть", "part"), used only by the
    /// pretty-mode part extractor.
    pub fn part(&self) -> Option<&str> {
        self.get("part")
    }

    /// All set keywords in declaration priority order.
    pub fn keywords(&self) -> Vec<&str> {
        STANDARD_KEYS.iter().filter_map(|key| self.get(key)).collect()
    }
}

fn build_preset(language_code: &str, words: &[(&str, &str)]) -> WordsDictionary {
    let mut dict = WordsDictionary::new(Some(language_code)).expect("preset language code");
    for (key, value) in words {
        dict.set(key, value).expect("preset key");
    }
    dict
}

static PRESETS: LazyLock<BTreeMap<&'static str, WordsDictionary>> = LazyLock::new(|| {
    let mut presets = BTreeMap::new();

    presets.insert(
        "rus",
        build_preset(
            "rus",
            &[
                ("chapter", "глава"),
                ("volume", "том"),
                ("prologue", "пролог"),
                ("epilogue", "эпилог"),
                ("art", "начальные иллюстрации"),
                ("afterword", "послесловие"),
                ("glossary", "глоссарий"),
                ("extra", "экстра"),
                ("part", "часть"),
            ],
        ),
    );

    presets.insert(
        "eng",
        build_preset(
            "eng",
            &[
                ("chapter", "chapter"),
                ("volume", "volume"),
                ("prologue", "prologue"),
                ("epilogue", "epilogue"),
                ("art", "art"),
                ("afterword", "afterword"),
                ("glossary", "glossary"),
                ("extra", "extra"),
                ("part", "part"),
            ],
        ),
    );

    presets
});

/// Looks up the preset dictionary for a language code.
///
/// Errors when the code fails the shape check; returns `Ok(None)` for
/// well-formed codes without a bundled preset.
pub fn dictionary_preset(language_code: &str) -> Result<Option<&'static WordsDictionary>> {
    check_language_code(language_code)?;
    Ok(PRESETS.get(language_code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_language_code() {
        assert!(check_language_code("rus").is_ok());
        assert!(check_language_code("eng").is_ok());
        assert!(matches!(
            check_language_code("en"),
            Err(MelonError::InvalidLanguageCode(_))
        ));
        assert!(matches!(
            check_language_code("ENG"),
            Err(MelonError::InvalidLanguageCode(_))
        ));
        assert!(matches!(
            check_language_code("e1g"),
            Err(MelonError::InvalidLanguageCode(_))
        ));
    }

    #[test]
    fn test_standard_keys_only() {
        let mut dict = WordsDictionary::new(Some("eng")).unwrap();
        assert!(dict.set("chapter", "chapter").is_ok());
        assert!(matches!(
            dict.set("интерлюдия", "interlude"),
            Err(MelonError::UnknownDictionaryKey(_))
        ));

        dict.add_additional_data("interlude", "интерлюдия");
        assert_eq!(dict.additional_data().get("interlude").map(String::as_str), Some("интерлюдия"));
    }

    #[test]
    fn test_preset_lookup() {
        let rus = dictionary_preset("rus").unwrap().unwrap();
        assert_eq!(rus.chapter(), Some("глава"));
        assert_eq!(rus.prologue(), Some("пролог"));
        assert_eq!(rus.language_code(), Some("rus"));

        // valid shape, no preset bundled
        assert!(dictionary_preset("jpn").unwrap().is_none());
        // malformed code
        assert!(dictionary_preset("j").is_err());
    }

    #[test]
    fn test_keywords_priority_order() {
        let eng = dictionary_preset("eng").unwrap().unwrap();
        let keywords = eng.keywords();
        assert_eq!(keywords[0], "chapter");
        assert_eq!(keywords[1], "volume");
        assert_eq!(keywords[2], "prologue");
    }
}
