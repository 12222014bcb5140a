//! Title: the aggregate root of the document model.
//!
//! A title is created fresh for a scraping run or loaded from its
//! canonical JSON document, mutated through the parse/amend/repair
//! cycle, and written back with `save`. The stored `branches` list is
//! derived metadata and recomputed on every save; the `content` map is
//! the source of truth for chapters.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::ParserConfig;
use crate::error::{MelonError, Result};
use crate::journal::CacheJournal;
use crate::model::branch::{Branch, BranchSummary};
use crate::model::chapter::{Chapter, ChapterContent};
use crate::model::{By, Cover, Format, Person, Status};
use crate::words::{WordsDictionary, check_language_code, dictionary_preset};

/// Fetches the content body of a single chapter from the source site.
///
/// Implemented by site adapters outside this crate. A chapter that no
/// longer exists at the source reports [`MelonError::ChapterNotFound`],
/// which bulk operations treat as a skip.
pub trait ContentSource {
    fn fetch_content(&mut self, branch_id: i64, chapter: &Chapter) -> Result<ChapterContent>;
}

/// Outcome of a bulk amend run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AmendSummary {
    pub amended: usize,
    pub skipped: usize,
}

/// Serialized shape of the canonical JSON document.
#[derive(Debug, Serialize, Deserialize)]
struct TitleDocument {
    format: String,
    #[serde(default)]
    site: Option<String>,
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default)]
    content_language: Option<String>,
    #[serde(default)]
    localized_name: Option<String>,
    #[serde(default)]
    eng_name: Option<String>,
    #[serde(default)]
    another_names: Vec<String>,
    #[serde(default)]
    covers: Vec<Cover>,
    #[serde(default)]
    authors: Vec<String>,
    #[serde(default)]
    publication_year: Option<i32>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    age_limit: Option<u8>,
    #[serde(default)]
    status: Option<Status>,
    #[serde(default)]
    is_licensed: Option<bool>,
    #[serde(default)]
    genres: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    franchises: Vec<String>,
    #[serde(default)]
    persons: Vec<Person>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    original_language: Option<String>,
    #[serde(default)]
    branches: Vec<BranchSummary>,
    #[serde(default)]
    content: BTreeMap<String, Vec<Chapter>>,
}

/// A tracked manga or ranobe work.
#[derive(Debug, Clone, PartialEq)]
pub struct Title {
    pub format: Format,
    pub site: Option<String>,
    pub id: Option<i64>,
    pub slug: Option<String>,
    pub content_language: Option<String>,
    pub localized_name: Option<String>,
    pub eng_name: Option<String>,
    pub another_names: Vec<String>,
    pub covers: Vec<Cover>,
    pub authors: Vec<String>,
    pub publication_year: Option<i32>,
    pub description: Option<String>,
    pub age_limit: Option<u8>,
    pub status: Option<Status>,
    pub is_licensed: Option<bool>,
    pub genres: Vec<String>,
    pub tags: Vec<String>,
    pub franchises: Vec<String>,
    pub persons: Vec<Person>,
    /// Ranobe only: the language the work was originally written in.
    pub original_language: Option<String>,
    branches: Vec<Branch>,
}

impl Title {
    pub fn new(format: Format) -> Self {
        Self {
            format,
            site: None,
            id: None,
            slug: None,
            content_language: None,
            localized_name: None,
            eng_name: None,
            another_names: Vec::new(),
            covers: Vec::new(),
            authors: Vec::new(),
            publication_year: None,
            description: None,
            age_limit: None,
            status: None,
            is_licensed: None,
            genres: Vec::new(),
            tags: Vec::new(),
            franchises: Vec::new(),
            persons: Vec::new(),
            original_language: None,
            branches: Vec::new(),
        }
    }

    /// Validates and stores the content language, which selects the
    /// words dictionary used by header parsing.
    pub fn set_content_language(&mut self, code: &str) -> Result<()> {
        check_language_code(code)?;
        self.content_language = Some(code.to_string());
        Ok(())
    }

    /// Dictionary preset for the title's content language, when one is
    /// known and bundled.
    pub fn dictionary(&self) -> Result<Option<&'static WordsDictionary>> {
        match &self.content_language {
            Some(code) => dictionary_preset(code),
            None => Ok(None),
        }
    }

    /// Adds an alternate name unless it repeats the primary names or an
    /// existing entry.
    pub fn add_another_name(&mut self, name: &str) {
        let name = name.trim();
        if name.is_empty()
            || self.localized_name.as_deref() == Some(name)
            || self.eng_name.as_deref() == Some(name)
            || self.another_names.iter().any(|known| known == name)
        {
            return;
        }
        self.another_names.push(name.to_string());
    }

    pub fn add_author(&mut self, author: &str) {
        push_unique(&mut self.authors, author);
    }

    pub fn add_genre(&mut self, genre: &str) {
        push_unique(&mut self.genres, genre);
    }

    pub fn add_tag(&mut self, tag: &str) {
        push_unique(&mut self.tags, tag);
    }

    pub fn add_franchise(&mut self, franchise: &str) {
        push_unique(&mut self.franchises, franchise);
    }

    pub fn add_cover(&mut self, cover: Cover) {
        if !self.covers.iter().any(|known| known.link == cover.link) {
            self.covers.push(cover);
        }
    }

    pub fn add_person(&mut self, person: Person) {
        if !self.persons.iter().any(|known| known.name == person.name) {
            self.persons.push(person);
        }
    }

    pub fn branches(&self) -> &[Branch] {
        &self.branches
    }

    pub fn branches_mut(&mut self) -> &mut [Branch] {
        &mut self.branches
    }

    /// Attaches a branch. The branch must carry an ID; a duplicate ID
    /// is a silent no-op. Branches are kept ordered by descending
    /// chapter count, a presentation heuristic only.
    pub fn add_branch(&mut self, branch: Branch) -> Result<()> {
        let id =
            branch.id.ok_or_else(|| MelonError::Parsing("branch has no ID".to_string()))?;

        if self.branches.iter().any(|known| known.id == Some(id)) {
            log::debug!("Skipped duplicate branch {id}.");
            return Ok(());
        }

        self.branches.push(branch);
        self.branches.sort_by(|a, b| b.chapters_count().cmp(&a.chapters_count()));
        Ok(())
    }

    pub fn get_branch(&mut self, id: i64) -> Option<&mut Branch> {
        self.branches.iter_mut().find(|branch| branch.id == Some(id))
    }

    /// Finds a chapter by ID across all branches.
    pub fn find_chapter(&self, id: i64) -> Result<&Chapter> {
        self.branches
            .iter()
            .find_map(|branch| branch.get_chapter(id).ok())
            .ok_or(MelonError::ChapterNotFound(id))
    }

    /// The basename local files for this title are stored under.
    pub fn used_filename(&self, config: &ParserConfig) -> Result<String> {
        let filename = if config.use_id_as_filename {
            self.id.map(|id| id.to_string())
        } else {
            self.slug.clone().or_else(|| self.id.map(|id| id.to_string()))
        };
        filename.ok_or_else(|| MelonError::Parsing("title has neither ID nor slug".to_string()))
    }

    /// Loads a title from its local JSON document.
    ///
    /// `identificator` is interpreted per `by`: a bare filename, a
    /// slug, or a numeric ID. Slug/ID resolution consults the journal
    /// first (when caching is on) and falls back to scanning every
    /// document in the titles directory for a matching declared field.
    pub fn open(
        identificator: &str,
        by: By,
        config: &ParserConfig,
        journal: Option<&mut dyn CacheJournal>,
    ) -> Result<Title> {
        let journal = journal.filter(|_| config.caching);
        let path = resolve_title_path(identificator, by, config, journal.as_deref())?;

        let document: TitleDocument = serde_json::from_str(&fs::read_to_string(&path)?)?;
        let mut title = Title::from_document(document)?;

        // Cross-resolve the missing half of the ID/slug pair.
        if let Some(journal) = journal {
            match (title.id, &title.slug) {
                (None, Some(slug)) => title.id = journal.id_by_slug(slug),
                (Some(id), None) => title.slug = journal.slug_by_id(id),
                _ => {}
            }
        }

        Ok(title)
    }

    /// Persists the canonical JSON document, recomputing the branch
    /// summaries, and records the ID/slug pair in the journal.
    pub fn save(
        &self,
        config: &ParserConfig,
        journal: Option<&mut dyn CacheJournal>,
    ) -> Result<PathBuf> {
        let filename = self.used_filename(config)?;
        fs::create_dir_all(&config.titles_directory)?;

        let path = config.title_path(&filename);
        fs::write(&path, serde_json::to_string_pretty(&self.to_document())?)?;
        log::info!("Saved \"{filename}\".");

        if config.caching
            && let (Some(id), Some(slug)) = (self.id, self.slug.as_deref())
            && let Some(journal) = journal
        {
            journal.update(id, slug)?;
        }

        Ok(path)
    }

    /// Reconciles chapter content against a second on-disk document of
    /// the same title. For every chapter ID present on both sides, a
    /// non-empty external body wholesale-replaces the local one.
    /// Returns the number of chapters replaced.
    ///
    /// A format mismatch rejects the whole source with a log entry
    /// rather than an error; a source chapter carrying content but no
    /// ID is a data-integrity failure.
    pub fn merge(&mut self, path: &Path) -> Result<usize> {
        if !path.exists() {
            return Err(MelonError::FileNotFound(path.to_path_buf()));
        }

        let document: TitleDocument = serde_json::from_str(&fs::read_to_string(path)?)?;
        match Format::parse(&document.format) {
            Ok(format) if format == self.format => {}
            Ok(format) => {
                log::error!(
                    "Merge source rejected: format \"{}\" does not match \"{}\".",
                    format.as_str(),
                    self.format.as_str()
                );
                return Ok(0);
            }
            Err(error) => {
                log::error!("Merge source rejected: {error}.");
                return Ok(0);
            }
        }

        let mut external: HashMap<i64, ChapterContent> = HashMap::new();
        for chapters in document.content.into_values() {
            for chapter in chapters {
                match chapter.id {
                    Some(id) => {
                        external.insert(id, chapter.content().clone());
                    }
                    None if chapter.has_content() => {
                        return Err(MelonError::Merging(
                            "merge source chapter carries content but no ID".to_string(),
                        ));
                    }
                    None => {}
                }
            }
        }

        let mut replaced = 0;
        for branch in &mut self.branches {
            for chapter in branch.chapters_mut() {
                let Some(id) = chapter.id else { continue };
                if let Some(content) = external.remove(&id)
                    && !content.is_empty()
                {
                    chapter.set_content(content);
                    replaced += 1;
                }
            }
        }

        log::info!("Merged {replaced} chapters.");
        Ok(replaced)
    }

    /// Fetches content for every chapter that has none. A chapter
    /// missing at the source is skipped; other failures abort the run.
    pub fn amend<S: ContentSource>(
        &mut self,
        source: &mut S,
        config: &ParserConfig,
    ) -> Result<AmendSummary> {
        let mut summary = AmendSummary::default();

        for branch in &mut self.branches {
            let Some(branch_id) = branch.id else { continue };

            for chapter in branch.chapters_mut() {
                if chapter.has_content() {
                    continue;
                }

                match source.fetch_content(branch_id, chapter) {
                    Ok(content) => {
                        chapter.set_content(content);
                        summary.amended += 1;
                        std::thread::sleep(config.delay);
                    }
                    Err(MelonError::ChapterNotFound(id)) => {
                        log::warn!("Chapter {id} not found at source, skipped.");
                        summary.skipped += 1;
                    }
                    Err(other) => return Err(other),
                }
            }
        }

        log::info!("Amended {} chapters, skipped {}.", summary.amended, summary.skipped);
        Ok(summary)
    }

    /// Discards and re-fetches one chapter's content.
    pub fn repair<S: ContentSource>(&mut self, chapter_id: i64, source: &mut S) -> Result<()> {
        for branch in &mut self.branches {
            let Some(branch_id) = branch.id else { continue };
            if !branch.contains_chapter(chapter_id) {
                continue;
            }

            let chapter = branch.get_chapter_mut(chapter_id)?;
            chapter.clear_content();
            let content = source.fetch_content(branch_id, chapter)?;
            chapter.set_content(content);
            return Ok(());
        }

        Err(MelonError::ChapterNotFound(chapter_id))
    }

    fn to_document(&self) -> TitleDocument {
        let mut summaries: Vec<BranchSummary> =
            self.branches.iter().filter_map(Branch::summary).collect();
        summaries.sort_by(|a, b| b.chapters_count.cmp(&a.chapters_count));

        let content = self
            .branches
            .iter()
            .filter_map(|branch| {
                branch.id.map(|id| (id.to_string(), branch.chapters().to_vec()))
            })
            .collect();

        TitleDocument {
            format: self.format.as_str().to_string(),
            site: self.site.clone(),
            id: self.id,
            slug: self.slug.clone(),
            content_language: self.content_language.clone(),
            localized_name: self.localized_name.clone(),
            eng_name: self.eng_name.clone(),
            another_names: self.another_names.clone(),
            covers: self.covers.clone(),
            authors: self.authors.clone(),
            publication_year: self.publication_year,
            description: self.description.clone(),
            age_limit: self.age_limit,
            status: self.status,
            is_licensed: self.is_licensed,
            genres: self.genres.clone(),
            tags: self.tags.clone(),
            franchises: self.franchises.clone(),
            persons: self.persons.clone(),
            original_language: self.original_language.clone(),
            branches: summaries,
            content,
        }
    }

    fn from_document(document: TitleDocument) -> Result<Title> {
        let mut title = Title::new(Format::parse(&document.format)?);

        title.site = document.site;
        title.id = document.id;
        title.slug = document.slug;
        if let Some(code) = document.content_language {
            title.set_content_language(&code)?;
        }
        title.localized_name = document.localized_name;
        title.eng_name = document.eng_name;
        title.another_names = document.another_names;
        title.covers = document.covers;
        title.authors = document.authors;
        title.publication_year = document.publication_year;
        title.description = document.description;
        title.age_limit = document.age_limit;
        title.status = document.status;
        title.is_licensed = document.is_licensed;
        title.genres = document.genres;
        title.tags = document.tags;
        title.franchises = document.franchises;
        title.persons = document.persons;
        title.original_language = document.original_language;

        // The stored summaries are derived data; the content map is
        // authoritative.
        for (key, chapters) in document.content {
            let branch_id = key
                .parse::<i64>()
                .map_err(|_| MelonError::Parsing(format!("invalid branch key \"{key}\"")))?;
            title.add_branch(Branch::from_chapters(branch_id, chapters)?)?;
        }

        Ok(title)
    }
}

fn push_unique(values: &mut Vec<String>, value: &str) {
    let value = value.trim();
    if !value.is_empty() && !values.iter().any(|known| known == value) {
        values.push(value.to_string());
    }
}

/// Maps the identificator to an existing document path.
fn resolve_title_path(
    identificator: &str,
    by: By,
    config: &ParserConfig,
    journal: Option<&dyn CacheJournal>,
) -> Result<PathBuf> {
    let direct = config.title_path(identificator);

    match by {
        By::Filename => {
            if direct.exists() {
                return Ok(direct);
            }
        }
        By::Slug => {
            if direct.exists() {
                return Ok(direct);
            }
            if let Some(id) = journal.and_then(|journal| journal.id_by_slug(identificator)) {
                let cached = config.title_path(&id.to_string());
                if cached.exists() {
                    return Ok(cached);
                }
            }
            if let Some(found) = scan_titles(config, "slug", &identificator.into())? {
                return Ok(found);
            }
        }
        By::Id => {
            if direct.exists() {
                return Ok(direct);
            }
            if let Some(slug) = journal.and_then(|journal| {
                identificator.parse::<i64>().ok().and_then(|id| journal.slug_by_id(id))
            }) {
                let cached = config.title_path(&slug);
                if cached.exists() {
                    return Ok(cached);
                }
            }
            let id = identificator
                .parse::<i64>()
                .map_err(|_| MelonError::Parsing(format!("invalid title ID \"{identificator}\"")))?;
            if let Some(found) = scan_titles(config, "id", &id.into())? {
                return Ok(found);
            }
        }
    }

    Err(MelonError::TitleFileNotFound(identificator.to_string()))
}

/// Inspects every JSON document in the titles directory for a matching
/// declared field. Unreadable files are skipped.
fn scan_titles(
    config: &ParserConfig,
    field: &str,
    expected: &serde_json::Value,
) -> Result<Option<PathBuf>> {
    if !config.titles_directory.is_dir() {
        return Ok(None);
    }

    for entry in fs::read_dir(&config.titles_directory)? {
        let path = entry?.path();
        if path.extension().is_none_or(|ext| ext != "json") {
            continue;
        }

        let Ok(raw) = fs::read_to_string(&path) else { continue };
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&raw) else { continue };

        if value.get(field) == Some(expected) {
            return Ok(Some(path));
        }
    }

    Ok(None)
}
