//! Paragraph sanitization.
//!
//! Raw fragments scraped from third-party sites arrive with arbitrary
//! markup. [`Sanitizer`] reduces each fragment to a constrained HTML
//! subset: long-form tags are replaced with short equivalents, list and
//! break tags are unwrapped, alignment is folded into a single `align`
//! attribute, nested same-name tags collapse, and everything left is
//! checked against a [`TagWhitelist`]. A tag outside the whitelist is
//! fatal; an attribute outside the whitelist is dropped with a warning.
//!
//! The sanitizer also runs the duplicate-header heuristic: the first few
//! paragraphs of a chapter often repeat the chapter heading verbatim,
//! and those are discarded rather than stored (optionally feeding the
//! repeated heading back through [`ChapterHeaderParser`] so any header
//! fields the site page itself omitted can be recovered).

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html};

use crate::error::{MelonError, Result};
use crate::header::{ChapterHeader, ChapterHeaderParser};
use crate::words::WordsDictionary;

static SPACE_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" {2,}").unwrap());
static NEWLINE_PADDING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" *\n *").unwrap());
static STYLE_ALIGN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"text-align:\s*([a-z]+)").unwrap());
static ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(#x?[0-9a-fA-F]+|[a-zA-Z]+);").unwrap());

/// Allowed tags mapped to their allowed attributes.
///
/// `data-*` attributes pass on every allowed tag without being listed.
#[derive(Debug, Clone)]
pub struct TagWhitelist {
    allowed: BTreeMap<&'static str, &'static [&'static str]>,
}

impl TagWhitelist {
    /// Whitelist for ranobe body text.
    pub fn ranobe() -> Self {
        let mut allowed: BTreeMap<&'static str, &'static [&'static str]> = BTreeMap::new();
        allowed.insert("p", &["align"]);
        allowed.insert("b", &[]);
        allowed.insert("i", &[]);
        allowed.insert("s", &[]);
        allowed.insert("u", &[]);
        allowed.insert("sup", &[]);
        allowed.insert("sub", &[]);
        allowed.insert("img", &["src", "data-width", "data-height"]);
        allowed.insert("blockquote", &["data-name", "data-icon", "data-color"]);
        Self { allowed }
    }

    pub fn allows_tag(&self, tag: &str) -> bool {
        self.allowed.contains_key(tag)
    }

    pub fn allows_attribute(&self, tag: &str, attribute: &str) -> bool {
        if attribute.starts_with("data-") {
            return true;
        }
        self.allowed.get(tag).is_some_and(|attrs| attrs.contains(&attribute))
    }
}

/// Per-paragraph snapshot of the surrounding chapter and title.
///
/// The sanitizer never touches the document model directly; callers
/// collect the fields it needs up front and apply the verdict after.
#[derive(Debug, Clone, Default)]
pub struct ParagraphContext<'a> {
    pub chapter_name: Option<&'a str>,
    pub chapter_number: Option<&'a str>,
    pub localized_name: Option<&'a str>,
    /// Paragraphs already stored on the chapter. The duplicate-header
    /// heuristic only fires while this is below 3.
    pub position: usize,
}

/// What to do with a sanitized fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParagraphVerdict {
    /// Store the normalized HTML string.
    Keep(String),
    /// Expected noise (empty fragment, repeated heading). Not an error.
    Discard,
    /// Repeated heading that parsed into structural fields. Discard the
    /// paragraph and backfill any still-missing chapter fields.
    Backfill(ChapterHeader),
}

pub struct Sanitizer<'a> {
    whitelist: TagWhitelist,
    dictionary: &'a WordsDictionary,
    pretty: bool,
}

impl<'a> Sanitizer<'a> {
    pub fn new(whitelist: TagWhitelist, dictionary: &'a WordsDictionary, pretty: bool) -> Self {
        Self { whitelist, dictionary, pretty }
    }

    /// Normalizes one raw fragment and decides its fate.
    ///
    /// Fails only on structural violations (a tag outside the
    /// whitelist). Everything else degrades to [`ParagraphVerdict::Discard`]
    /// or an attribute drop.
    pub fn sanitize(&self, raw: &str, context: &ParagraphContext<'_>) -> Result<ParagraphVerdict> {
        let wrapped = wrap_paragraph(raw);

        if !self.pretty {
            return Ok(ParagraphVerdict::Keep(normalize_whitespace(&unescape_entities(&wrapped))));
        }

        let fragment = Html::parse_fragment(&wrapped);
        let mut rendered = String::new();

        for child in fragment.root_element().children() {
            if let Some(element) = ElementRef::wrap(child) {
                self.render_element(element, None, false, &mut rendered)?;
            } else if let Some(text) = child.value().as_text() {
                rendered.push_str(&escape_text(text));
            }
        }

        // The tree builder closes the paragraph wrapper in front of a
        // block child, leaving an empty shell behind.
        let rendered = normalize_whitespace(&rendered).replace("<p></p>", "");
        let text = fragment.root_element().text().collect::<String>();
        let text = normalize_whitespace(&text);

        if text.trim_matches([' ', '\t', '\n', '.']).is_empty() && !rendered.contains("<img") {
            return Ok(ParagraphVerdict::Discard);
        }

        if context.position < 3
            && let Some(verdict) = self.check_repeated_heading(&text, context)
        {
            return Ok(verdict);
        }

        Ok(ParagraphVerdict::Keep(rendered))
    }

    /// Recursive renderer: renames long-form tags, unwraps list/break
    /// tags and nested same-name tags, filters attributes, resolves
    /// paragraph alignment.
    fn render_element(
        &self,
        element: ElementRef<'_>,
        parent: Option<&str>,
        in_blockquote: bool,
        out: &mut String,
    ) -> Result<()> {
        let name = match element.value().name() {
            "em" => "i",
            "strong" => "b",
            "strike" | "del" => "s",
            "li" => "p",
            other => other,
        };

        // Unwrapped entirely: breaks vanish, list containers keep their
        // items (already renamed to paragraphs).
        if name == "br" {
            return Ok(());
        }
        if name == "ol" || name == "ul" {
            return self.render_children(element, parent, in_blockquote, out);
        }

        // A tag directly inside an identical tag adds nothing. Quote
        // markup is kept verbatim, including everything nested in it.
        if parent == Some(name) && name != "blockquote" && !in_blockquote {
            return self.render_children(element, Some(name), in_blockquote, out);
        }

        if !self.whitelist.allows_tag(name) {
            return Err(MelonError::UnresolvedTag(name.to_string()));
        }

        out.push('<');
        out.push_str(name);

        if name == "p"
            && let Some(align) = resolve_align(&element)
        {
            out.push_str(&format!(" align=\"{align}\""));
        }

        for (attribute, value) in element.value().attrs() {
            if name == "p" && (attribute == "align" || attribute == "style") {
                continue;
            }
            if self.whitelist.allows_attribute(name, attribute) {
                out.push_str(&format!(" {attribute}=\"{}\"", escape_attribute(value)));
            } else {
                log::warn!("Dropped attribute \"{attribute}\" on <{name}>.");
            }
        }

        out.push('>');
        if name == "img" {
            return Ok(());
        }
        self.render_children(element, Some(name), in_blockquote || name == "blockquote", out)?;
        out.push_str(&format!("</{name}>"));
        Ok(())
    }

    fn render_children(
        &self,
        element: ElementRef<'_>,
        parent: Option<&str>,
        in_blockquote: bool,
        out: &mut String,
    ) -> Result<()> {
        for child in element.children() {
            if let Some(child_element) = ElementRef::wrap(child) {
                self.render_element(child_element, parent, in_blockquote, out)?;
            } else if let Some(text) = child.value().as_text() {
                out.push_str(&escape_text(text));
            }
        }
        Ok(())
    }

    /// Early paragraphs repeating the chapter or title heading are
    /// noise. A repeat of the chapter marker itself is additionally fed
    /// back through the header parser so missing fields can be filled.
    fn check_repeated_heading(
        &self,
        text: &str,
        context: &ParagraphContext<'_>,
    ) -> Option<ParagraphVerdict> {
        let stripped = text.trim().trim_end_matches(['.', '!', '?', '…']).to_lowercase();

        let known = [context.chapter_name, context.localized_name];
        for name in known.into_iter().flatten() {
            let name = name.trim().trim_end_matches(['.', '!', '?', '…']).to_lowercase();
            if !name.is_empty() && stripped == name {
                return Some(ParagraphVerdict::Discard);
            }
        }

        if let (Some(chapter_word), Some(number)) =
            (self.dictionary.chapter(), context.chapter_number)
            && stripped.contains(chapter_word)
            && stripped.contains(number)
        {
            let header = ChapterHeaderParser::new(text, self.dictionary).parse(true);
            return Some(ParagraphVerdict::Backfill(header));
        }

        None
    }
}

/// Wraps the fragment in a paragraph tag unless it already starts with
/// one, so stored paragraphs never begin with bare inline markup.
fn wrap_paragraph(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with("<p") { trimmed.to_string() } else { format!("<p>{trimmed}</p>") }
}

/// Paragraph alignment folded from either attribute form, restricted to
/// the three values the output format understands.
fn resolve_align(element: &ElementRef<'_>) -> Option<&'static str> {
    let candidate = element.value().attr("align").map(str::to_lowercase).or_else(|| {
        let style = element.value().attr("style")?;
        Some(STYLE_ALIGN.captures(&style.to_lowercase())?[1].to_string())
    })?;

    match candidate.as_str() {
        "left" => Some("left"),
        "right" => Some("right"),
        "center" => Some("center"),
        _ => None,
    }
}

/// Replaces non-breaking spaces, collapses space runs, trims padding
/// around newlines and at the ends.
pub fn normalize_whitespace(value: &str) -> String {
    let value = value.replace('\u{a0}', " ");
    let value = NEWLINE_PADDING.replace_all(&value, "\n");
    let value = SPACE_RUNS.replace_all(&value, " ");
    value.trim().to_string()
}

/// Resolves numeric and common named entities, leaving `&lt;`, `&gt;`
/// and `&amp;` intact so stored strings stay valid HTML.
pub fn unescape_entities(value: &str) -> String {
    ENTITY
        .replace_all(value, |captures: &regex::Captures<'_>| {
            let token = &captures[1];
            let resolved = if let Some(hex) = token.strip_prefix("#x").or(token.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(decimal) = token.strip_prefix('#') {
                decimal.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match token {
                    "nbsp" => Some(' '),
                    "laquo" => Some('«'),
                    "raquo" => Some('»'),
                    "mdash" => Some('—'),
                    "ndash" => Some('–'),
                    "hellip" => Some('…'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    _ => None,
                }
            };

            match resolved {
                Some('<') | Some('>') | Some('&') | None => captures[0].to_string(),
                Some(character) => character.to_string(),
            }
        })
        .to_string()
}

fn escape_text(value: &str) -> String {
    value.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attribute(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}
