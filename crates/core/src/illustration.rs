//! Illustration resolution.
//!
//! Every `<img>` inside a chapter paragraph must end up pointing at a
//! locally stored file under the chapter's illustration directory. The
//! resolver handles three source shapes: a missing `src` (the tag is
//! removed), an inline Base64 data URI (decoded to a deterministic
//! filename), and a remote URL (downloaded through an [`ImageClient`]).
//!
//! Mount paths are a pure function of title, chapter and filename, so
//! repeated runs against unchanged input rewrite to identical paths no
//! matter how the individual fetches went.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use percent_encoding::percent_decode_str;
use scraper::{Html, Selector};
use url::Url;

use crate::config::ParserConfig;
use crate::error::{MelonError, Result};
use crate::fetch::{ImageClient, ImageResolution, probe_resolution};

/// Title/chapter coordinates an illustration is resolved against.
#[derive(Debug, Clone, Copy)]
pub struct IllustrationContext<'a> {
    pub used_filename: &'a str,
    pub chapter_id: i64,
}

/// Running counters for one resolution pass, reported to the caller
/// instead of aborting on download failures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolverStats {
    pub downloaded: usize,
    pub reused: usize,
    pub failed: usize,
    pub substituted: usize,
    pub removed: usize,
}

enum ImgAction {
    Remove,
    Rewrite { src: String, resolution: Option<ImageResolution> },
    Leave,
}

/// The canonical relative path an illustration is referenced by in the
/// stored document. Independent of fetch order and outcome.
pub fn mount_path(used_filename: &str, chapter_id: i64, filename: &str) -> String {
    format!("{used_filename}/illustrations/{chapter_id}/{filename}")
}

/// Resolves `<img>` tags against local storage.
///
/// Existence checks are memoized for the lifetime of one resolver, so a
/// payload repeated within a chapter hits the filesystem once.
pub struct IllustrationResolver<'a, C: ImageClient> {
    config: &'a ParserConfig,
    client: &'a mut C,
    known_files: HashSet<PathBuf>,
    pub stats: ResolverStats,
}

impl<'a, C: ImageClient> IllustrationResolver<'a, C> {
    pub fn new(config: &'a ParserConfig, client: &'a mut C) -> Self {
        Self { config, client, known_files: HashSet::new(), stats: ResolverStats::default() }
    }

    /// Local directory the chapter's illustrations are written to.
    pub fn local_directory(&self, context: IllustrationContext<'_>) -> PathBuf {
        self.config
            .images_directory
            .join(context.used_filename)
            .join("illustrations")
            .join(context.chapter_id.to_string())
    }

    /// Rewrites every `<img>` in the fragment to a local mount path,
    /// fetching or decoding the referenced image as needed.
    ///
    /// Fails only on an undecodable inline payload; download failures
    /// degrade to the stub image or the original `src`.
    pub fn resolve_fragment(
        &mut self,
        html: &str,
        context: IllustrationContext<'_>,
    ) -> Result<String> {
        if !html.contains("<img") {
            return Ok(html.to_string());
        }

        let fragment = Html::parse_fragment(html);
        let selector = Selector::parse("img").unwrap();

        let mut actions = Vec::new();
        for element in fragment.select(&selector) {
            let action = match element.value().attr("src") {
                None => {
                    log::warn!("Removed <img> without src in chapter {}.", context.chapter_id);
                    self.stats.removed += 1;
                    ImgAction::Remove
                }
                Some(src) if src.starts_with("data:") => self.resolve_inline(src, context)?,
                Some(src) => self.resolve_remote(src, context),
            };
            actions.push(action);
        }

        Ok(apply_actions(html, actions))
    }

    /// Decodes a `data:` URI to a deterministic filename derived from
    /// the payload itself, skipping the decode when the file is already
    /// present and force mode is off.
    fn resolve_inline(
        &mut self,
        src: &str,
        context: IllustrationContext<'_>,
    ) -> Result<ImgAction> {
        let (mime, payload) = split_data_uri(src)?;
        let subtype = mime.split('/').next_back().unwrap_or("png");

        let stem: String = payload.chars().filter(|c| *c != '/' && *c != '+').take(16).collect();
        let filename = format!("{stem}.{subtype}");
        let target = self.local_directory(context).join(&filename);

        let resolution = if self.file_exists(&target) && !self.config.force {
            self.stats.reused += 1;
            self.probe_existing(&target)
        } else {
            let bytes = BASE64
                .decode(payload.trim())
                .map_err(|e| MelonError::InvalidBase64(e.to_string()))?;
            self.write_image(&target, &bytes)?;
            self.stats.downloaded += 1;
            if self.config.sizing_images { probe_resolution(&bytes) } else { None }
        };

        Ok(ImgAction::Rewrite {
            src: mount_path(context.used_filename, context.chapter_id, &filename),
            resolution,
        })
    }

    /// Downloads a remote image unless a file with the same basename is
    /// already present. The body lands in the temp directory first and
    /// is moved into place by the client. Failures substitute the
    /// configured stub or leave the tag untouched.
    fn resolve_remote(&mut self, src: &str, context: IllustrationContext<'_>) -> ImgAction {
        let filename = remote_filename(src);
        let directory = self.local_directory(context);
        let target = directory.join(&filename);
        let mounted = mount_path(context.used_filename, context.chapter_id, &filename);

        if self.file_exists(&target) && !self.config.force {
            self.stats.reused += 1;
            let resolution = self.probe_existing(&target);
            return ImgAction::Rewrite { src: mounted, resolution };
        }

        let outcome = match self.client.fetch(src) {
            Ok(outcome) => outcome,
            Err(error) => {
                log::warn!("Image request to \"{src}\" failed: {error}.");
                self.stats.failed += 1;
                return self.substitute_stub(&target, mounted, src);
            }
        };

        if !outcome.is_usable() {
            log::warn!(
                "Image \"{src}\" rejected: status {}, {} bytes.",
                outcome.status,
                outcome.bytes.len()
            );
            self.stats.failed += 1;
            return self.substitute_stub(&target, mounted, src);
        }

        if let Err(error) = self.store_download(&directory, &filename, &outcome.bytes) {
            log::warn!("Could not store image \"{filename}\": {error}.");
            self.stats.failed += 1;
            return ImgAction::Leave;
        }

        self.known_files.insert(target);
        self.stats.downloaded += 1;
        std::thread::sleep(self.config.delay);

        let resolution =
            if self.config.sizing_images { probe_resolution(&outcome.bytes) } else { None };
        ImgAction::Rewrite { src: mounted, resolution }
    }

    fn substitute_stub(&mut self, target: &Path, mounted: String, original: &str) -> ImgAction {
        let Some(stub) = &self.config.bad_image_stub else {
            return ImgAction::Leave;
        };

        match fs::read(stub).and_then(|bytes| {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(target, bytes)
        }) {
            Ok(()) => {
                log::warn!("Substituted stub for \"{original}\".");
                self.known_files.insert(target.to_path_buf());
                self.stats.substituted += 1;
                ImgAction::Rewrite { src: mounted, resolution: None }
            }
            Err(error) => {
                log::warn!("Stub substitution failed: {error}.");
                ImgAction::Leave
            }
        }
    }

    /// Writes the fetched body into the temp directory and has the
    /// client move it into the chapter's illustration directory.
    fn store_download(&mut self, directory: &Path, filename: &str, bytes: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.config.temp_directory)?;
        let temp = self.config.temp_directory.join(filename);
        fs::write(&temp, bytes)?;

        let moved = self.client.move_from_temp(&temp, directory, filename)?;
        if moved.already_existed {
            log::debug!("Replaced existing image \"{filename}\".");
        }
        Ok(())
    }

    fn write_image(&mut self, target: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(target, bytes)?;
        self.known_files.insert(target.to_path_buf());
        Ok(())
    }

    fn file_exists(&mut self, path: &Path) -> bool {
        if self.known_files.contains(path) {
            return true;
        }
        if path.exists() {
            self.known_files.insert(path.to_path_buf());
            return true;
        }
        false
    }

    fn probe_existing(&self, path: &Path) -> Option<ImageResolution> {
        if !self.config.sizing_images {
            return None;
        }
        fs::read(path).ok().as_deref().and_then(probe_resolution)
    }
}

/// Basename of the URL path, percent-decoded. Falls back to splitting
/// the raw string when the `src` is not an absolute URL.
fn remote_filename(src: &str) -> String {
    let basename = Url::parse(src)
        .ok()
        .and_then(|url| {
            url.path_segments().and_then(|segments| {
                segments.filter(|s| !s.is_empty()).next_back().map(str::to_string)
            })
        })
        .unwrap_or_else(|| {
            src.rsplit('/').next().unwrap_or(src).split(['?', '#']).next().unwrap_or(src).to_string()
        });

    percent_decode_str(&basename).decode_utf8_lossy().into_owned()
}

/// Splits `data:<mime>;base64,<payload>` into its two useful pieces.
fn split_data_uri(src: &str) -> Result<(&str, &str)> {
    let invalid = || MelonError::InvalidBase64(format!("malformed data URI \"{:.40}\"", src));

    let rest = src.strip_prefix("data:").ok_or_else(invalid)?;
    let (header, payload) = rest.split_once(',').ok_or_else(invalid)?;
    let mime = header.split(';').next().ok_or_else(invalid)?;

    if !header.contains("base64") || payload.is_empty() {
        return Err(invalid());
    }

    Ok((mime, payload))
}

/// Applies per-occurrence actions to the fragment, in document order.
/// Rewriter failures fall back to the untouched input.
fn apply_actions(html: &str, actions: Vec<ImgAction>) -> String {
    let mut queue = actions.into_iter();
    let mut output = Vec::new();

    let mut rewriter = lol_html::HtmlRewriter::new(
        lol_html::Settings {
            element_content_handlers: vec![lol_html::element!("img", |el| {
                match queue.next() {
                    Some(ImgAction::Remove) => el.remove(),
                    Some(ImgAction::Rewrite { src, resolution }) => {
                        el.set_attribute("src", &src).ok();
                        if let Some(resolution) = resolution {
                            el.set_attribute("data-width", &resolution.width.to_string()).ok();
                            el.set_attribute("data-height", &resolution.height.to_string()).ok();
                        }
                    }
                    Some(ImgAction::Leave) | None => {}
                }
                Ok(())
            })],
            ..Default::default()
        },
        |c: &[u8]| output.extend_from_slice(c),
    );

    if rewriter.write(html.as_bytes()).is_err() || rewriter.end().is_err() {
        return html.to_string();
    }

    String::from_utf8(output).unwrap_or_else(|_| html.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchOutcome;
    use std::time::Duration;

    struct StubClient {
        responses: Vec<FetchOutcome>,
        calls: usize,
    }

    impl StubClient {
        fn with(responses: Vec<FetchOutcome>) -> Self {
            Self { responses, calls: 0 }
        }
    }

    impl ImageClient for StubClient {
        fn fetch(&mut self, _url: &str) -> Result<FetchOutcome> {
            let outcome = self.responses[self.calls.min(self.responses.len() - 1)].clone();
            self.calls += 1;
            Ok(outcome)
        }
    }

    fn test_config(root: &Path) -> ParserConfig {
        ParserConfig::default().with_output_root(root).with_delay(Duration::ZERO)
    }

    const CONTEXT: IllustrationContext<'static> =
        IllustrationContext { used_filename: "my-title", chapter_id: 42 };

    #[test]
    fn test_mount_path_is_deterministic() {
        let first = mount_path("my-title", 42, "page.png");
        let second = mount_path("my-title", 42, "page.png");
        assert_eq!(first, second);
        assert_eq!(first, "my-title/illustrations/42/page.png");
    }

    #[test]
    fn test_srcless_img_removed() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let mut client = StubClient::with(vec![]);
        let mut resolver = IllustrationResolver::new(&config, &mut client);

        let result = resolver.resolve_fragment("<p>до<img>после</p>", CONTEXT).unwrap();
        assert_eq!(result, "<p>допосле</p>");
        assert_eq!(resolver.stats.removed, 1);
    }

    #[test]
    fn test_remote_download_and_reuse() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let mut client = StubClient::with(vec![FetchOutcome { status: 200, bytes: vec![7; 2000] }]);
        let mut resolver = IllustrationResolver::new(&config, &mut client);

        let html = "<p><img src=\"https://example.com/pages/page%201.png\"></p>";
        let result = resolver.resolve_fragment(html, CONTEXT).unwrap();
        assert!(result.contains("src=\"my-title/illustrations/42/page 1.png\""));
        assert_eq!(resolver.stats.downloaded, 1);

        // Second pass finds the file on disk and skips the fetch.
        let again = resolver.resolve_fragment(html, CONTEXT).unwrap();
        assert!(again.contains("my-title/illustrations/42/page 1.png"));
        assert_eq!(resolver.stats.reused, 1);
        assert_eq!(client.calls, 1);
    }

    #[test]
    fn test_remote_download_moves_through_temp() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let mut client = StubClient::with(vec![FetchOutcome { status: 200, bytes: vec![3; 4096] }]);
        let mut resolver = IllustrationResolver::new(&config, &mut client);

        let html = "<p><img src=\"https://example.com/art/page.png\"></p>";
        resolver.resolve_fragment(html, CONTEXT).unwrap();

        // The body passed through temp/ and ended up in the chapter
        // directory; nothing is left behind.
        let stored = fs::read(resolver.local_directory(CONTEXT).join("page.png")).unwrap();
        assert_eq!(stored, vec![3; 4096]);
        assert!(config.temp_directory.exists());
        assert_eq!(fs::read_dir(&config.temp_directory).unwrap().count(), 0);
    }

    #[test]
    fn test_failed_download_keeps_original_src() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let mut client = StubClient::with(vec![FetchOutcome { status: 404, bytes: Vec::new() }]);
        let mut resolver = IllustrationResolver::new(&config, &mut client);

        let html = "<p><img src=\"https://example.com/gone.png\"></p>";
        let result = resolver.resolve_fragment(html, CONTEXT).unwrap();
        assert!(result.contains("https://example.com/gone.png"));
        assert_eq!(resolver.stats.failed, 1);
    }

    #[test]
    fn test_failed_download_substitutes_stub() {
        let dir = tempfile::tempdir().unwrap();
        let stub = dir.path().join("stub.png");
        fs::write(&stub, b"stub-bytes").unwrap();

        let mut config = test_config(dir.path());
        config.bad_image_stub = Some(stub);
        let mut client = StubClient::with(vec![FetchOutcome { status: 500, bytes: Vec::new() }]);
        let mut resolver = IllustrationResolver::new(&config, &mut client);

        let html = "<p><img src=\"https://example.com/broken.png\"></p>";
        let result = resolver.resolve_fragment(html, CONTEXT).unwrap();
        assert!(result.contains("my-title/illustrations/42/broken.png"));
        assert_eq!(resolver.stats.substituted, 1);

        let stored = resolver.local_directory(CONTEXT).join("broken.png");
        assert_eq!(fs::read(stored).unwrap(), b"stub-bytes");
    }

    #[test]
    fn test_inline_base64_filename_determinism() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.sizing_images = false;
        let mut client = StubClient::with(vec![]);
        let mut resolver = IllustrationResolver::new(&config, &mut client);

        let payload = BASE64.encode(vec![9u8; 64]);
        let html = format!("<p><img src=\"data:image/png;base64,{payload}\"></p>");

        let first = resolver.resolve_fragment(&html, CONTEXT).unwrap();
        assert_eq!(resolver.stats.downloaded, 1);

        let second = resolver.resolve_fragment(&html, CONTEXT).unwrap();
        assert_eq!(first, second);
        assert_eq!(resolver.stats.reused, 1);

        let expected: String = payload.chars().filter(|c| *c != '/' && *c != '+').take(16).collect();
        assert!(first.contains(&format!("my-title/illustrations/42/{expected}.png")));
    }

    #[test]
    fn test_malformed_data_uri_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let mut client = StubClient::with(vec![]);
        let mut resolver = IllustrationResolver::new(&config, &mut client);

        let result = resolver.resolve_fragment("<p><img src=\"data:image/png\"></p>", CONTEXT);
        assert!(matches!(result, Err(MelonError::InvalidBase64(_))));
    }

    #[test]
    fn test_invalid_payload_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let mut client = StubClient::with(vec![]);
        let mut resolver = IllustrationResolver::new(&config, &mut client);

        let result = resolver
            .resolve_fragment("<p><img src=\"data:image/png;base64,???not-base64\"></p>", CONTEXT);
        assert!(matches!(result, Err(MelonError::InvalidBase64(_))));
    }

    #[test]
    fn test_remote_filename_extraction() {
        assert_eq!(remote_filename("https://a.example/x/y/cover.jpg?v=2"), "cover.jpg");
        assert_eq!(remote_filename("https://a.example/img/%D0%BE%D0%B1%D0%BB.png"), "обл.png");
        assert_eq!(remote_filename("/relative/path/page.webp"), "page.webp");
    }
}
