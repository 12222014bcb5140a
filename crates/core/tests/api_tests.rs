//! Library API integration tests
use std::time::Duration;

use melon_core::*;

fn test_config(root: &std::path::Path) -> ParserConfig {
    ParserConfig::default().with_output_root(root).with_delay(Duration::ZERO)
}

fn sample_title() -> Title {
    let mut title = Title::new(Format::Ranobe);
    title.id = Some(301);
    title.slug = Some("test-novel".to_string());
    title.set_content_language("rus").unwrap();
    title.localized_name = Some("Тестовый роман".to_string());
    title.status = Some(Status::Ongoing);

    let mut branch = Branch::new(1);
    for (id, number, name) in [(10, "1", "Первая"), (11, "2", "Вторая")] {
        let mut chapter = Chapter::new_text(id);
        chapter.set_volume("1");
        chapter.set_number(number);
        chapter.set_name(name, true, None);
        chapter.kind = Some(ChapterKind::Chapter);
        branch.add_chapter(chapter).unwrap();
    }
    title.add_branch(branch).unwrap();
    title
}

#[test]
fn test_save_and_open_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let title = sample_title();
    let path = title.save(&config, None).unwrap();
    assert!(path.exists());

    let reloaded = Title::open("test-novel", By::Filename, &config, None).unwrap();
    assert_eq!(reloaded, title);
}

#[test]
fn test_open_resolves_slug_and_id_via_scan() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    // Saved under the slug, opened by numeric ID through the scan.
    sample_title().save(&config, None).unwrap();

    let by_id = Title::open("301", By::Id, &config, None).unwrap();
    assert_eq!(by_id.slug.as_deref(), Some("test-novel"));

    let by_slug = Title::open("test-novel", By::Slug, &config, None).unwrap();
    assert_eq!(by_slug.id, Some(301));

    assert!(matches!(
        Title::open("404", By::Id, &config, None),
        Err(MelonError::TitleFileNotFound(_))
    ));
}

#[test]
fn test_open_prefers_journal_over_scan() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.use_id_as_filename = true;

    let mut journal = FileJournal::open(dir.path().join("journal.json")).unwrap();

    // Saved as 301.json; the journal records the pairing.
    sample_title().save(&config, Some(&mut journal)).unwrap();

    let title =
        Title::open("test-novel", By::Slug, &config, Some(&mut journal)).unwrap();
    assert_eq!(title.id, Some(301));
}

#[test]
fn test_save_recomputes_branch_summaries() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let mut title = sample_title();
    let mut small = Branch::new(2);
    small.add_chapter(Chapter::new_text(20)).unwrap();
    title.add_branch(small).unwrap();
    let path = title.save(&config, None).unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    let summaries = raw["branches"].as_array().unwrap();
    assert_eq!(summaries.len(), 2);
    // Descending by chapter count.
    assert_eq!(summaries[0]["id"], 1);
    assert_eq!(summaries[0]["chapters_count"], 2);
    assert_eq!(summaries[1]["id"], 2);
}

#[test]
fn test_merge_replaces_only_non_empty_matches() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let mut external = sample_title();
    external
        .get_branch(1)
        .unwrap()
        .get_chapter_mut(10)
        .unwrap()
        .push_paragraph("<p>Внешний текст</p>".to_string())
        .unwrap();
    let external_path = external.save(&config, None).unwrap();

    let mut local = sample_title();
    local
        .get_branch(1)
        .unwrap()
        .get_chapter_mut(11)
        .unwrap()
        .push_paragraph("<p>Локальный текст</p>".to_string())
        .unwrap();

    // Chapter 10: external non-empty, replaced. Chapter 11: external
    // empty, local content untouched.
    let replaced = local.merge(&external_path).unwrap();
    assert_eq!(replaced, 1);
    assert_eq!(local.find_chapter(10).unwrap().paragraphs(), ["<p>Внешний текст</p>"]);
    assert_eq!(local.find_chapter(11).unwrap().paragraphs(), ["<p>Локальный текст</p>"]);
}

#[test]
fn test_merge_rejects_mismatched_format() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let mut manga = Title::new(Format::Manga);
    manga.slug = Some("same-slug".to_string());
    let mut branch = Branch::new(1);
    let mut chapter = Chapter::new_slides(10);
    chapter.push_slide("p/1.png".to_string(), None, None).unwrap();
    branch.add_chapter(chapter).unwrap();
    manga.add_branch(branch).unwrap();
    let manga_path = manga.save(&config, None).unwrap();

    let mut local = sample_title();
    let replaced = local.merge(&manga_path).unwrap();
    assert_eq!(replaced, 0);
    assert!(!local.find_chapter(10).unwrap().has_content());
}

#[test]
fn test_merge_source_chapter_without_id() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let external_path = dir.path().join("broken.json");
    std::fs::write(
        &external_path,
        serde_json::json!({
            "format": "melon-ranobe",
            "slug": "test-novel",
            "content": {"1": [{"id": null, "paragraphs": ["<p>x</p>"]}]}
        })
        .to_string(),
    )
    .unwrap();

    let mut local = sample_title();
    assert!(matches!(local.merge(&external_path), Err(MelonError::Merging(_))));
}

#[test]
fn test_full_paragraph_pipeline() {
    struct NoFetch;
    impl ImageClient for NoFetch {
        fn fetch(&mut self, _url: &str) -> Result<FetchOutcome> {
            Ok(FetchOutcome { status: 200, bytes: vec![1; 2000] })
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let dictionary = dictionary_preset("rus").unwrap().unwrap();
    let sanitizer = Sanitizer::new(TagWhitelist::ranobe(), dictionary, true);
    let mut client = NoFetch;
    let mut resolver = IllustrationResolver::new(&config, &mut client);

    let mut chapter = Chapter::new_text(10);
    chapter.set_number("1");

    // Repeated heading: discarded, and the missing name is backfilled.
    let stored = chapter
        .add_paragraph(
            "<p>Глава 1. Первая</p>",
            "test-novel",
            Some("Тестовый роман"),
            &sanitizer,
            &mut resolver,
        )
        .unwrap();
    assert!(!stored);
    assert_eq!(chapter.name.as_deref(), Some("Первая"));

    // Regular prose: kept.
    let stored = chapter
        .add_paragraph("Просто <em>текст</em>.", "test-novel", None, &sanitizer, &mut resolver)
        .unwrap();
    assert!(stored);
    assert_eq!(chapter.paragraphs(), ["<p>Просто <i>текст</i>.</p>"]);

    // Image: downloaded and remounted.
    let stored = chapter
        .add_paragraph(
            "<p><img src=\"https://example.org/art/page.png\"></p>",
            "test-novel",
            None,
            &sanitizer,
            &mut resolver,
        )
        .unwrap();
    assert!(stored);
    assert!(chapter.paragraphs()[1].contains("test-novel/illustrations/10/page.png"));
}

#[test]
fn test_mount_path_independent_of_fetch_order() {
    let a = mount_path("test-novel", 10, "page.png");
    let b = mount_path("test-novel", 10, "page.png");
    assert_eq!(a, b);
}
