use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use melon_core::{
    By, CacheJournal, ChapterHeaderParser, FileJournal, ParserConfig, Title, dictionary_preset,
};
use owo_colors::OwoColorize;

/// How the identificator argument is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Selector {
    Filename,
    Slug,
    Id,
}

impl From<Selector> for By {
    fn from(selector: Selector) -> Self {
        match selector {
            Selector::Filename => By::Filename,
            Selector::Slug => By::Slug,
            Selector::Id => By::Id,
        }
    }
}

/// Inspect and maintain locally stored manga/ranobe documents
#[derive(Parser, Debug)]
#[command(name = "melon")]
#[command(about = "Inspect and maintain locally stored manga/ranobe documents", long_about = None)]
#[command(version)]
struct Args {
    /// Root directory holding titles/, images/ and temp/
    #[arg(long, value_name = "DIR", global = true)]
    dir: Option<PathBuf>,

    /// How to interpret the identificator argument
    #[arg(long, value_enum, default_value_t = Selector::Filename, global = true)]
    by: Selector,

    /// Disable the ID<->slug journal
    #[arg(long, global = true)]
    no_cache: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show a stored title: names, status, branches, chapter counts
    Info {
        /// Title filename, slug or ID
        identificator: String,
    },
    /// Re-sort every branch by (volume, number) and save
    Sort {
        /// Title filename, slug or ID
        identificator: String,
    },
    /// Pull chapter content from a second JSON document of the same title
    Merge {
        /// Title filename, slug or ID
        identificator: String,
        /// Path of the document to merge from
        source: PathBuf,
    },
    /// List the ID<->slug journal
    Journal,
    /// Parse a free-text chapter header and show the extracted fields
    ParseHeader {
        /// The raw header text
        header: String,
        /// Dictionary language code
        #[arg(long, default_value = "rus", value_name = "CODE")]
        language: String,
        /// Disable pretty-mode part extraction
        #[arg(long)]
        plain: bool,
    },
}

fn print_success(message: &str) {
    eprintln!("{} {}", "✓".green(), message.bright_green());
}

fn print_field(label: &str, value: &str) {
    println!("{} {}", format!("{label}:").dimmed(), value.bright_white());
}

fn journal_path(config: &ParserConfig) -> PathBuf {
    config
        .titles_directory
        .parent()
        .map(|root| root.join("journal.json"))
        .unwrap_or_else(|| PathBuf::from("journal.json"))
}

fn open_title(
    identificator: &str,
    by: Selector,
    config: &ParserConfig,
    journal: Option<&mut FileJournal>,
) -> anyhow::Result<Title> {
    Title::open(
        identificator,
        by.into(),
        config,
        journal.map(|journal| journal as &mut dyn CacheJournal),
    )
    .with_context(|| format!("Failed to open title \"{identificator}\""))
}

fn show_info(title: &Title) {
    if let Some(name) = &title.localized_name {
        println!("{}", name.bold().bright_blue());
    }
    if let Some(name) = &title.eng_name {
        println!("{}", name.dimmed());
    }
    println!();

    print_field("Format", title.format.as_str());
    if let Some(id) = title.id {
        print_field("ID", &id.to_string());
    }
    if let Some(slug) = &title.slug {
        print_field("Slug", slug);
    }
    if let Some(language) = &title.content_language {
        print_field("Language", language);
    }
    if let Some(status) = title.status {
        print_field("Status", &format!("{status:?}").to_lowercase());
    }
    if !title.genres.is_empty() {
        print_field("Genres", &title.genres.join(", "));
    }

    println!();
    println!("{}", "Branches:".dimmed());
    for branch in title.branches() {
        let Some(id) = branch.id else { continue };
        let empty = branch.empty_chapters_count();
        let mut line = format!("  {}: {} chapters", id, branch.chapters_count());
        if empty > 0 {
            line.push_str(&format!(" ({empty} without content)"));
        }
        println!("{line}");
    }
}

fn run_info(args: &Args, identificator: &str, config: &ParserConfig) -> anyhow::Result<()> {
    let mut journal = load_journal(args, config)?;
    let title = open_title(identificator, args.by, config, journal.as_mut())?;
    show_info(&title);
    Ok(())
}

fn run_sort(args: &Args, identificator: &str, config: &ParserConfig) -> anyhow::Result<()> {
    let mut journal = load_journal(args, config)?;
    let mut title = open_title(identificator, args.by, config, journal.as_mut())?;

    for branch in title.branches_mut() {
        branch.sort().with_context(|| {
            format!("Branch {} has non-numeric chapter numeration", branch.id.unwrap_or(-1))
        })?;
    }

    let path = title
        .save(config, journal.as_mut().map(|journal| journal as &mut dyn CacheJournal))
        .context("Failed to save title")?;
    print_success(&format!("Sorted and saved {}", path.display()));
    Ok(())
}

fn run_merge(
    args: &Args,
    identificator: &str,
    source: &PathBuf,
    config: &ParserConfig,
) -> anyhow::Result<()> {
    let mut journal = load_journal(args, config)?;
    let mut title = open_title(identificator, args.by, config, journal.as_mut())?;

    let replaced = title.merge(source).context("Merge failed")?;
    if replaced == 0 {
        eprintln!("{}", "Nothing merged.".yellow());
        return Ok(());
    }

    title
        .save(config, journal.as_mut().map(|journal| journal as &mut dyn CacheJournal))
        .context("Failed to save title")?;
    print_success(&format!("Merged content of {replaced} chapters"));
    Ok(())
}

fn run_journal(config: &ParserConfig) -> anyhow::Result<()> {
    let journal = FileJournal::open(journal_path(config)).context("Failed to open journal")?;
    if journal.is_empty() {
        eprintln!("{}", "Journal is empty.".dimmed());
        return Ok(());
    }

    for (slug, id) in journal.entries() {
        println!("{} {}", format!("{id}").bright_white(), slug);
    }
    Ok(())
}

fn run_parse_header(header: &str, language: &str, plain: bool) -> anyhow::Result<()> {
    let dictionary = dictionary_preset(language)?
        .with_context(|| format!("No dictionary bundled for language \"{language}\""))?;

    let parsed = ChapterHeaderParser::new(header, dictionary).parse(!plain);

    let or_dash = |value: Option<&str>| value.unwrap_or("-").to_string();
    print_field("Volume", &or_dash(parsed.volume.as_deref()));
    print_field("Number", &or_dash(parsed.number.as_deref()));
    print_field(
        "Type",
        &parsed.kind.map(|kind| format!("{kind:?}").to_lowercase()).unwrap_or_else(|| "-".into()),
    );
    print_field("Name", &or_dash(parsed.name.as_deref()));
    Ok(())
}

fn load_journal(args: &Args, config: &ParserConfig) -> anyhow::Result<Option<FileJournal>> {
    if args.no_cache {
        return Ok(None);
    }
    Ok(Some(FileJournal::open(journal_path(config)).context("Failed to open journal")?))
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(if args.verbose { log::LevelFilter::Debug } else { log::LevelFilter::Warn })
        .init();

    let mut config = ParserConfig::default();
    if let Some(dir) = &args.dir {
        config = config.with_output_root(dir.clone());
    }
    config.caching = !args.no_cache;

    match &args.command {
        Command::Info { identificator } => run_info(&args, identificator, &config),
        Command::Sort { identificator } => run_sort(&args, identificator, &config),
        Command::Merge { identificator, source } => run_merge(&args, identificator, source, &config),
        Command::Journal => run_journal(&config),
        Command::ParseHeader { header, language, plain } => {
            run_parse_header(header, language, *plain)
        }
    }
}
