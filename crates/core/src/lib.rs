pub mod config;
pub mod error;
pub mod fetch;
pub mod header;
pub mod illustration;
pub mod journal;
pub mod model;
pub mod sanitize;
pub mod words;

pub use config::ParserConfig;
pub use error::{MelonError, Result};
#[cfg(feature = "fetch")]
pub use fetch::HttpImageClient;
pub use fetch::{
    FetchConfig, FetchOutcome, ImageClient, ImageResolution, MoveOutcome, probe_resolution,
};
pub use header::{ChapterHeader, ChapterHeaderParser};
pub use illustration::{IllustrationContext, IllustrationResolver, ResolverStats, mount_path};
pub use journal::{CacheJournal, FileJournal};
pub use model::{
    AmendSummary, Branch, By, Chapter, ChapterContent, ChapterKind, ContentSource, Cover, Format,
    Person, Slide, Status, Title,
};
pub use sanitize::{ParagraphContext, ParagraphVerdict, Sanitizer, TagWhitelist};
pub use words::{WordsDictionary, check_language_code, dictionary_preset};
