//! Parser configuration.
//!
//! All behavioral flags that used to be ambient in earlier designs
//! (force overwrite, pretty normalization, journal caching) live in one
//! explicit [`ParserConfig`] value, constructed once per run and passed
//! by reference into the components that need it.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a scraping/normalization run.
///
/// # Example
///
/// ```rust
/// use melon_core::ParserConfig;
///
/// let config = ParserConfig::default().with_pretty(true).with_force(false);
/// assert!(config.pretty);
/// ```
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Enable aggressive HTML normalization and structural-metadata
    /// inference from chapter headers.
    pub pretty: bool,
    /// Re-fetch and overwrite images that already exist locally.
    pub force: bool,
    /// Maintain the ID<->slug journal and consult it during `open`.
    pub caching: bool,
    /// Probe and record image pixel dimensions.
    pub sizing_images: bool,
    /// Name local title files by numeric ID instead of slug.
    pub use_id_as_filename: bool,
    /// Courtesy delay applied between successive downloads.
    pub delay: Duration,
    /// Directory holding canonical title JSON documents.
    pub titles_directory: PathBuf,
    /// Root directory for resolved illustrations and covers.
    pub images_directory: PathBuf,
    /// Temp directory used by the image client before files are moved
    /// into place.
    pub temp_directory: PathBuf,
    /// Stub image substituted for failed downloads, when set.
    pub bad_image_stub: Option<PathBuf>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        let output = dirs::home_dir()
            .map(|home| home.join(".local").join("share").join("melon"))
            .unwrap_or_else(|| PathBuf::from("Output"));

        Self {
            pretty: false,
            force: false,
            caching: true,
            sizing_images: true,
            use_id_as_filename: false,
            delay: Duration::from_millis(300),
            titles_directory: output.join("titles"),
            images_directory: output.join("images"),
            temp_directory: output.join("temp"),
            bad_image_stub: None,
        }
    }
}

impl ParserConfig {
    /// Set pretty mode.
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// Set force-overwrite mode.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Enable or disable journal caching.
    pub fn with_caching(mut self, caching: bool) -> Self {
        self.caching = caching;
        self
    }

    /// Set the inter-download courtesy delay.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Point all output directories below one root.
    pub fn with_output_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        let root = root.into();
        self.titles_directory = root.join("titles");
        self.images_directory = root.join("images");
        self.temp_directory = root.join("temp");
        self
    }

    /// Path of the title JSON document for a given used filename.
    pub fn title_path(&self, used_filename: &str) -> PathBuf {
        self.titles_directory.join(format!("{used_filename}.json"))
    }
}
