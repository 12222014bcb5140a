//! Image fetching collaborator.
//!
//! The normalization core never talks to the network directly: the
//! illustration resolver works against the [`ImageClient`] trait and
//! only consumes its result values. The bundled [`HttpImageClient`]
//! (behind the `fetch` feature) is a blocking reqwest implementation;
//! tests and embedders supply their own.

use std::fs;
use std::path::Path;
#[cfg(feature = "fetch")]
use std::time::Duration;

#[cfg(feature = "fetch")]
use url::Url;

#[cfg(feature = "fetch")]
use crate::error::MelonError;
use crate::error::Result;

/// Responses smaller than this are treated as download failures:
/// hotlink-protection placeholders and error pages from image CDNs
/// come back as tiny bodies with a 200 status.
pub const MIN_IMAGE_BYTES: usize = 1000;

/// HTTP client configuration for fetching images.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Request timeout in seconds.
    pub timeout: u64,
    /// Custom User-Agent string.
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: 30,
            user_agent: "Mozilla/5.0 (compatible; Melon/1.0)".to_string(),
        }
    }
}

/// Raw result of one image download.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// HTTP-style status code.
    pub status: u16,
    pub bytes: Vec<u8>,
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Success with a body large enough to plausibly be an image.
    pub fn is_usable(&self) -> bool {
        self.is_success() && self.bytes.len() >= MIN_IMAGE_BYTES
    }
}

/// Pixel dimensions of a decoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageResolution {
    pub width: u32,
    pub height: u32,
}

/// Reads pixel dimensions from encoded image bytes without a full
/// decode. Returns `None` for unrecognized or truncated data.
pub fn probe_resolution(bytes: &[u8]) -> Option<ImageResolution> {
    let reader = image::ImageReader::new(std::io::Cursor::new(bytes)).with_guessed_format().ok()?;
    let (width, height) = reader.into_dimensions().ok()?;
    Some(ImageResolution { width, height })
}

/// Result of landing a temp file in its final directory.
#[derive(Debug, Clone, Copy)]
pub struct MoveOutcome {
    /// The target path was occupied before the move; the old file was
    /// replaced.
    pub already_existed: bool,
}

/// Downloads images on behalf of the illustration resolver.
///
/// Implementations report failures through [`FetchOutcome::status`]
/// where possible; an `Err` is reserved for transport-level breakage.
pub trait ImageClient {
    fn fetch(&mut self, url: &str) -> Result<FetchOutcome>;

    /// Moves a downloaded temp file into its final directory, replacing
    /// any file already there. Falls back to copy-and-delete when the
    /// temp and target directories sit on different filesystems.
    fn move_from_temp(
        &mut self,
        temp: &Path,
        directory: &Path,
        filename: &str,
    ) -> Result<MoveOutcome> {
        let target = directory.join(filename);
        let already_existed = target.exists();

        fs::create_dir_all(directory)?;
        if fs::rename(temp, &target).is_err() {
            fs::copy(temp, &target)?;
            let _ = fs::remove_file(temp);
        }

        Ok(MoveOutcome { already_existed })
    }
}

/// Blocking HTTP implementation over reqwest.
#[cfg(feature = "fetch")]
pub struct HttpImageClient {
    client: reqwest::blocking::Client,
    config: FetchConfig,
}

#[cfg(feature = "fetch")]
impl HttpImageClient {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()?;
        Ok(Self { client, config })
    }
}

#[cfg(feature = "fetch")]
impl ImageClient for HttpImageClient {
    fn fetch(&mut self, url: &str) -> Result<FetchOutcome> {
        let parsed = Url::parse(url).map_err(|e| MelonError::InvalidUrl(e.to_string()))?;

        let response = self
            .client
            .get(parsed)
            .header("User-Agent", &self.config.user_agent)
            .header("Accept", "image/avif,image/webp,image/png,image/*;q=0.8,*/*;q=0.5")
            .send()?;

        let status = response.status().as_u16();
        let bytes = response.bytes()?.to_vec();

        Ok(FetchOutcome { status, bytes })
    }
}
