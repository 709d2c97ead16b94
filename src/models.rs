// src/models.rs
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Image types the file input accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaType {
    #[serde(rename = "image/jpeg")]
    Jpeg,
    #[serde(rename = "image/png")]
    Png,
    #[serde(rename = "image/gif")]
    Gif,
    #[serde(rename = "image/webp")]
    Webp,
}

impl MediaType {
    pub const ALL: [MediaType; 4] = [
        MediaType::Jpeg,
        MediaType::Png,
        MediaType::Gif,
        MediaType::Webp,
    ];

    /// Matches a declared content type against the allow-list. Parameters
    /// (`; charset=...`) are ignored and the comparison is case-insensitive.
    pub fn from_mime(declared: &str) -> Option<Self> {
        let essence = declared.split(';').next().unwrap_or_default().trim();
        Self::ALL
            .into_iter()
            .find(|media| media.as_mime().eq_ignore_ascii_case(essence))
    }

    pub fn as_mime(self) -> &'static str {
        match self {
            MediaType::Jpeg => "image/jpeg",
            MediaType::Png => "image/png",
            MediaType::Gif => "image/gif",
            MediaType::Webp => "image/webp",
        }
    }

    pub fn image_format(self) -> image::ImageFormat {
        match self {
            MediaType::Jpeg => image::ImageFormat::Jpeg,
            MediaType::Png => image::ImageFormat::Png,
            MediaType::Gif => image::ImageFormat::Gif,
            MediaType::Webp => image::ImageFormat::WebP,
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_mime())
    }
}

/// A file as handed over by the file input, before validation.
#[derive(Debug, Clone)]
pub struct SelectedFile {
    pub file_name: String,
    pub declared_type: Option<String>,
    pub data: Bytes,
}

#[derive(Debug, Clone)]
pub struct SourceImage {
    pub file_name: String,
    pub media_type: MediaType,
    pub size: usize,
    pub selected_at: DateTime<Utc>,
}

/// Base64 form of a [`SourceImage`], held as a data URL.
///
/// Remote services receive only [`EncodedPayload::body`]; the full
/// [`EncodedPayload::data_url`] is what the preview renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload {
    media_type: MediaType,
    data_url: String,
    body_start: usize,
}

impl EncodedPayload {
    pub fn encode(media_type: MediaType, data: &[u8]) -> Self {
        let mut data_url = format!("data:{};base64,", media_type.as_mime());
        let body_start = data_url.len();
        general_purpose::STANDARD.encode_string(data, &mut data_url);

        Self {
            media_type,
            data_url,
            body_start,
        }
    }

    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    pub fn body(&self) -> &str {
        &self.data_url[self.body_start..]
    }

    pub fn data_url(&self) -> &str {
        &self.data_url
    }

    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        general_purpose::STANDARD.decode(self.body())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorRole {
    Skin,
    Hair,
    Eye,
}

impl ColorRole {
    pub const ALL: [ColorRole; 3] = [ColorRole::Skin, ColorRole::Hair, ColorRole::Eye];

    pub fn as_str(self) -> &'static str {
        match self {
            ColorRole::Skin => "skin",
            ColorRole::Hair => "hair",
            ColorRole::Eye => "eye",
        }
    }
}

impl fmt::Display for ColorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColorRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ColorRole::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorSample {
    pub role: ColorRole,
    pub hex: String,
}

/// The three sampled colors, available once every role has been picked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Palette {
    pub skin: String,
    pub hair: String,
    pub eye: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum AnalysisState {
    #[default]
    Idle,
    Submitting,
    Succeeded(String),
    Failed(String),
}

/// Analysis state tagged with the submission it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct AnalysisSnapshot {
    pub sequence: u64,
    pub state: AnalysisState,
}

impl AnalysisSnapshot {
    pub fn busy(&self) -> bool {
        self.state == AnalysisState::Submitting
    }

    /// The view scrolls the result into sight once it arrives.
    pub fn reveal_result(&self) -> bool {
        matches!(self.state, AnalysisState::Succeeded(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HandoffState {
    Idle { last_error: Option<String> },
    Uploading,
    Redirected { location: String },
}

impl Default for HandoffState {
    fn default() -> Self {
        HandoffState::Idle { last_error: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flow {
    /// Analysis runs as soon as an image is accepted.
    Instant,
    /// Image is uploaded on submit and the user is sent to the payment page.
    Paid,
}

impl FromStr for Flow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "instant" => Ok(Flow::Instant),
            "paid" => Ok(Flow::Paid),
            other => Err(format!("unknown flow {other:?}, expected \"instant\" or \"paid\"")),
        }
    }
}

/// A click on the displayed image, relative to its bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PickRequest {
    pub x: f64,
    pub y: f64,
    pub rendered_width: Option<f64>,
    pub rendered_height: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailUpdate {
    pub email: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageView {
    pub file_name: String,
    pub media_type: MediaType,
    pub size: usize,
    pub dimensions: Option<(u32, u32)>,
    pub preview: String,
    pub selected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SamplerView {
    pub armed: Option<ColorRole>,
    pub samples: Vec<ColorSample>,
    pub palette_ready: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisView {
    #[serde(flatten)]
    pub snapshot: AnalysisSnapshot,
    pub busy: bool,
    pub reveal_result: bool,
}

impl From<AnalysisSnapshot> for AnalysisView {
    fn from(snapshot: AnalysisSnapshot) -> Self {
        Self {
            busy: snapshot.busy(),
            reveal_result: snapshot.reveal_result(),
            snapshot,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutView {
    pub state: HandoffState,
    pub email: String,
    pub available: bool,
}

/// Everything the presentation layer needs to render the page.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub flow: Flow,
    pub image: Option<ImageView>,
    pub sampler: SamplerView,
    pub analysis: AnalysisView,
    pub checkout: CheckoutView,
}
