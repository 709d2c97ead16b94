// src/config.rs
use crate::errors::HueprintError;
use crate::models::Flow;
use crate::services::image_ingestion::PAID_FLOW_MAX_BYTES;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str =
    "https://fnna5xesrb.execute-api.ap-northeast-1.amazonaws.com/prod";
pub const DEFAULT_PAYMENT_URL: &str = "https://buy.stripe.com/test_14k3dZ1B5drT5563cd";

/// Presentation settings handed to the front end as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Theme {
    pub heading_font: String,
    pub accent_from: String,
    pub accent_to: String,
    pub background: String,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            heading_font: "Taviraj, serif".to_string(),
            accent_from: "#FF6B8B".to_string(),
            accent_to: "#FF8E53".to_string(),
            background: "#f5f5f5".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub api_base_url: String,
    pub payment_url: String,
    pub flow: Flow,
    pub max_upload_bytes: usize,
    pub request_timeout: Duration,
    pub static_dir: Option<PathBuf>,
    pub theme: Theme,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            payment_url: DEFAULT_PAYMENT_URL.to_string(),
            flow: Flow::Instant,
            max_upload_bytes: PAID_FLOW_MAX_BYTES,
            request_timeout: Duration::from_secs(30),
            static_dir: None,
            theme: Theme::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, HueprintError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup, falling back to defaults for
    /// keys that are absent.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, HueprintError> {
        let mut config = Self::default();

        if let Some(addr) = lookup("BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(url) = lookup("API_BASE_URL") {
            config.api_base_url = url;
        }
        if let Some(url) = lookup("PAYMENT_URL") {
            config.payment_url = url;
        }
        if let Some(flow) = lookup("HUEPRINT_FLOW") {
            config.flow = flow.parse().map_err(HueprintError::Config)?;
        }
        if let Some(bytes) = lookup("MAX_UPLOAD_BYTES") {
            config.max_upload_bytes = parse_number("MAX_UPLOAD_BYTES", &bytes)?;
        }
        if let Some(secs) = lookup("REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(parse_number("REQUEST_TIMEOUT_SECS", &secs)?);
        }
        config.static_dir = lookup("STATIC_DIR").map(PathBuf::from);
        if let Some(font) = lookup("THEME_HEADING_FONT") {
            config.theme.heading_font = font;
        }

        Ok(config)
    }

    /// Size limit applied to selected files; only the paid flow has one.
    pub fn upload_limit(&self) -> Option<usize> {
        match self.flow {
            Flow::Paid => Some(self.max_upload_bytes),
            Flow::Instant => None,
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, HueprintError> {
    value
        .trim()
        .parse()
        .map_err(|_| HueprintError::Config(format!("{key} must be a number, got {value:?}")))
}
