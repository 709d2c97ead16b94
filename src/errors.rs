// src/errors.rs
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

/// Reasons a selected file is refused before anything else happens.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Unsupported image type: {0}. Please upload a JPEG, PNG, GIF, or WebP image")]
    UnsupportedType(String),

    #[error("Image is {size} bytes, the limit is {limit} bytes")]
    TooLarge { size: usize, limit: usize },
}

/// Failures talking to the remote inference/storage services.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("{0}")]
    Network(String),

    #[error("Request failed with status code {status}")]
    Status { status: u16 },

    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError::Network(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum HueprintError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("Upload error: {0}")]
    Multipart(String),

    #[error("Please upload an image before submitting")]
    NoImage,

    #[error("Invalid email address: {0:?}")]
    InvalidEmail(String),

    #[error("Unknown color role: {0}")]
    InvalidRole(String),

    #[error("Palette is incomplete, missing: {0}")]
    PaletteIncomplete(String),

    #[error("An upload is already in progress")]
    CheckoutBusy,

    #[error("Checkout is only available in the paid flow")]
    CheckoutDisabled,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ResponseError for HueprintError {
    fn error_response(&self) -> HttpResponse {
        match self {
            HueprintError::Validation(ValidationError::TooLarge { .. }) => {
                HttpResponse::PayloadTooLarge().json(serde_json::json!({
                    "error": "Validation error",
                    "message": self.to_string()
                }))
            }
            HueprintError::Validation(_) => HttpResponse::BadRequest().json(serde_json::json!({
                "error": "Validation error",
                "message": self.to_string()
            })),
            HueprintError::Transport(_) => HttpResponse::BadGateway().json(serde_json::json!({
                "error": "Remote service error",
                "message": self.to_string()
            })),
            HueprintError::ImageProcessing(_) | HueprintError::Multipart(_) => {
                HttpResponse::BadRequest().json(serde_json::json!({
                    "error": "Image processing error",
                    "message": self.to_string()
                }))
            }
            HueprintError::NoImage
            | HueprintError::InvalidEmail(_)
            | HueprintError::InvalidRole(_) => HttpResponse::BadRequest().json(serde_json::json!({
                "error": "Invalid request",
                "message": self.to_string()
            })),
            HueprintError::PaletteIncomplete(_)
            | HueprintError::CheckoutBusy
            | HueprintError::CheckoutDisabled => {
                HttpResponse::Conflict().json(serde_json::json!({
                    "error": "Action unavailable",
                    "message": self.to_string()
                }))
            }
            HueprintError::Config(_) => {
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "Configuration error",
                    "message": self.to_string()
                }))
            }
        }
    }
}
