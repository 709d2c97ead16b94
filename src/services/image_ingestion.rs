// src/services/image_ingestion.rs
use crate::errors::ValidationError;
use crate::models::{EncodedPayload, MediaType, SelectedFile, SourceImage};
use image::{GenericImageView, RgbaImage};
use log::{info, warn};

/// Upload limit of the paid flow (5 MiB).
pub const PAID_FLOW_MAX_BYTES: usize = 5 * 1024 * 1024;

/// An accepted image with everything derived from it.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub source: SourceImage,
    pub payload: EncodedPayload,
    /// Decoded pixels for sampling; `None` when the bytes don't decode as
    /// the declared type.
    pub raster: Option<RgbaImage>,
}

impl LoadedImage {
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.raster.as_ref().map(|raster| raster.dimensions())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImageIngestion {
    max_bytes: Option<usize>,
}

impl ImageIngestion {
    pub fn new() -> Self {
        Self { max_bytes: None }
    }

    pub fn with_size_limit(max_bytes: usize) -> Self {
        Self {
            max_bytes: Some(max_bytes),
        }
    }

    pub fn max_bytes(&self) -> Option<usize> {
        self.max_bytes
    }

    /// Checks the declared type and size without touching the bytes.
    pub fn validate(&self, file: &SelectedFile) -> Result<MediaType, ValidationError> {
        let declared = file.declared_type.as_deref().unwrap_or_default();
        let media_type = MediaType::from_mime(declared)
            .ok_or_else(|| ValidationError::UnsupportedType(declared.to_string()))?;

        if let Some(limit) = self.max_bytes {
            if file.data.len() > limit {
                return Err(ValidationError::TooLarge {
                    size: file.data.len(),
                    limit,
                });
            }
        }

        Ok(media_type)
    }

    pub fn validate_and_load(&self, file: SelectedFile) -> Result<LoadedImage, ValidationError> {
        let media_type = self.validate(&file).inspect_err(|e| {
            warn!("Rejected {}: {}", file.file_name, e);
        })?;

        let payload = EncodedPayload::encode(media_type, &file.data);
        let raster = decode_raster(&file.data, media_type);

        let source = SourceImage {
            size: file.data.len(),
            file_name: file.file_name,
            media_type,
            selected_at: chrono::Utc::now(),
        };

        info!(
            "Accepted {} ({}, {} bytes)",
            source.file_name, source.media_type, source.size
        );

        Ok(LoadedImage {
            source,
            payload,
            raster,
        })
    }
}

fn decode_raster(data: &[u8], media_type: MediaType) -> Option<RgbaImage> {
    match image::load_from_memory_with_format(data, media_type.image_format()) {
        Ok(img) => {
            let (width, height) = img.dimensions();
            info!("Decoded {}x{} {} image", width, height, media_type);
            Some(img.to_rgba8())
        }
        Err(e) => {
            warn!("Image declared as {} could not be decoded: {}", media_type, e);
            None
        }
    }
}
