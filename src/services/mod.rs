// src/services/mod.rs
pub mod analysis_client;
pub mod color_sampler;
pub mod image_ingestion;
pub mod upload_handoff;

pub use analysis_client::{AnalysisClient, HttpInferenceService, InferenceService};
pub use color_sampler::ColorSampler;
pub use image_ingestion::{ImageIngestion, LoadedImage};
pub use upload_handoff::{HttpStorageService, PaymentPage, StorageService, UploadAndHandoff};
