// src/session.rs
use crate::errors::HueprintError;
use crate::models::{
    AnalysisSnapshot, CheckoutView, ColorRole, ColorSample, EncodedPayload, Flow, ImageView,
    Palette, PickRequest, SamplerView, SessionView,
};
use crate::services::{ColorSampler, ImageIngestion, LoadedImage, UploadAndHandoff};

/// State of the one page the user is looking at: the accepted image, the
/// sampled colors and the email typed for the paid flow.
///
/// Analysis and checkout state live in their own clients; [`Session::view`]
/// stitches everything together for rendering.
pub struct Session {
    flow: Flow,
    ingestion: ImageIngestion,
    image: Option<LoadedImage>,
    sampler: ColorSampler,
    email: String,
}

impl Session {
    pub fn new(flow: Flow, ingestion: ImageIngestion) -> Self {
        Self {
            flow,
            ingestion,
            image: None,
            sampler: ColorSampler::new(),
            email: String::new(),
        }
    }

    pub fn flow(&self) -> Flow {
        self.flow
    }

    pub fn ingestion(&self) -> ImageIngestion {
        self.ingestion
    }

    /// Replaces the current image. Only called with images that passed
    /// validation, so a rejected file never disturbs what is shown.
    pub fn accept(&mut self, image: LoadedImage) -> EncodedPayload {
        let payload = image.payload.clone();
        self.image = Some(image);
        payload
    }

    pub fn payload(&self) -> Option<&EncodedPayload> {
        self.image.as_ref().map(|image| &image.payload)
    }

    pub fn select_role(&mut self, role: ColorRole) {
        self.sampler.select_role(role);
    }

    pub fn pick(&mut self, pick: &PickRequest) -> Option<ColorSample> {
        let raster = self.image.as_ref().and_then(|image| image.raster.as_ref());
        self.sampler.sample_at(raster, pick)
    }

    pub fn palette(&self) -> Result<Palette, HueprintError> {
        self.sampler.palette().ok_or_else(|| {
            let missing: Vec<&str> = self
                .sampler
                .missing_roles()
                .into_iter()
                .map(ColorRole::as_str)
                .collect();
            HueprintError::PaletteIncomplete(missing.join(", "))
        })
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn set_email(&mut self, email: String) {
        self.email = email;
    }

    pub fn view(&self, analysis: AnalysisSnapshot, handoff: &UploadAndHandoff) -> SessionView {
        let image = self.image.as_ref().map(|image| ImageView {
            file_name: image.source.file_name.clone(),
            media_type: image.source.media_type,
            size: image.source.size,
            dimensions: image.dimensions(),
            preview: image.payload.data_url().to_string(),
            selected_at: image.source.selected_at,
        });

        SessionView {
            flow: self.flow,
            image,
            sampler: SamplerView {
                armed: self.sampler.armed(),
                samples: self.sampler.samples(),
                palette_ready: self.sampler.palette_ready(),
            },
            analysis: analysis.into(),
            checkout: CheckoutView {
                state: handoff.state(),
                email: self.email.clone(),
                available: self.flow == Flow::Paid
                    && handoff.available(&self.email, self.image.is_some()),
            },
        }
    }
}
