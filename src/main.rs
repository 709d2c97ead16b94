// src/main.rs
use actix_files::Files;
use actix_web::{App, HttpResponse, HttpServer, middleware, web};
use anyhow::Context;
use log::info;
use std::sync::Arc;
use tokio::sync::Mutex;

mod config;
mod errors;
mod handlers;
mod models;
mod services;
mod session;
#[cfg(test)]
mod test_support;

use crate::config::{AppConfig, Theme};
use crate::errors::HueprintError;
use crate::handlers::{
    checkout, get_analysis, get_palette, get_state, get_theme, pick_color, select_role,
    update_email, upload_image, wait_analysis,
};
use crate::services::{
    AnalysisClient, HttpInferenceService, HttpStorageService, ImageIngestion, InferenceService,
    PaymentPage, StorageService, UploadAndHandoff,
};
use crate::session::Session;

#[derive(Clone)]
pub struct AppState {
    session: Arc<Mutex<Session>>,
    analysis: Arc<AnalysisClient>,
    handoff: Arc<UploadAndHandoff>,
    theme: Arc<Theme>,
}

impl AppState {
    pub fn new(
        config: &AppConfig,
        inference: Arc<dyn InferenceService>,
        storage: Arc<dyn StorageService>,
    ) -> Result<Self, HueprintError> {
        let ingestion = match config.upload_limit() {
            Some(limit) => ImageIngestion::with_size_limit(limit),
            None => ImageIngestion::new(),
        };

        Ok(Self {
            session: Arc::new(Mutex::new(Session::new(config.flow, ingestion))),
            analysis: Arc::new(AnalysisClient::new(inference)),
            handoff: Arc::new(UploadAndHandoff::new(
                storage,
                PaymentPage::parse(&config.payment_url)?,
            )),
            theme: Arc::new(config.theme.clone()),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, HueprintError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| HueprintError::Config(format!("HTTP client: {e}")))?;

        Self::new(
            config,
            Arc::new(HttpInferenceService::new(&config.api_base_url, client.clone())),
            Arc::new(HttpStorageService::new(&config.api_base_url, client)),
        )
    }
}

pub fn configure_api(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/image", web::post().to(upload_image))
            .route("/state", web::get().to(get_state))
            .route("/analysis", web::get().to(get_analysis))
            .route("/analysis/wait", web::get().to(wait_analysis))
            .route("/sampler/role/{role}", web::post().to(select_role))
            .route("/sampler/pick", web::post().to(pick_color))
            .route("/palette", web::get().to(get_palette))
            .route("/email", web::put().to(update_email))
            .route("/checkout", web::post().to(checkout))
            .route("/theme", web::get().to(get_theme)),
    )
    .route("/health", web::get().to(health_check));
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = AppConfig::from_env().context("loading configuration")?;
    info!("Starting hueprint in {:?} flow...", config.flow);

    let app_state = AppState::from_config(&config).context("initialising services")?;
    let static_dir = config.static_dir.clone();

    info!("Starting HTTP server on {}", config.bind_addr);

    HttpServer::new(move || {
        let mut app = App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(middleware::Logger::default())
            .configure(configure_api);

        if let Some(dir) = &static_dir {
            app = app.service(Files::new("/", dir).index_file("index.html"));
        }
        app
    })
    .bind(&config.bind_addr)?
    .run()
    .await?;

    Ok(())
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "hueprint",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
