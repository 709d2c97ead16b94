// src/handlers.rs
use crate::{
    AppState,
    errors::{HueprintError, ValidationError},
    models::*,
};
use actix_multipart::Multipart;
use actix_web::{Error, HttpResponse, http::header, web};
use bytes::BytesMut;
use futures_util::TryStreamExt;
use log::{info, warn};
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_WAIT_MS: u64 = 25_000;
const MAX_WAIT_MS: u64 = 60_000;

/// Reads the first file field, giving up as soon as it grows past `max_bytes`.
async fn read_selected_file(
    payload: &mut Multipart,
    max_bytes: Option<usize>,
) -> Result<SelectedFile, Error> {
    while let Some(mut field) = payload.try_next().await? {
        let Some(filename) = field
            .content_disposition()
            .get_filename()
            .map(|name| name.to_string())
        else {
            continue;
        };

        let declared_type = field.content_type().map(|ct| ct.to_string());

        let mut data = BytesMut::new();
        while let Some(chunk) = field.try_next().await? {
            let size = data.len() + chunk.len();
            if let Some(limit) = max_bytes.filter(|&limit| size > limit) {
                warn!("Rejected {}: upload exceeded {} bytes", filename, limit);
                return Err(HueprintError::from(ValidationError::TooLarge { size, limit }).into());
            }
            data.extend_from_slice(&chunk);
        }

        return Ok(SelectedFile {
            file_name: filename,
            declared_type,
            data: data.freeze(),
        });
    }

    Err(HueprintError::Multipart("No file in upload".to_string()).into())
}

pub async fn upload_image(
    mut payload: Multipart,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let ingestion = data.session.lock().await.ingestion();
    let file = read_selected_file(&mut payload, ingestion.max_bytes()).await?;

    let loaded = web::block(move || ingestion.validate_and_load(file))
        .await
        .map_err(|e| HueprintError::ImageProcessing(e.to_string()))?
        .map_err(HueprintError::from)?;

    let mut session = data.session.lock().await;
    let encoded = session.accept(loaded);

    if session.flow() == Flow::Instant {
        let sequence = data.analysis.submit_in_background(encoded);
        info!("Started analysis submission {}", sequence);
    }

    Ok(HttpResponse::Ok().json(session.view(data.analysis.snapshot(), &data.handoff)))
}

pub async fn get_state(data: web::Data<AppState>) -> Result<HttpResponse, Error> {
    let session = data.session.lock().await;
    Ok(HttpResponse::Ok().json(session.view(data.analysis.snapshot(), &data.handoff)))
}

pub async fn get_analysis(data: web::Data<AppState>) -> Result<HttpResponse, Error> {
    Ok(HttpResponse::Ok().json(AnalysisView::from(data.analysis.snapshot())))
}

#[derive(Debug, Deserialize)]
pub struct WaitQuery {
    timeout_ms: Option<u64>,
}

/// Long-poll: answers once the analysis is no longer submitting.
pub async fn wait_analysis(
    data: web::Data<AppState>,
    query: web::Query<WaitQuery>,
) -> Result<HttpResponse, Error> {
    let timeout_ms = query.timeout_ms.unwrap_or(DEFAULT_WAIT_MS).min(MAX_WAIT_MS);
    let snapshot = data
        .analysis
        .wait_settled(Duration::from_millis(timeout_ms))
        .await;

    Ok(HttpResponse::Ok().json(AnalysisView::from(snapshot)))
}

pub async fn select_role(
    path: web::Path<String>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let role: ColorRole = path
        .into_inner()
        .parse()
        .map_err(HueprintError::InvalidRole)?;

    let mut session = data.session.lock().await;
    session.select_role(role);

    Ok(HttpResponse::Ok().json(session.view(data.analysis.snapshot(), &data.handoff)))
}

pub async fn pick_color(
    body: web::Json<PickRequest>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let mut session = data.session.lock().await;
    if let Some(sample) = session.pick(&body) {
        info!("Picked {} for {}", sample.hex, sample.role);
    }

    Ok(HttpResponse::Ok().json(session.view(data.analysis.snapshot(), &data.handoff)))
}

pub async fn get_palette(data: web::Data<AppState>) -> Result<HttpResponse, Error> {
    let palette = data.session.lock().await.palette()?;

    info!("Skin color: {}", palette.skin);
    info!("Hair color: {}", palette.hair);
    info!("Eye color: {}", palette.eye);

    Ok(HttpResponse::Ok().json(&palette))
}

pub async fn update_email(
    body: web::Json<EmailUpdate>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let mut session = data.session.lock().await;
    session.set_email(body.into_inner().email);

    Ok(HttpResponse::Ok().json(session.view(data.analysis.snapshot(), &data.handoff)))
}

/// Paid flow submit: upload, then redirect the browser to the payment page.
pub async fn checkout(data: web::Data<AppState>) -> Result<HttpResponse, Error> {
    let (flow, email, encoded) = {
        let session = data.session.lock().await;
        (
            session.flow(),
            session.email().to_string(),
            session.payload().cloned(),
        )
    };

    if flow != Flow::Paid {
        return Err(HueprintError::CheckoutDisabled.into());
    }

    let location = data.handoff.checkout(&email, encoded.as_ref()).await?;
    info!("Redirecting to payment page");

    Ok(HttpResponse::SeeOther()
        .insert_header((header::LOCATION, location.as_str()))
        .finish())
}

pub async fn get_theme(data: web::Data<AppState>) -> Result<HttpResponse, Error> {
    Ok(HttpResponse::Ok().json(data.theme.as_ref()))
}
