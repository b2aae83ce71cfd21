use actix_web::{web, HttpResponse, Result};
use futures_util::StreamExt;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

use crate::clip::ImageClassifier;
use crate::error::{report, ApiError};
use crate::fetcher::ImageFetcher;
use crate::models::{Classification, ClassifyRequest, HealthResponse, Label};

/// Largest request body read; anything bigger counts as a missing URL.
const MAX_REQUEST_BYTES: usize = 64 * 1024;

/// Dependencies shared by every worker.
pub struct AppState {
    fetcher: Arc<dyn ImageFetcher>,
    classifier: Arc<dyn ImageClassifier>,
}

impl AppState {
    pub fn new(fetcher: Arc<dyn ImageFetcher>, classifier: Arc<dyn ImageClassifier>) -> Self {
        Self { fetcher, classifier }
    }
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/classify").route(web::post().to(classify)))
        .service(web::resource("/healthcheck").route(web::get().to(healthcheck)));
}

pub async fn classify(state: web::Data<AppState>, mut payload: web::Payload) -> Result<HttpResponse, ApiError> {
    let request_id = Uuid::new_v4();

    let body = read_body(&mut payload).await;
    let Some(image_url) = body.as_deref().and_then(requested_url) else {
        tracing::error!(%request_id, "No image URL provided in request");
        return Err(ApiError::MissingUrl);
    };

    let span = tracing::info_span!("classify", %request_id, %image_url);
    match run(&state, &image_url).instrument(span.clone()).await {
        Ok(classification) => {
            span.in_scope(|| {
                tracing::info!(
                    label = ?classification.label,
                    confidence = classification.confidence,
                    "Image {} {} with confidence: {}",
                    image_url,
                    match classification.label {
                        Label::Bird => "contains a bird",
                        Label::NotBird => "does not contain a bird",
                    },
                    classification.confidence
                )
            });
            Ok(HttpResponse::Ok().json(classification))
        }
        Err(err) => {
            span.in_scope(|| tracing::error!(error = %report(&err), "Error during classification"));
            Err(err)
        }
    }
}

pub async fn healthcheck() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse { status: "ok" })
}

async fn run(state: &AppState, image_url: &str) -> Result<Classification, ApiError> {
    let image = state.fetcher.fetch(image_url).await?;

    let classifier = Arc::clone(&state.classifier);
    let classification = web::block(move || classifier.classify(&image))
        .await
        .map_err(|_| ApiError::WorkerUnavailable)??;
    Ok(classification)
}

async fn read_body(payload: &mut web::Payload) -> Option<web::BytesMut> {
    let mut body = web::BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk.ok()?;
        if body.len() + chunk.len() > MAX_REQUEST_BYTES {
            return None;
        }
        body.extend_from_slice(&chunk);
    }
    Some(body)
}

/// Pulls a usable `image_url` out of the body. Anything that is not a JSON
/// object with a non-blank string URL counts as missing.
fn requested_url(body: &[u8]) -> Option<String> {
    let request: ClassifyRequest = serde_json::from_slice(body).ok()?;
    request.image_url.filter(|url| !url.trim().is_empty())
}
