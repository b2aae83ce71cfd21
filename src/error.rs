use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use std::path::PathBuf;

use crate::models::ErrorResponse;

/// Boxed source error for failures coming from tract or tokenizers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Invalid startup configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("fetch timeout must be at least one second")]
    ZeroTimeout,

    #[error("max image size must be greater than zero")]
    ZeroImageLimit,

    #[error("worker count must be greater than zero")]
    ZeroWorkers,
}

/// Failure to load the model or its preprocessor at startup.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model file does not exist: {path}")]
    MissingFile { path: PathBuf },

    #[error("failed to load tokenizer from '{path}'")]
    Tokenizer {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("tokenizer has no padding token '{token}'")]
    MissingPadToken { token: &'static str },

    #[error("failed to tokenize prompt '{prompt}'")]
    Encode {
        prompt: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("failed to load ONNX model from '{path}'")]
    Load {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("model has an unexpected input '{name}'")]
    UnexpectedInput { name: String },

    #[error("model is missing required input '{name}'")]
    MissingInput { name: &'static str },
}

/// Failure while downloading or decoding an image.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("failed to build HTTP client")]
    Client(#[source] reqwest::Error),

    #[error("failed to download image from {url}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("image download from {url} returned HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("image at {url} exceeds the {limit} byte limit")]
    TooLarge { url: String, limit: u64 },

    #[error("failed to decode image")]
    Decode(#[source] image::ImageError),

    #[error("image decoding worker pool is unavailable")]
    WorkerUnavailable,
}

/// Failure while running the classifier on a decoded image.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("image has zero width or height")]
    EmptyImage,

    #[error("model inference failed")]
    Inference(#[source] BoxError),

    #[error("model returned {len} logits, expected 2")]
    UnexpectedOutput { len: usize },

    #[error("model returned non-finite logits")]
    NonFiniteLogits,
}

/// Errors surfaced to HTTP clients.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("No URL provided")]
    MissingUrl,

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Classify(#[from] ClassifyError),

    #[error("inference worker pool is unavailable")]
    WorkerUnavailable,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MissingUrl => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: report(self),
        })
    }
}

/// Renders an error followed by each of its sources, separated by `": "`.
pub fn report(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_url_is_a_client_error() {
        assert_eq!(ApiError::MissingUrl.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(report(&ApiError::MissingUrl), "No URL provided");
    }

    #[test]
    fn upstream_failures_are_server_errors() {
        let err = ApiError::from(FetchError::Status {
            url: "http://example.com/a.jpg".to_string(),
            status: reqwest::StatusCode::NOT_FOUND,
        });
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            report(&err),
            "image download from http://example.com/a.jpg returned HTTP 404 Not Found"
        );

        let err = ApiError::from(ClassifyError::NonFiniteLogits);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn report_walks_the_source_chain() {
        let err = ApiError::from(ClassifyError::Inference("shape mismatch".into()));
        assert_eq!(report(&err), "model inference failed: shape mismatch");
    }
}
