//! Downloads images over HTTP and decodes them to RGB.

use actix_web::web;
use async_trait::async_trait;
use futures_util::StreamExt;
use image::RgbImage;
use reqwest::Client;
use std::time::Duration;

use crate::error::FetchError;

#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<RgbImage, FetchError>;
}

/// Single-attempt HTTP fetcher with a total timeout and a body size cap.
pub struct HttpFetcher {
    client: Client,
    max_bytes: u64,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, max_bytes: u64) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self { client, max_bytes })
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        let too_large = || FetchError::TooLarge {
            url: url.to_string(),
            limit: self.max_bytes,
        };

        let expected = response.content_length().unwrap_or(0);
        if expected > self.max_bytes {
            return Err(too_large());
        }

        let mut body = Vec::with_capacity(expected as usize);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;
            if (body.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }

        tracing::debug!(url, bytes = body.len(), "Image downloaded");
        Ok(body)
    }
}

#[async_trait]
impl ImageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<RgbImage, FetchError> {
        let body = self.download(url).await?;
        web::block(move || decode_rgb(&body))
            .await
            .map_err(|_| FetchError::WorkerUnavailable)?
    }
}

/// Decodes any supported image format and converts it to 8-bit RGB.
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage, FetchError> {
    let image = image::load_from_memory(bytes).map_err(FetchError::Decode)?;
    Ok(image.to_rgb8())
}
