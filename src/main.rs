mod clip;
mod config;
mod error;
mod fetcher;
mod handlers;
mod models;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::clip::ClipModel;
use crate::config::Config;
use crate::error::report;
use crate::fetcher::HttpFetcher;
use crate::handlers::AppState;

const DEFAULT_LOG_FILTER: &str = "info,tract_onnx=warn,tract_core=warn";

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_logging();
    config.validate()?;

    let device = config.device.resolve();
    let model = ClipModel::load(&config.model_path(), &config.tokenizer_path(), device).map_err(|e| {
        tracing::error!(error = %report(&e), "Failed to load model");
        e
    })?;
    tracing::info!(device = %model.device(), "Model ready");

    let fetcher = HttpFetcher::new(config.fetch_timeout(), config.max_image_bytes)?;
    let state = web::Data::new(AppState::new(Arc::new(fetcher), Arc::new(model)));

    tracing::info!("Server running at http://{}:{}", config.host, config.port);

    let mut server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header();

        App::new()
            .wrap(cors)
            .app_data(state.clone())
            .configure(handlers::routes)
    });
    if let Some(workers) = config.workers {
        server = server.workers(workers);
    }

    server
        .bind((config.host.as_str(), config.port))
        .with_context(|| format!("failed to bind {}:{}", config.host, config.port))?
        .run()
        .await?;
    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
