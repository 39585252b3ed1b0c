//! waste_service - HTTP waste detection service
//!
//! This daemon:
//! 1. Loads configuration (WASTE_CONFIG + WASTE_* overrides)
//! 2. Builds the category table and opens the detector backend
//! 3. Serves /health, /detect, /detect-multiple and /classes

use anyhow::Result;
use std::sync::mpsc;

use waste_sorter::api::ApiServer;
use waste_sorter::config::ServiceConfig;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServiceConfig::load()?;
    let resolver = config.build_resolver()?;
    log::info!(
        "category table loaded: {} labels, match policy {:?}",
        resolver.table().len(),
        resolver.policy()
    );

    let backend = match config.detector.build_registry() {
        Ok(registry) => registry.default_backend(),
        Err(err) => {
            log::error!("error loading detector backend: {:#}", err);
            None
        }
    };
    match &backend {
        Some(_) => log::info!("detector backend '{}' loaded", config.detector.backend),
        None => log::warn!("no detector backend loaded; detection routes will fail"),
    }

    let api_handle = ApiServer::new(config.api_config(), resolver, backend).spawn()?;
    log::info!("detection api listening on {}", api_handle.addr);
    log::info!("endpoint: http://{}/detect", api_handle.addr);
    log::info!("health check: http://{}/health", api_handle.addr);

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    log::info!("waste_service waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping API server...");
    api_handle.stop()?;

    Ok(())
}
