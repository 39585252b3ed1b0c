//! HTTP detection service.
//!
//! Serves `/health`, `/detect`, `/detect-multiple` and `/classes`. A
//! background thread accepts connections and hands each one to its own
//! thread, so a slow peer never stalls other requests. Uploaded images go
//! through the detector backend and the resulting labels through the
//! category resolver.

mod http;
mod routes;

use anyhow::{anyhow, Result};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::category::CategoryResolver;
use crate::detect::SharedBackend;

pub use http::{multipart_field, HttpRequest, HttpResponse};
pub use routes::{route, title_case, ServiceState};

pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Connections served concurrently; further peers get 503.
const MAX_CONNECTIONS: usize = 64;
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
    pub max_body_bytes: usize,
    /// Minimum confidence for `/detect`.
    pub detect_confidence: f32,
    /// Minimum confidence for `/detect-multiple`.
    pub multi_confidence: f32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:5001".to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            detect_confidence: 0.25,
            multi_confidence: 0.3,
        }
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    state: ServiceState,
}

impl ApiServer {
    /// `backend` is `None` when no model could be loaded; detection
    /// routes then answer "Model not loaded".
    pub fn new(cfg: ApiConfig, resolver: CategoryResolver, backend: Option<SharedBackend>) -> Self {
        let state = ServiceState {
            resolver,
            backend,
            detect_confidence: cfg.detect_confidence,
            multi_confidence: cfg.multi_confidence,
        };
        Self { cfg, state }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let cfg = self.cfg;
        let state = self.state;
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, &cfg, &state, shutdown_thread) {
                log::error!("detection api stopped: {}", err);
            }
        });

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(
    listener: TcpListener,
    cfg: &ApiConfig,
    state: &ServiceState,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    let cfg = Arc::new(cfg.clone());
    let state = Arc::new(state.clone());
    let active = Arc::new(AtomicUsize::new(0));
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                let Some(slot) = ConnectionSlot::acquire(&active) else {
                    log::warn!(
                        "detection api busy, refusing {} ({} connections open)",
                        peer,
                        MAX_CONNECTIONS
                    );
                    if let Err(err) = refuse_busy(stream) {
                        log::debug!("failed to refuse {}: {}", peer, err);
                    }
                    continue;
                };
                let cfg = cfg.clone();
                let state = state.clone();
                std::thread::spawn(move || {
                    let _slot = slot;
                    if let Err(err) = handle_connection(stream, &cfg, &state) {
                        log::warn!("detection api request from {} rejected: {}", peer, err);
                    }
                });
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(err) if is_transient_accept_error(&err) => {
                log::warn!("detection api accept failed: {}", err);
                std::thread::sleep(ACCEPT_BACKOFF);
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

/// Errors that leave the listener usable: aborted handshakes, interrupted
/// calls and descriptor exhaustion.
fn is_transient_accept_error(err: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    match err.kind() {
        ErrorKind::ConnectionAborted
        | ErrorKind::ConnectionReset
        | ErrorKind::Interrupted
        | ErrorKind::TimedOut
        | ErrorKind::OutOfMemory => true,
        // EMFILE / ENFILE surface as uncategorized OS errors.
        _ => matches!(err.raw_os_error(), Some(23) | Some(24)),
    }
}

/// Counts a live connection thread until dropped.
struct ConnectionSlot {
    active: Arc<AtomicUsize>,
}

impl ConnectionSlot {
    fn acquire(active: &Arc<AtomicUsize>) -> Option<Self> {
        active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < MAX_CONNECTIONS).then_some(n + 1)
            })
            .ok()
            .map(|_| Self {
                active: active.clone(),
            })
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

fn refuse_busy(mut stream: TcpStream) -> Result<()> {
    stream.set_nonblocking(false)?;
    let response = HttpResponse::json(
        503,
        serde_json::json!({ "success": false, "message": "Server busy" }),
    );
    http::write_response(&mut stream, &response)
}

fn handle_connection(mut stream: TcpStream, cfg: &ApiConfig, state: &ServiceState) -> Result<()> {
    stream.set_nonblocking(false)?;
    let (mut request, leftover) = match http::read_head(&mut stream) {
        Ok(head) => head,
        Err(err) => {
            let response = HttpResponse::json(
                400,
                serde_json::json!({ "success": false, "message": "Malformed request" }),
            );
            http::write_response(&mut stream, &response)?;
            return Err(err);
        }
    };

    let len = request.content_length()?;
    if len > cfg.max_body_bytes {
        let response = HttpResponse::json(
            413,
            serde_json::json!({ "success": false, "message": "Image too large" }),
        );
        http::write_response(&mut stream, &response)?;
        return Err(anyhow!(
            "body of {} bytes exceeds limit of {}",
            len,
            cfg.max_body_bytes
        ));
    }
    request.body = http::read_body(&mut stream, leftover, len)?;

    log::debug!("{} {} ({} bytes)", request.method, request.path, len);
    let response = routes::route(state, &request);
    http::write_response(&mut stream, &response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn accept_errors_from_peers_and_fd_exhaustion_are_transient() {
        assert!(is_transient_accept_error(&Error::from(ErrorKind::ConnectionAborted)));
        assert!(is_transient_accept_error(&Error::from(ErrorKind::Interrupted)));
        assert!(is_transient_accept_error(&Error::from_raw_os_error(24)));
        assert!(!is_transient_accept_error(&Error::from(ErrorKind::InvalidInput)));
    }

    #[test]
    fn connection_slots_are_bounded_and_released() {
        let active = Arc::new(AtomicUsize::new(MAX_CONNECTIONS - 1));
        let slot = ConnectionSlot::acquire(&active).expect("one slot left");
        assert!(ConnectionSlot::acquire(&active).is_none());
        drop(slot);
        assert_eq!(active.load(Ordering::SeqCst), MAX_CONNECTIONS - 1);
        assert!(ConnectionSlot::acquire(&active).is_some());
    }
}
