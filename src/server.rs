//! HTTP front end for the upload pipeline
//!
//! A fixed number of request threads share one `tiny_http` listener. Each
//! request is handled on its own: the body and decompression buffers live only
//! for that request.
//!
//! Routes:
//! - `POST /upload?filename=..&checksum=..&compression_ratio=..` → JSON
//!   [`UploadResult`] (200 for `ok`, 400 for `error`)
//! - `GET /metrics` → Prometheus text, when metrics are attached
//! - `GET /health` → `ok`

use crate::metrics::TransferMetrics;
use crate::protocol::{UploadHandler, UploadQuery, UploadResult};
use rand::RngCore;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tiny_http::{Header, Method, Request, Response};
use tracing::{debug, error, info, warn};

/// Handle to the running upload server
pub struct UploadServer {
    shutdown: Arc<AtomicBool>,
    threads: Vec<thread::JoinHandle<()>>,
    addr: SocketAddr,
}

impl UploadServer {
    /// Bind `bind` and start `request_threads` request threads
    pub fn start<R>(
        bind: &str,
        request_threads: usize,
        handler: Arc<UploadHandler<R>>,
        metrics: Option<TransferMetrics>,
    ) -> Result<Self, String>
    where
        R: RngCore + Send + 'static,
    {
        let server = tiny_http::Server::http(bind)
            .map_err(|e| format!("failed to start upload server on {}: {}", bind, e))?;
        let addr = server
            .server_addr()
            .to_ip()
            .ok_or_else(|| format!("upload server on {} is not bound to an IP address", bind))?;
        let server = Arc::new(server);

        info!(addr = %addr, threads = request_threads, "upload server started");

        let shutdown = Arc::new(AtomicBool::new(false));
        let mut threads = Vec::with_capacity(request_threads.max(1));
        for id in 0..request_threads.max(1) {
            let server = server.clone();
            let handler = handler.clone();
            let metrics = metrics.clone();
            let shutdown = shutdown.clone();
            let thread = thread::Builder::new()
                .name(format!("sdxfer-http-{}", id))
                .spawn(move || serve_loop(&server, &handler, metrics.as_ref(), &shutdown))
                .map_err(|e| format!("failed to spawn request thread: {}", e))?;
            threads.push(thread);
        }

        Ok(Self {
            shutdown,
            threads,
            addr,
        })
    }

    /// Get the bound address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Block until the request threads exit
    pub fn join(mut self) {
        for thread in self.threads.drain(..) {
            let _ = thread.join();
        }
    }

    /// Shut down the upload server.
    pub fn shutdown(mut self) {
        self.stop();
        info!("upload server stopped");
    }

    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        for thread in self.threads.drain(..) {
            let _ = thread.join();
        }
    }
}

impl Drop for UploadServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Accept requests until shutdown is signalled
fn serve_loop<R: RngCore>(
    server: &tiny_http::Server,
    handler: &UploadHandler<R>,
    metrics: Option<&TransferMetrics>,
    shutdown: &AtomicBool,
) {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        // Accept with timeout so we can check shutdown flag
        let request = match server.recv_timeout(Duration::from_millis(200)) {
            Ok(Some(req)) => req,
            Ok(None) => continue,
            Err(e) => {
                if !shutdown.load(Ordering::SeqCst) {
                    error!(error = %e, "upload server accept error");
                }
                break;
            }
        };

        route(request, handler, metrics);
    }
}

fn route<R: RngCore>(
    mut request: Request,
    handler: &UploadHandler<R>,
    metrics: Option<&TransferMetrics>,
) {
    let url = request.url().to_string();
    let (path, query) = match url.split_once('?') {
        Some((path, query)) => (path.to_string(), query.to_string()),
        None => (url.clone(), String::new()),
    };
    debug!(method = %request.method(), path = %path, "request");

    let response = match (request.method(), path.as_str()) {
        (Method::Post, "/upload") => {
            let query = parse_query(&query);
            let result = handler.handle(&query, request.as_reader());
            json_response(&result)
        }
        (_, "/upload") => Response::from_string("method not allowed").with_status_code(405),
        (Method::Get, "/metrics") => match metrics {
            Some(metrics) => metrics_response(metrics),
            None => Response::from_string("not found").with_status_code(404),
        },
        (Method::Get, "/health") | (Method::Get, "/healthz") => Response::from_string("ok"),
        _ => Response::from_string("not found").with_status_code(404),
    };

    if let Err(e) = request.respond(response) {
        warn!(error = %e, "failed to send response");
    }
}

/// Percent-decode a raw query string into upload metadata
pub fn parse_query(raw: &str) -> UploadQuery {
    UploadQuery::from_pairs(url::form_urlencoded::parse(raw.as_bytes()))
}

fn json_response(result: &UploadResult) -> Response<std::io::Cursor<Vec<u8>>> {
    let status = if result.is_ok() { 200 } else { 400 };
    let body = match serde_json::to_vec(result) {
        Ok(body) => body,
        Err(e) => {
            error!(error = %e, "failed to encode upload result");
            return Response::from_string(format!("error: {}", e)).with_status_code(500);
        }
    };

    let mut response = Response::from_data(body).with_status_code(status);
    if let Ok(header) = "Content-Type: application/json".parse::<Header>() {
        response.add_header(header);
    }
    response
}

fn metrics_response(metrics: &TransferMetrics) -> Response<std::io::Cursor<Vec<u8>>> {
    match metrics.render() {
        Ok(body) => {
            let mut response = Response::from_string(body);
            let content_type = "Content-Type: text/plain; version=0.0.4; charset=utf-8";
            if let Ok(header) = content_type.parse::<Header>() {
                response.add_header(header);
            }
            response
        }
        Err(e) => {
            error!(error = %e, "failed to render metrics");
            Response::from_string(format!("error: {}", e)).with_status_code(500)
        }
    }
}
