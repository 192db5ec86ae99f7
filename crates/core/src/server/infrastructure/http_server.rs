use std::io::{Cursor, Read};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tiny_http::{Header, Method, Request, Response, Server};

use crate::pipeline::ingestion_handler::{IngestError, IngestionHandler};
use crate::shared::constants::{INGEST_ROUTE, STATIC_ROUTE_PREFIX, VIEWER_REFRESH_SECS};
use crate::shared::shutdown::ShutdownToken;

/// How often idle workers re-check for shutdown.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

type HttpResponse = Response<Cursor<Vec<u8>>>;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("cannot listen on {addr}: {reason}")]
    Bind { addr: String, reason: String },
}

/// Inbound HTTP surface: the ingestion endpoint the device uploads to, plus
/// a small viewer for the latest processed image.
///
/// A fixed pool of worker threads shares one listener, so several uploads
/// can be ingested at once.
pub struct HttpServer {
    server: Arc<Server>,
    routes: Arc<Routes>,
    workers: usize,
}

impl HttpServer {
    pub fn bind(
        addr: &str,
        ingestion: Arc<IngestionHandler>,
        output_path: impl Into<PathBuf>,
        workers: usize,
    ) -> Result<Self, ServerError> {
        let server = Server::http(addr).map_err(|e| ServerError::Bind {
            addr: addr.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            server: Arc::new(server),
            routes: Arc::new(Routes::new(ingestion, output_path.into())),
            workers: workers.max(1),
        })
    }

    /// The bound socket address, useful when binding to port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.server_addr().to_ip()
    }

    /// Starts the worker pool. Each worker returns how many requests it served.
    pub fn spawn(self, shutdown: &ShutdownToken) -> Vec<JoinHandle<usize>> {
        if let Some(addr) = self.local_addr() {
            log::info!("HTTP server listening on http://{addr} ({} workers)", self.workers);
        }
        (0..self.workers)
            .map(|_| {
                let server = self.server.clone();
                let routes = self.routes.clone();
                let shutdown = shutdown.clone();
                std::thread::spawn(move || serve(&server, &routes, &shutdown))
            })
            .collect()
    }
}

fn serve(server: &Server, routes: &Routes, shutdown: &ShutdownToken) -> usize {
    let mut served = 0;
    while !shutdown.is_cancelled() {
        match server.recv_timeout(POLL_INTERVAL) {
            Ok(Some(request)) => {
                routes.handle(request);
                served += 1;
            }
            Ok(None) => {}
            Err(e) => {
                log::error!("Accepting HTTP request failed: {e}");
                if !shutdown.sleep(POLL_INTERVAL) {
                    break;
                }
            }
        }
    }
    served
}

struct Routes {
    ingestion: Arc<IngestionHandler>,
    output_path: PathBuf,
    output_url: String,
}

impl Routes {
    fn new(ingestion: Arc<IngestionHandler>, output_path: PathBuf) -> Self {
        let name = output_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            ingestion,
            output_path,
            output_url: format!("{STATIC_ROUTE_PREFIX}{name}"),
        }
    }

    fn handle(&self, mut request: Request) {
        let method = request.method().clone();
        let path = request.url().split('?').next().unwrap_or_default().to_string();
        let response = match (&method, path.as_str()) {
            (Method::Post, INGEST_ROUTE) => self.receive_image(&mut request),
            (Method::Get, "/") => self.viewer(),
            (Method::Get, p) if p == self.output_url => self.output_image(),
            (_, p) if p == INGEST_ROUTE || p == "/" || p == self.output_url => {
                text(405, "Method not allowed")
            }
            _ => text(404, "Not found"),
        };
        log::debug!("{method} {path} -> {}", response.status_code().0);
        if let Err(e) = request.respond(response) {
            log::debug!("Failed to send response: {e}");
        }
    }

    fn receive_image(&self, request: &mut Request) -> HttpResponse {
        let limit = self.ingestion.max_payload_bytes();
        if let Some(size) = request.body_length().filter(|&len| len > limit) {
            return rejection(&IngestError::PayloadTooLarge { size, limit });
        }

        // Chunked bodies carry no length; read one byte past the limit to detect overflow.
        let mut payload = Vec::new();
        if let Err(e) = request
            .as_reader()
            .take(limit as u64 + 1)
            .read_to_end(&mut payload)
        {
            log::warn!("Reading upload failed: {e}");
            return text(400, "Unreadable request body");
        }

        match self.ingestion.ingest(&payload) {
            Ok(_) => text(200, "Image received"),
            Err(e) => rejection(&e),
        }
    }

    fn viewer(&self) -> HttpResponse {
        let page = format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
             <meta http-equiv=\"refresh\" content=\"{VIEWER_REFRESH_SECS}\">\n\
             <title>Camera Bridge</title>\n</head>\n<body>\n\
             <h1>Latest processed frame</h1>\n\
             <img src=\"{}\" alt=\"No frame processed yet\">\n</body>\n</html>\n",
            self.output_url
        );
        with_content_type(Response::from_data(page.into_bytes()), "text/html; charset=utf-8")
    }

    fn output_image(&self) -> HttpResponse {
        match std::fs::read(&self.output_path) {
            Ok(bytes) => {
                let mime = image::ImageFormat::from_path(&self.output_path)
                    .map(|f| f.to_mime_type())
                    .unwrap_or("application/octet-stream");
                with_content_type(Response::from_data(bytes), mime)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => text(404, "No frame yet"),
            Err(e) => {
                log::warn!("Reading {} failed: {e}", self.output_path.display());
                text(500, "Output unavailable")
            }
        }
    }
}

fn rejection(err: &IngestError) -> HttpResponse {
    log::warn!("Rejected upload: {err}");
    let status = match err {
        IngestError::EmptyPayload => 400,
        IngestError::PayloadTooLarge { .. } => 413,
        IngestError::Undecodable(_) => 422,
    };
    text(status, &err.to_string())
}

fn text(status: u16, body: &str) -> HttpResponse {
    with_content_type(
        Response::from_data(body.as_bytes().to_vec()).with_status_code(status),
        "text/plain; charset=utf-8",
    )
}

fn with_content_type(response: HttpResponse, value: &str) -> HttpResponse {
    match Header::from_bytes(&b"Content-Type"[..], value.as_bytes()) {
        Ok(header) => response.with_header(header),
        Err(()) => response,
    }
}
