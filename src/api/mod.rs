//! HTTP surface.
//!
//! - `GET /health`: model availability
//! - `GET /stream`: multipart/x-mixed-replace JPEG stream of annotated frames
//! - `POST /detect`: single-shot detection on an uploaded image
//!
//! One thread per connection. Streams run until the source ends, a frame
//! fails, the client disconnects or the server is stopped.

mod http;
mod multipart;

use anyhow::{anyhow, Result};
use serde_json::json;
use std::io::Write;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::encode::STREAM_CONTENT_TYPE;
use crate::error::PipelineError;
use crate::ingest::build_source;
use crate::pipeline::{DetectionsResponse, Pipeline};
use crate::session::{CloseReason, StreamSession};
use http::{read_request, write_json_response, write_stream_head, BodyTooLarge, HttpRequest};
use multipart::{form_boundary, parse_form};

const IMAGE_FIELD: &str = "image";

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    /// Stop accepting connections and end open streams.
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
    addr: String,
    pipeline: Pipeline,
}

impl ApiServer {
    pub fn new(addr: impl Into<String>, pipeline: Pipeline) -> Self {
        Self {
            addr: addr.into(),
            pipeline,
        }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        if configured_addr.ip().is_loopback() && !addr.ip().is_loopback() {
            return Err(anyhow!(
                "api configured for loopback address '{}', but bound to non-loopback address '{}'",
                configured_addr,
                addr
            ));
        }
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let pipeline = self.pipeline;
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, pipeline, shutdown_thread) {
                log::error!("api stopped: {}", err);
            }
        });
        log::info!("api listening on http://{}", addr);

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(listener: TcpListener, pipeline: Pipeline, shutdown: Arc<AtomicBool>) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                let pipeline = pipeline.clone();
                let shutdown = shutdown.clone();
                std::thread::spawn(move || {
                    if let Err(err) = handle_connection(stream, &pipeline, shutdown) {
                        log::warn!("api request rejected: {:#}", err);
                    }
                });
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(
    mut stream: TcpStream,
    pipeline: &Pipeline,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    stream.set_nonblocking(false)?;
    let peer = stream.peer_addr()?;
    let local = stream.local_addr()?;
    if local.ip().is_loopback() && !peer.ip().is_loopback() {
        write_json_response(&mut stream, 403, &json!({"error": "forbidden"}))?;
        return Ok(());
    }

    let request = match read_request(&mut stream) {
        Ok(request) => request,
        Err(err) => {
            let status = if err.is::<BodyTooLarge>() { 413 } else { 400 };
            write_json_response(&mut stream, status, &json!({"error": err.to_string()}))?;
            return Err(err);
        }
    };

    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/health") => {
            let body = json!({
                "status": "ok",
                "detector": pipeline.has_detector(),
                "depth": pipeline.has_depth(),
            });
            write_json_response(&mut stream, 200, &body)
        }
        ("GET", "/stream") => serve_stream(stream, pipeline, shutdown),
        ("POST", "/detect") => serve_detect(&mut stream, pipeline, &request),
        (_, "/health" | "/stream" | "/detect") => {
            write_json_response(&mut stream, 405, &json!({"error": "method_not_allowed"}))
        }
        _ => write_json_response(&mut stream, 404, &json!({"error": "not_found"})),
    }
}

fn error_body(err: &PipelineError) -> serde_json::Value {
    json!({"error": err.to_string(), "kind": err.kind()})
}

fn serve_stream(mut stream: TcpStream, pipeline: &Pipeline, shutdown: Arc<AtomicBool>) -> Result<()> {
    let config = pipeline.config();
    let source = match build_source(&config.source, &config.capture) {
        Ok(source) => source,
        Err(err) => {
            log::error!("stream rejected: {}", err);
            return write_json_response(&mut stream, 503, &error_body(&err));
        }
    };
    let mut session = StreamSession::new(pipeline.clone(), source).with_cancel_flag(shutdown);
    if let Err(err) = session.open() {
        return write_json_response(&mut stream, 503, &error_body(&err));
    }

    write_stream_head(&mut stream, STREAM_CONTENT_TYPE)?;
    while let Some(chunk) = session.next_chunk() {
        if let Err(err) = stream.write_all(&chunk) {
            log::info!("session {}: client disconnected: {}", session.id(), err);
            session.close(CloseReason::Cancelled);
            break;
        }
    }
    Ok(())
}

/// Image bytes from a form upload (`image` field) or a raw image body.
fn upload_bytes(request: &HttpRequest) -> Result<Vec<u8>, PipelineError> {
    let content_type = request.content_type().unwrap_or("");
    if let Some(boundary) = form_boundary(content_type) {
        let parts = parse_form(&request.body, &boundary)
            .map_err(|e| PipelineError::Decode(format!("malformed multipart body: {e}")))?;
        let part = parts
            .into_iter()
            .find(|p| p.name == IMAGE_FIELD)
            .ok_or_else(|| PipelineError::Decode("no image file provided".into()))?;
        if part.filename.as_deref() == Some("") || part.data.is_empty() {
            return Err(PipelineError::Decode("no file selected".into()));
        }
        return Ok(part.data);
    }
    if request.body.is_empty() {
        return Err(PipelineError::Decode("no image file provided".into()));
    }
    Ok(request.body.clone())
}

fn serve_detect(stream: &mut TcpStream, pipeline: &Pipeline, request: &HttpRequest) -> Result<()> {
    let result = upload_bytes(request).and_then(|bytes| pipeline.single_shot(&bytes));
    match result {
        Ok(analysis) => {
            let body = serde_json::to_value(DetectionsResponse::success(&analysis))?;
            write_json_response(stream, 200, &body)
        }
        Err(err) => {
            let status = if err.is_client_error() { 400 } else { 500 };
            log::warn!("detect request failed ({}): {}", status, err);
            write_json_response(stream, status, &error_body(&err))
        }
    }
}
