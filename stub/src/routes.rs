//! Request handling for the stub server

use hyper::header::{HeaderValue, CACHE_CONTROL, CONTENT_TYPE};
use hyper::{Body, Method, Request, Response, StatusCode};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Shared state across connections
#[derive(Debug, Default)]
pub struct Routes {
    next_id: AtomicU64,
}

impl Routes {
    /// Fresh state; ids start at 1
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Dispatch one request
    pub async fn handle(self: Arc<Self>, req: Request<Body>) -> Result<Response<Body>, Infallible> {
        let path = req.uri().path().to_string();
        debug!("{} {}", req.method(), path);

        let reply = match (req.method(), path.as_str()) {
            (&Method::GET, "/health") => json_response(StatusCode::OK, json!({ "status": "ok" })),
            (&Method::POST, _) => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
                let cache_control = req
                    .headers()
                    .get(CACHE_CONTROL)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                json_response(
                    StatusCode::OK,
                    json!({ "id": id, "path": path, "cacheControl": cache_control }),
                )
            }
            _ => json_response(
                StatusCode::NOT_FOUND,
                json!({ "error": format!("no route for {} {}", req.method(), path) }),
            ),
        };
        Ok(reply)
    }
}

fn json_response(status: StatusCode, body: Value) -> Response<Body> {
    let mut response = Response::new(Body::from(body.to_string()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
