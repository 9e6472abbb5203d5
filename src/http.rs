//! HTTP surface.
//!
//! `POST /api/booking`, `POST /api/whitelist` and `GET /health`, served with
//! hyper. Bodies are JSON in both directions.

use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::booking::{Assignment, BookingCoordinator, BookingOutcome, BookingRequest};
use crate::error::BookingError;
use crate::evaluator::{WhitelistRequest, WhitelistService};
use crate::model::UnixtimeMs;
use crate::traits::{FleetRepository, RoutingProvider};

/// Everything a request handler needs.
pub struct Services {
    pub booking: BookingCoordinator<dyn RoutingProvider, dyn FleetRepository>,
    pub whitelist: WhitelistService<dyn RoutingProvider, dyn FleetRepository>,
}

#[derive(Serialize)]
struct BookingReply<'a> {
    status: u8,
    message: &'a str,
    #[serde(flatten)]
    assignment: Option<&'a Assignment>,
}

fn parse<T: DeserializeOwned>(body: &[u8]) -> Result<T, (StatusCode, serde_json::Value)> {
    serde_json::from_slice(body).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            json!({ "message": format!("invalid request body: {e}") }),
        )
    })
}

fn bad_request(message: &str) -> (StatusCode, serde_json::Value) {
    (StatusCode::BAD_REQUEST, json!({ "message": message }))
}

async fn book(services: &Services, body: &[u8], now: UnixtimeMs) -> (StatusCode, serde_json::Value) {
    let request: BookingRequest = match parse(body) {
        Ok(request) => request,
        Err(reply) => return reply,
    };
    if request.num_passengers == 0 {
        return bad_request("numPassengers must be at least 1");
    }

    match services.booking.book(&request, now).await {
        Ok(BookingOutcome::Booked(assignment)) => {
            let reply = BookingReply {
                status: 0,
                message: "The booking was successful.",
                assignment: Some(&assignment),
            };
            (StatusCode::OK, json!(reply))
        }
        Ok(BookingOutcome::Rejected(rejection)) => {
            let reply = BookingReply {
                status: rejection.status(),
                message: rejection.message(),
                assignment: None,
            };
            (StatusCode::NOT_FOUND, json!(reply))
        }
        Err(e @ BookingError::TimeOutOfRange(_)) => {
            warn!(error = %e, "booking_request_invalid");
            let message = e.to_string();
            let reply = BookingReply {
                status: e.status(),
                message: &message,
                assignment: None,
            };
            (StatusCode::BAD_REQUEST, json!(reply))
        }
        Err(e) => {
            error!(error = %e, status = e.status(), "booking_failed");
            let message = e.to_string();
            let reply = BookingReply {
                status: e.status(),
                message: &message,
                assignment: None,
            };
            (StatusCode::INTERNAL_SERVER_ERROR, json!(reply))
        }
    }
}

async fn whitelist(
    services: &Services,
    body: &[u8],
    now: UnixtimeMs,
) -> (StatusCode, serde_json::Value) {
    let request: WhitelistRequest = match parse(body) {
        Ok(request) => request,
        Err(reply) => return reply,
    };
    if request.capacities.passengers == 0 {
        return bad_request("capacities.passengers must be at least 1");
    }

    match services.whitelist.evaluate(&request, now).await {
        Ok(response) => (StatusCode::OK, json!(response)),
        Err(e) => {
            error!(error = %e, "whitelist_failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "message": e.to_string() }),
            )
        }
    }
}

/// Routes one request. Split from the hyper plumbing so it can be driven
/// without a socket.
pub async fn dispatch(
    services: &Services,
    method: &Method,
    path: &str,
    body: &[u8],
    now: UnixtimeMs,
) -> (StatusCode, serde_json::Value) {
    match (method, path) {
        (&Method::GET, "/health") => (StatusCode::OK, json!({ "status": "ok" })),
        (&Method::POST, "/api/booking") => book(services, body, now).await,
        (&Method::POST, "/api/whitelist") => whitelist(services, body, now).await,
        _ => (StatusCode::NOT_FOUND, json!({ "message": "not found" })),
    }
}

async fn handle_request(
    req: Request<Incoming>,
    services: Arc<Services>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let (status, body) = match req.into_body().collect().await {
        Ok(collected) => {
            let now = chrono::Utc::now().timestamp_millis();
            dispatch(&services, &method, &path, &collected.to_bytes(), now).await
        }
        Err(e) => {
            warn!(error = %e, "request_body_read_failed");
            bad_request("could not read request body")
        }
    };

    let response = Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())));
    Ok(response.unwrap_or_else(|e| {
        error!(error = %e, "response_build_failed");
        let mut fallback = Response::new(Full::new(Bytes::new()));
        *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        fallback
    }))
}

/// Accepts connections until `shutdown` flips to `true` or its sender is dropped.
pub async fn serve(
    listener: TcpListener,
    services: Arc<Services>,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    info!(addr = %listener.local_addr()?, "http_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let services = services.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let services = services.clone();
                                async move { handle_request(req, services).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "http_connection_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "http_accept_error");
                    }
                }
            }
            changed = shutdown.changed() => {
                // a dropped sender also ends the loop
                if changed.is_err() || *shutdown.borrow() {
                    info!("http_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}
