use axum::{
    Json,
    body::Bytes,
    extract::{ConnectInfo, FromRequestParts, State, rejection::BytesRejection},
    http::{HeaderMap, StatusCode, request::Parts},
};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::error::{RelayError, Result};
use crate::mailer::OutgoingMail;
use crate::metrics::{EMAILS_SENT, EMAIL_FAILURES, RATE_LIMITED, RATE_LIMIT_KEYS, REQUEST_LATENCY, REQUEST_TOTAL};
use crate::models::{SendChartRequest, SendChartResponse};
use crate::payload;
use crate::rate_limit::RateDecision;
use crate::state::AppState;
use crate::validate::is_valid_email;

pub const API_KEY_HEADER: &str = "x-api-key";

// Rate limit key: the peer IP of the connection, "unknown" when the server was
// not started with connect info.
pub struct ClientKey(pub String);

impl<S> FromRequestParts<S> for ClientKey
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> std::result::Result<Self, Self::Rejection> {
        let key = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Ok(ClientKey(key))
    }
}

// compares fixed-size digests so timing does not depend on where the key differs
fn check_api_key(expected: Option<&str>, headers: &HeaderMap) -> Result<()> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let provided = headers
        .get(API_KEY_HEADER)
        .map(|v| v.as_bytes())
        .unwrap_or_default();
    if Sha256::digest(provided) == Sha256::digest(expected.as_bytes()) {
        Ok(())
    } else {
        Err(RelayError::Unauthorized)
    }
}

pub async fn send_chart_handler(
    State(state): State<Arc<AppState>>,
    ClientKey(client): ClientKey,
    headers: HeaderMap,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Result<Json<SendChartResponse>> {
    REQUEST_TOTAL.inc();
    let start_time = Instant::now();

    let result = relay_chart(&state, &client, &headers, body).await;

    REQUEST_LATENCY.observe(start_time.elapsed().as_secs_f64());
    if let Err(err) = &result {
        info!(client = %client, status = err.status().as_u16(), reason = %err, "send-chart rejected");
    }
    result.map(|()| Json(SendChartResponse { ok: true }))
}

// bodies over the route limit surface here rather than as axum's plain-text 413
fn read_body(body: std::result::Result<Bytes, BytesRejection>) -> Result<Bytes> {
    body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            RelayError::ImageTooLarge
        } else {
            RelayError::InvalidJson
        }
    })
}

// only a JSON object is a request; serde would also take the fields as an array
fn parse_request(body: &[u8]) -> Result<SendChartRequest> {
    match serde_json::from_slice::<Value>(body) {
        Ok(value @ Value::Object(_)) => {
            serde_json::from_value(value).map_err(|_| RelayError::InvalidJson)
        }
        _ => Err(RelayError::InvalidJson),
    }
}

async fn relay_chart(
    state: &AppState,
    client: &str,
    headers: &HeaderMap,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Result<()> {
    let config = &state.config;

    // counted before the key check so wrong keys are throttled too
    let decision = state.rate_limiter.check(client, Instant::now());
    RATE_LIMIT_KEYS.set(state.rate_limiter.tracked_keys() as f64);
    if let RateDecision::Limited { retry_after } = decision {
        RATE_LIMITED.inc();
        return Err(RelayError::RateLimited { retry_after });
    }

    check_api_key(config.api_key.as_deref(), headers)?;

    let body = read_body(body)?;
    let request = parse_request(&body)?;

    let to = request
        .to
        .as_deref()
        .filter(|to| is_valid_email(to))
        .ok_or(RelayError::InvalidRecipient)?;

    let data = request
        .data
        .as_deref()
        .filter(|data| !data.is_empty())
        .ok_or(RelayError::NoImageData)?;

    let encoded = payload::strip_data_url(data);
    payload::check_size(encoded, &config.limits)?;

    let from = config
        .email_from
        .as_deref()
        .ok_or(RelayError::NotConfigured("EMAIL_FROM"))?;
    let mailer = state
        .mailer
        .as_ref()
        .ok_or(RelayError::NotConfigured("SMTP_HOST"))?;

    let image = payload::decode_image(encoded)?;
    if !payload::is_png(&image) {
        warn!(client = %client, "attachment does not carry a PNG signature");
    }

    let filename = request.attachment_name();
    let sha256 = format!("{:x}", Sha256::digest(&image));
    let size = image.len();
    let mail = OutgoingMail::chart(from, to, filename.clone(), image);

    match mailer.send_mail(mail).await {
        Ok(()) => {
            EMAILS_SENT.inc();
            info!(client = %client, %filename, size, %sha256, "chart email sent");
            Ok(())
        }
        Err(err) => {
            EMAIL_FAILURES.inc();
            error!(client = %client, error = %err, "chart email failed");
            Err(err.into())
        }
    }
}
