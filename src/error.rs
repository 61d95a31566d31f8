use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

use crate::mailer::MailError;

pub type Result<T> = std::result::Result<T, RelayError>;

// Every way a relay request can fail. The Display text is what the client sees.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("rate limit exceeded")]
    RateLimited { retry_after: Duration },

    #[error("invalid json")]
    InvalidJson,

    #[error("invalid recipient")]
    InvalidRecipient,

    #[error("no image data")]
    NoImageData,

    #[error("image too large")]
    ImageTooLarge,

    #[error("invalid base64")]
    InvalidBase64,

    #[error("server not configured ({0})")]
    NotConfigured(&'static str),

    #[error("internal error")]
    Mail(#[source] MailError),

    #[error("not found")]
    NotFound,
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::Unauthorized => StatusCode::UNAUTHORIZED,
            RelayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            RelayError::InvalidJson
            | RelayError::InvalidRecipient
            | RelayError::NoImageData
            | RelayError::InvalidBase64 => StatusCode::BAD_REQUEST,
            RelayError::ImageTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            RelayError::NotConfigured(_) | RelayError::Mail(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            RelayError::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

impl From<MailError> for RelayError {
    fn from(err: MailError) -> Self {
        match err {
            // the sender was validated at boot, so a bad address here is the recipient
            MailError::InvalidAddress(_) => RelayError::InvalidRecipient,
            other => RelayError::Mail(other),
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": self.to_string(),
        }));
        let mut response = (status, body).into_response();

        if let RelayError::RateLimited { retry_after } = self {
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs.max(1)));
        }
        response
    }
}

// Startup failures. These abort the process before the listener binds.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("failed to build SMTP transport: {0}")]
    Transport(#[from] MailError),
}
