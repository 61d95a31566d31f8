//! Chart Composer: turns the twelve months of figures into a PNG and either
//! saves it locally or emails it through the relay.

use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

use crate::chart::ChartPayload;
use crate::config::ComposeArgs;
use crate::handlers::API_KEY_HEADER;
use crate::models::{ErrorBody, SendChartRequest};
use crate::payload::encode_image;
use crate::render::{ChartError, ChartOptions, render_png};
use crate::validate::is_valid_email;

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error(transparent)]
    Chart(#[from] ChartError),

    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid recipient {0:?}")]
    InvalidRecipient(String),

    // relay answered with an error
    #[error("Send failed: {0}")]
    Rejected(String),

    // no usable response from the relay
    #[error("Network error sending email: {0}")]
    Network(String),
}

pub struct RelayClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl RelayClient {
    pub fn new(relay_url: &str, api_key: Option<String>) -> Self {
        Self::with_client(reqwest::Client::new(), relay_url, api_key)
    }

    pub fn with_client(client: reqwest::Client, relay_url: &str, api_key: Option<String>) -> Self {
        Self {
            client,
            endpoint: format!("{}/send-chart", relay_url.trim_end_matches('/')),
            api_key,
        }
    }

    /// POSTs `{to, filename, data}` with `data` as plain base64.
    pub async fn send_chart(&self, to: &str, filename: &str, png: &[u8]) -> Result<(), ComposeError> {
        let body = SendChartRequest {
            to: Some(to.to_string()),
            filename: Some(filename.to_string()),
            data: Some(encode_image(png)),
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ComposeError::Network(e.to_string()))?;

        let status = response.status();
        debug!(status = status.as_u16(), "relay responded");
        if status.is_success() {
            return Ok(());
        }

        // an unreadable error body falls back to the status text
        let reason = response
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(|body| body.error)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());
        Err(ComposeError::Rejected(reason))
    }
}

pub async fn run(args: ComposeArgs) -> Result<(), ComposeError> {
    let payload = ChartPayload::from_csv(&args.income, &args.expenses);
    let options = ChartOptions {
        width: args.width,
        height: args.height,
        scale: args.scale,
    };

    if let Some(to) = &args.send_to {
        // checked before rendering so a typo costs nothing
        if !is_valid_email(to) {
            return Err(ComposeError::InvalidRecipient(to.clone()));
        }
        let png = render_png(&payload, &options)?;
        let client = RelayClient::new(&args.relay_url, args.api_key.clone());
        client.send_chart(to, &args.filename, &png).await?;
        info!(to = %to, bytes = png.len(), "chart sent through relay");
        println!("Email sent");
        return Ok(());
    }

    let png = render_png(&payload, &options)?;
    save_png(Path::new(&args.out), &png).await?;
    println!("Saved chart to {}", args.out);
    Ok(())
}

async fn save_png(path: &Path, png: &[u8]) -> Result<(), ComposeError> {
    tokio::fs::write(path, png)
        .await
        .map_err(|source| ComposeError::Write {
            path: path.display().to_string(),
            source,
        })
}
