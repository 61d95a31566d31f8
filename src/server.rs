use axum::{
    Router,
    extract::{DefaultBodyLimit, Request},
    http::{HeaderName, HeaderValue, Method, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::RelayConfig;
use crate::handlers::{API_KEY_HEADER, health_handler, metrics_handler, not_found_handler, send_chart_handler};
use crate::mailer::{MailTransport, SmtpMailer};
use crate::rate_limit::{MemoryRateLimiter, RateLimitStore, sweep_expired};
use crate::state::AppState;

// request bodies above this are refused before the handler runs
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(state.config.allowed_origin.as_deref());

    let app = Router::new()
        .route(
            "/send-chart",
            post(send_chart_handler).layer(DefaultBodyLimit::max(MAX_BODY_BYTES)),
        )
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .fallback(not_found_handler)
        .with_state(state);

    let app = match cors {
        Some(cors) => app.layer(cors),
        None => app,
    };

    app.layer(middleware::from_fn(preflight_no_content))
        .layer(TraceLayer::new_for_http())
}

// CORS headers go only to the configured origin; without one, none are sent
fn cors_layer(allowed_origin: Option<&str>) -> Option<CorsLayer> {
    let origin = HeaderValue::from_str(allowed_origin?).ok()?;
    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list([origin]))
            .allow_methods([Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, HeaderName::from_static(API_KEY_HEADER)]),
    )
}

// OPTIONS on any route answers 204 with no body, keeping whatever CORS headers were granted
async fn preflight_no_content(req: Request, next: Next) -> Response {
    if req.method() != Method::OPTIONS {
        return next.run(req).await;
    }

    let inner = next.run(req).await;
    let granted = inner
        .headers()
        .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN);
    let mut response = StatusCode::NO_CONTENT.into_response();
    for (name, value) in inner.headers() {
        let is_cors = name.as_str().starts_with("access-control-");
        if (granted && is_cors) || name == header::VARY {
            response.headers_mut().append(name.clone(), value.clone());
        }
    }
    response
}

pub async fn run(config: RelayConfig) -> Result<(), Box<dyn std::error::Error>> {
    crate::metrics::init();

    let mailer: Option<Arc<dyn MailTransport>> = match &config.smtp {
        Some(smtp) => Some(Arc::new(SmtpMailer::new(smtp).map_err(crate::error::ConfigError::from)?)),
        None => {
            warn!("SMTP_HOST not set; send-chart will answer 500 until it is configured");
            None
        }
    };
    if config.email_from.is_none() {
        warn!("EMAIL_FROM not set; send-chart will answer 500 until it is configured");
    }

    if let Some(mailer) = &mailer {
        spawn_verify(Arc::clone(mailer));
    }

    let rate_limiter: Arc<dyn RateLimitStore> =
        Arc::new(MemoryRateLimiter::new(config.rate_window, config.rate_max));
    tokio::spawn(sweep_expired(Arc::clone(&rate_limiter), config.rate_window));

    let port = config.port;
    info!(
        rate_max = config.rate_max,
        rate_window_ms = config.rate_window.as_millis() as u64,
        allowed_origin = config.allowed_origin.as_deref().unwrap_or("<none>"),
        api_key = config.api_key.is_some(),
        "relay configured"
    );

    let state = Arc::new(AppState {
        config,
        rate_limiter,
        mailer,
    });
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("Email relay running on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("relay stopped");
    Ok(())
}

// verification is logged only, the server comes up either way
fn spawn_verify(mailer: Arc<dyn MailTransport>) -> JoinHandle<()> {
    tokio::spawn(async move {
        match mailer.verify().await {
            Ok(()) => info!("SMTP transport verified"),
            Err(e) => warn!(error = %e, "SMTP verify failed"),
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
