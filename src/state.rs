use std::sync::Arc;
use crate::config::RelayConfig;
use crate::mailer::MailTransport;
use crate::rate_limit::RateLimitStore;
// app's shared state

pub struct AppState {
    pub config: RelayConfig,
    pub rate_limiter: Arc<dyn RateLimitStore>,
    pub mailer: Option<Arc<dyn MailTransport>>, // None when SMTP_HOST is unset
}
