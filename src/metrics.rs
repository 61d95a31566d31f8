use lazy_static::lazy_static;
use prometheus::{Counter, Gauge, Histogram, register_counter, register_gauge, register_histogram};

lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("bucks2bar_send_requests_total", "Total number of send-chart requests").unwrap();
    pub static ref RATE_LIMITED: Counter =
        register_counter!("bucks2bar_rate_limited_total", "Requests rejected by the rate limiter").unwrap();
    pub static ref EMAILS_SENT: Counter =
        register_counter!("bucks2bar_emails_sent_total", "Chart emails handed to the transport").unwrap();
    pub static ref EMAIL_FAILURES: Counter =
        register_counter!("bucks2bar_email_failures_total", "Chart emails the transport rejected").unwrap();
    pub static ref REQUEST_LATENCY: Histogram = register_histogram!(
        "bucks2bar_send_latency_seconds",
        "Send-chart request latency in seconds"
    )
    .unwrap();
    pub static ref RATE_LIMIT_KEYS: Gauge =
        register_gauge!("bucks2bar_rate_limit_keys", "Clients currently tracked by the rate limiter").unwrap();
}

// registers every metric up front so /metrics lists them before the first request
pub fn init() {
    lazy_static::initialize(&REQUEST_TOTAL);
    lazy_static::initialize(&RATE_LIMITED);
    lazy_static::initialize(&EMAILS_SENT);
    lazy_static::initialize(&EMAIL_FAILURES);
    lazy_static::initialize(&REQUEST_LATENCY);
    lazy_static::initialize(&RATE_LIMIT_KEYS);
}
