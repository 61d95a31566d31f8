use clap::{ArgAction, Args, Parser, Subcommand};
use lettre::message::Mailbox;
use std::time::Duration;

use crate::error::ConfigError;

// CLI argument structure
#[derive(Parser, Debug)]
#[command(name = "bucks2bar")]
#[command(about = "Income/expense chart composer and email relay")]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    // running without a subcommand starts the relay
    #[command(flatten)]
    pub serve: ServeArgs,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the email relay HTTP server
    Serve(ServeArgs),
    /// Render the income/expense chart, then save it or email it through the relay
    Compose(ComposeArgs),
    /// Check a username against the strength rules
    CheckUsername {
        value: String,
    },
}

// Relay settings. Every flag falls back to the environment variable of the same name.
#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    // Only this origin receives CORS headers
    #[arg(long, env = "ALLOWED_ORIGIN")]
    pub allowed_origin: Option<String>,

    // Rate limit window in milliseconds
    #[arg(long, env = "RATE_WINDOW_MS", default_value_t = 60_000)]
    pub rate_window_ms: u64,

    // Rate limit max requests per window per client
    #[arg(long, env = "RATE_MAX", default_value_t = 30)]
    pub rate_max: u32,

    // Required X-API-Key value when set
    #[arg(long, env = "SEND_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[arg(long, env = "SMTP_HOST")]
    pub smtp_host: Option<String>,

    #[arg(long, env = "SMTP_PORT", default_value_t = 587)]
    pub smtp_port: u16,

    // only the literal "true" turns it on
    #[arg(long, env = "SMTP_SECURE", default_value = "false", action = ArgAction::Set, value_parser = parse_secure)]
    pub smtp_secure: bool,

    #[arg(long, env = "SMTP_USER")]
    pub smtp_user: Option<String>,

    #[arg(long, env = "SMTP_PASS", hide_env_values = true)]
    pub smtp_pass: Option<String>,

    // SMTP I/O timeout in seconds
    #[arg(long, env = "SMTP_TIMEOUT_SECS", default_value_t = 30)]
    pub smtp_timeout_secs: u64,

    // Sender mailbox, e.g. "Bucks2Bar <charts@example.com>"
    #[arg(long, env = "EMAIL_FROM")]
    pub email_from: Option<String>,
}

fn parse_secure(value: &str) -> Result<bool, String> {
    Ok(value.trim().eq_ignore_ascii_case("true"))
}

#[derive(Args, Debug, Clone)]
pub struct ComposeArgs {
    // Twelve comma-separated income values, Jan..Dec
    #[arg(long, default_value = "")]
    pub income: String,

    // Twelve comma-separated expense values, Jan..Dec
    #[arg(long, default_value = "")]
    pub expenses: String,

    #[arg(long, default_value_t = 800)]
    pub width: u32,

    #[arg(long, default_value_t = 400)]
    pub height: u32,

    // Pixel density multiplier for crisp output
    #[arg(long, default_value_t = 1.0)]
    pub scale: f64,

    // Where to save the PNG when not sending
    #[arg(short, long, default_value = "bucks2bar-chart.png")]
    pub out: String,

    // Email the chart to this address instead of saving it
    #[arg(long)]
    pub send_to: Option<String>,

    #[arg(long, default_value = "http://localhost:3000")]
    pub relay_url: String,

    #[arg(long, default_value = "bucks2bar-chart.png")]
    pub filename: String,

    #[arg(long, env = "SEND_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
}

/// SMTP connection settings, present only when `SMTP_HOST` is configured.
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub secure: bool,
    pub credentials: Option<(String, String)>,
    pub timeout: Duration,
}

/// Validated relay configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub port: u16,
    pub allowed_origin: Option<String>,
    pub rate_window: Duration,
    pub rate_max: u32,
    pub api_key: Option<String>,
    pub smtp: Option<SmtpSettings>,
    pub email_from: Option<String>,
    pub limits: PayloadLimits,
}

/// Ceilings applied to the `data` field of a send request.
#[derive(Debug, Clone, Copy)]
pub struct PayloadLimits {
    pub max_encoded_bytes: usize,
    pub max_decoded_bytes: usize,
}

impl Default for PayloadLimits {
    fn default() -> Self {
        Self {
            max_encoded_bytes: 6 * 1024 * 1024,
            max_decoded_bytes: 5 * 1024 * 1024,
        }
    }
}

// blank env values count as unset
fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl RelayConfig {
    pub fn from_args(args: ServeArgs) -> Result<Self, ConfigError> {
        if args.rate_window_ms == 0 {
            return Err(ConfigError::Invalid {
                name: "RATE_WINDOW_MS",
                reason: "must be greater than zero".to_string(),
            });
        }
        if args.rate_max == 0 {
            return Err(ConfigError::Invalid {
                name: "RATE_MAX",
                reason: "must be greater than zero".to_string(),
            });
        }

        let allowed_origin = non_blank(args.allowed_origin);
        if let Some(origin) = &allowed_origin {
            if axum::http::HeaderValue::from_str(origin).is_err() {
                return Err(ConfigError::Invalid {
                    name: "ALLOWED_ORIGIN",
                    reason: format!("{origin:?} is not a valid header value"),
                });
            }
        }

        let email_from = non_blank(args.email_from);
        if let Some(from) = &email_from {
            from.parse::<Mailbox>().map_err(|e| ConfigError::Invalid {
                name: "EMAIL_FROM",
                reason: e.to_string(),
            })?;
        }

        let credentials = match (non_blank(args.smtp_user), non_blank(args.smtp_pass)) {
            (Some(user), Some(pass)) => Some((user, pass)),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("SMTP_PASS")),
            (None, Some(_)) => return Err(ConfigError::Missing("SMTP_USER")),
        };

        let smtp = non_blank(args.smtp_host).map(|host| SmtpSettings {
            host,
            port: args.smtp_port,
            secure: args.smtp_secure,
            credentials,
            timeout: Duration::from_secs(args.smtp_timeout_secs),
        });

        Ok(Self {
            port: args.port,
            allowed_origin,
            rate_window: Duration::from_millis(args.rate_window_ms),
            rate_max: args.rate_max,
            api_key: non_blank(args.api_key),
            smtp,
            email_from,
            limits: PayloadLimits::default(),
        })
    }
}

#[cfg(test)]
pub(crate) fn test_args() -> ServeArgs {
    ServeArgs {
        port: 3000,
        allowed_origin: None,
        rate_window_ms: 60_000,
        rate_max: 30,
        api_key: None,
        smtp_host: Some("smtp.example.com".to_string()),
        smtp_port: 587,
        smtp_secure: false,
        smtp_user: Some("mailer".to_string()),
        smtp_pass: Some("hunter2".to_string()),
        smtp_timeout_secs: 30,
        email_from: Some("Bucks2Bar <charts@example.com>".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_config_from_defaults() {
        let config = RelayConfig::from_args(test_args()).unwrap();
        assert_eq!(config.rate_window, Duration::from_millis(60_000));
        assert_eq!(config.rate_max, 30);
        let smtp = config.smtp.unwrap();
        assert_eq!(smtp.port, 587);
        assert_eq!(smtp.credentials, Some(("mailer".into(), "hunter2".into())));
        assert_eq!(config.limits.max_encoded_bytes, 6 * 1024 * 1024);
        assert_eq!(config.limits.max_decoded_bytes, 5 * 1024 * 1024);
    }

    #[test]
    fn configured_smtp_port_is_used() {
        let mut args = test_args();
        args.smtp_port = 2525;
        let config = RelayConfig::from_args(args).unwrap();
        assert_eq!(config.smtp.unwrap().port, 2525);
    }

    #[test]
    fn missing_sender_is_allowed_at_boot() {
        let mut args = test_args();
        args.email_from = Some("   ".to_string());
        let config = RelayConfig::from_args(args).unwrap();
        assert!(config.email_from.is_none());
    }

    #[test]
    fn rejects_malformed_sender() {
        let mut args = test_args();
        args.email_from = Some("not a mailbox".to_string());
        let err = RelayConfig::from_args(args).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "EMAIL_FROM", .. }));
    }

    #[test]
    fn user_without_password_fails() {
        let mut args = test_args();
        args.smtp_pass = None;
        let err = RelayConfig::from_args(args).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("SMTP_PASS")));
    }

    #[test]
    fn zero_rate_settings_fail() {
        let mut args = test_args();
        args.rate_max = 0;
        assert!(RelayConfig::from_args(args).is_err());

        let mut args = test_args();
        args.rate_window_ms = 0;
        assert!(RelayConfig::from_args(args).is_err());
    }

    #[test]
    fn secure_flag_only_accepts_true() {
        assert_eq!(parse_secure("true"), Ok(true));
        assert_eq!(parse_secure("TRUE"), Ok(true));
        assert_eq!(parse_secure("1"), Ok(false));
        assert_eq!(parse_secure("false"), Ok(false));
    }

    #[test]
    fn compose_subcommand_parses() {
        let cli = Cli::try_parse_from([
            "bucks2bar",
            "compose",
            "--income",
            "1,2,3",
            "--send-to",
            "a@b.com",
        ])
        .unwrap();
        match cli.command {
            Some(Command::Compose(args)) => {
                assert_eq!(args.income, "1,2,3");
                assert_eq!(args.send_to.as_deref(), Some("a@b.com"));
                assert_eq!(args.scale, 1.0);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
