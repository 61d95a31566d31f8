//! Outbound mail.
//!
//! [`MailTransport`] splits the transport contract in two: `verify` is called
//! once at startup and only logged, `send_mail` is called per request and its
//! failure always reaches the caller. [`SmtpMailer`] implements it over
//! lettre's async SMTP transport.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;

use crate::config::SmtpSettings;

pub const CHART_SUBJECT: &str = "Your Bucks2Bar chart";
pub const CHART_BODY: &str = "Attached is your chart image.";
pub const PNG_CONTENT_TYPE: &str = "image/png";

// implicit TLS port; anything else upgrades with STARTTLS
const SMTPS_PORT: u16 = 465;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid email address: {0}")]
    InvalidAddress(String),

    #[error("failed to build message: {0}")]
    Build(String),

    #[error("failed to configure transport: {0}")]
    Transport(String),

    #[error("SMTP error: {0}")]
    Smtp(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MailAttachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachment: MailAttachment,
}

impl OutgoingMail {
    /// The fixed chart email: one PNG attachment, fixed subject and body.
    pub fn chart(from: &str, to: &str, filename: String, png: Vec<u8>) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            subject: CHART_SUBJECT.to_string(),
            body: CHART_BODY.to_string(),
            attachment: MailAttachment {
                filename,
                content_type: PNG_CONTENT_TYPE.to_string(),
                data: png,
            },
        }
    }

    fn to_message(&self) -> Result<Message, MailError> {
        let from: Mailbox = self
            .from
            .parse()
            .map_err(|_| MailError::InvalidAddress(self.from.clone()))?;
        let to: Mailbox = self
            .to
            .parse()
            .map_err(|_| MailError::InvalidAddress(self.to.clone()))?;
        let content_type = ContentType::parse(&self.attachment.content_type)
            .map_err(|e| MailError::Build(e.to_string()))?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(self.subject.clone())
            .multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(self.body.clone()))
                    .singlepart(
                        Attachment::new(self.attachment.filename.clone())
                            .body(self.attachment.data.clone(), content_type),
                    ),
            )
            .map_err(|e| MailError::Build(e.to_string()))
    }
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Checks that the relay is reachable and accepts our credentials.
    async fn verify(&self) -> Result<(), MailError>;

    async fn send_mail(&self, mail: OutgoingMail) -> Result<(), MailError>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(settings: &SmtpSettings) -> Result<Self, MailError> {
        let params = TlsParameters::new(settings.host.clone())
            .map_err(|e| MailError::Transport(e.to_string()))?;
        let tls = match (settings.secure, settings.port) {
            (true, SMTPS_PORT) => Tls::Wrapper(params),
            (true, _) => Tls::Required(params),
            (false, _) => Tls::Opportunistic(params),
        };

        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(settings.host.as_str())
                .port(settings.port)
                .tls(tls)
                .timeout(Some(settings.timeout));

        if let Some((user, pass)) = &settings.credentials {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            transport: builder.build(),
        })
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn verify(&self) -> Result<(), MailError> {
        match self.transport.test_connection().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(MailError::Smtp("server did not accept connection".into())),
            Err(e) => Err(MailError::Smtp(e.to_string())),
        }
    }

    async fn send_mail(&self, mail: OutgoingMail) -> Result<(), MailError> {
        let message = mail.to_message()?;
        self.transport
            .send(message)
            .await
            .map(|_| ())
            .map_err(|e| MailError::Smtp(e.to_string()))
    }
}
