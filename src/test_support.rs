use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::mailer::{MailError, MailTransport, OutgoingMail};

// 1x1 transparent PNG
pub const TINY_PNG: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

// In-memory transport: records successful sends, or fails every call with a fixed error
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingMail>>,
    calls: AtomicUsize,
    verifications: AtomicUsize,
    failure: Option<String>,
}

impl RecordingMailer {
    pub fn failing(reason: &str) -> Self {
        Self {
            failure: Some(reason.to_string()),
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn verifications(&self) -> usize {
        self.verifications.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MailTransport for RecordingMailer {
    async fn verify(&self) -> Result<(), MailError> {
        self.verifications.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(reason) => Err(MailError::Smtp(reason.clone())),
            None => Ok(()),
        }
    }

    async fn send_mail(&self, mail: OutgoingMail) -> Result<(), MailError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = &self.failure {
            return Err(MailError::Smtp(reason.clone()));
        }
        self.sent.lock().unwrap().push(mail);
        Ok(())
    }
}
