//! Outbound email for the daily digest.

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;

use crate::{config::MailConfig, models::Task};

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("mail API rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// Delivery contract used by the digest job.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_digest(&self, email: &str, username: &str, tasks: &[Task]) -> Result<(), MailError>;
}

pub fn digest_subject(tasks: &[Task]) -> String {
    match tasks.len() {
        1 => "You have 1 task due today".to_string(),
        n => format!("You have {n} tasks due today"),
    }
}

pub fn digest_body(username: &str, tasks: &[Task]) -> String {
    let mut body = format!("Hi {username},\n\nHere is what is due today:\n\n");
    for task in tasks {
        let due = task
            .deadline
            .map(|d| d.format("%H:%M UTC").to_string())
            .unwrap_or_default();
        body.push_str(&format!("- {} [{}, {}] {}\n", task.title, task.task_type, task.status, due));
        if let Some(description) = task.description.as_deref().filter(|d| !d.is_empty()) {
            body.push_str(&format!("    {description}\n"));
        }
    }
    body.push_str("\nGood luck!\n");
    body
}

/// Sends messages through an HTTP mail API that accepts a JSON envelope.
pub struct HttpMailer {
    config: MailConfig,
    client: reqwest::Client,
}

impl HttpMailer {
    pub fn new(config: MailConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send_digest(&self, email: &str, username: &str, tasks: &[Task]) -> Result<(), MailError> {
        let body = json!({
            "from": self.config.from,
            "to": [email],
            "subject": digest_subject(tasks),
            "text": digest_body(username, tasks),
        });

        let mut request = self.client.post(&self.config.api_url).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Rejected { status, body });
        }
        Ok(())
    }
}

/// Logs digests instead of sending them; used when no mail API is configured.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_digest(&self, email: &str, username: &str, tasks: &[Task]) -> Result<(), MailError> {
        tracing::info!(
            to = email,
            subject = %digest_subject(tasks),
            "digest (not sent, no mail API configured)\n{}",
            digest_body(username, tasks)
        );
        Ok(())
    }
}
