//! Outbound notification ports.
//!
//! A user is processed only when at least one usable notification target
//! exists: a plausible email address on a non-disabled account, or a webhook
//! of an enabled integration type. The webhook sender posts a plain-text
//! digest of the run's change-sets; rendering is shared so every channel
//! reads the same normalized structure.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use crate::changes::RepositoryChangeSet;
use crate::setting::Setting;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Whether this user has any target a notification could be delivered to.
///
/// Email counts when the account is not disabled and the address looks like
/// one. A webhook counts when its type is an enabled integration and a URL
/// is set, regardless of the disabled flag (which gates email only).
pub fn has_notification_target(setting: &Setting, integrations: &[String]) -> bool {
    let user = &setting.user;

    let email = setting.notification_email();
    if !user.disabled && email.contains('@') {
        return true;
    }

    integrations.iter().any(|kind| kind == &user.webhook_type) && !user.webhook_url.is_empty()
}

/// A channel that can deliver one run's change-sets
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, sets: &[RepositoryChangeSet]) -> Result<()>;
}

/// Webhook sender posting a Slack-compatible `{"text": ...}` payload
pub struct SlackWebhook {
    url: String,
    http: reqwest::Client,
}

impl SlackWebhook {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("refwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create webhook HTTP client")?;

        Ok(Self {
            url: url.into(),
            http,
        })
    }
}

#[async_trait]
impl Notifier for SlackWebhook {
    async fn notify(&self, sets: &[RepositoryChangeSet]) -> Result<()> {
        let text = render_text(sets);
        if text.is_empty() {
            debug!("No changes to deliver, skipping webhook");
            return Ok(());
        }

        let response = self
            .http
            .post(&self.url)
            .json(&json!({ "text": text }))
            .send()
            .await
            .context("Webhook request failed")?;

        let status = response.status();
        if !status.is_success() {
            bail!("Webhook returned status {}", status);
        }

        info!("Delivered change digest via webhook");
        Ok(())
    }
}

/// Webhook sender for this user, if one is configured and its integration
/// type is enabled
pub fn webhook_for(setting: &Setting, integrations: &[String]) -> Result<Option<SlackWebhook>> {
    let user = &setting.user;
    if user.webhook_url.is_empty() || !integrations.iter().any(|kind| kind == &user.webhook_type) {
        return Ok(None);
    }
    Ok(Some(SlackWebhook::new(user.webhook_url.clone())?))
}

/// Plain-text digest of the changed portions of a run. Empty when nothing
/// changed.
pub fn render_text(sets: &[RepositoryChangeSet]) -> String {
    let mut out = String::new();

    for set in sets {
        if !set.changed {
            continue;
        }

        out.push_str(&format!("*{}* <{}>\n", set.repo.text, set.repo.href));
        for entry in &set.entries {
            // warnings ride along with the delivered change-set
            if let Some(error) = &entry.error {
                out.push_str(&format!(
                    "{}{} - {}\n",
                    entry.title.title, entry.title.text, error
                ));
                continue;
            }
            if !entry.changed {
                continue;
            }
            out.push_str(&format!("{}{}\n", entry.title.title, entry.title.text));
            for link in &entry.changes {
                out.push_str(&format!("  - {} <{}>\n", link.text, link.href));
            }
        }
        out.push('\n');
    }

    out.trim_end().to_string()
}
