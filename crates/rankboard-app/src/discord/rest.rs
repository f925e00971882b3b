// Discord REST client: leaderboard pages in one channel, interaction
// responses and slash-command registration.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rankboard_core::error::PublishError;
use rankboard_core::reconcile::{MessageId, PageSink, RenderedPage};
use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::embed::EmbedStyle;
use super::gateway::Interaction;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const API_BASE: &str = "https://discord.com/api/v10/";

/// Interaction callback type: deferred channel message with source.
const DEFERRED_CHANNEL_MESSAGE: u8 = 5;
/// Message flag: only the invoking user sees the reply.
pub const EPHEMERAL_FLAG: u64 = 1 << 6;

const MAX_RATE_LIMIT_RETRIES: u32 = 3;
const MAX_RETRY_AFTER: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Interaction responses
// ---------------------------------------------------------------------------

/// Slash-command side of the REST API.
#[async_trait]
pub trait InteractionApi: Send + Sync {
    /// Acknowledge the interaction with a private "thinking" state.
    async fn defer_ephemeral(&self, interaction: &Interaction) -> Result<(), PublishError>;

    /// Replace the deferred reply with `content`.
    async fn edit_reply(&self, interaction: &Interaction, content: &str) -> Result<(), PublishError>;

    /// Bulk-overwrite the global slash commands of `application_id`.
    async fn register_commands(&self, application_id: &str, commands: &Value) -> Result<(), PublishError>;
}

// ---------------------------------------------------------------------------
// DiscordRest
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CreatedMessage {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RateLimited {
    retry_after: f64,
}

pub struct DiscordRest {
    http: reqwest::Client,
    base: Url,
    token: String,
    channel_id: String,
    style: EmbedStyle,
}

impl DiscordRest {
    pub fn new(token: String, channel_id: String, style: EmbedStyle) -> Result<Self, PublishError> {
        let base = Url::parse(API_BASE).map_err(|e| PublishError::Transport(e.to_string()))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent(concat!("DiscordBot (rankboard, ", env!("CARGO_PKG_VERSION"), ")"))
            .build()
            .map_err(|e| PublishError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base,
            token,
            channel_id,
            style,
        })
    }

    /// Send every request to `base` instead of the Discord API.
    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    fn url(&self, segments: &[&str]) -> Result<Url, PublishError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| PublishError::Transport(format!("cannot build path on {}", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send a request, retrying on 429 after the advertised delay. Returns
    /// the final status and body; non-429 statuses are left to the caller.
    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
        authorized: bool,
    ) -> Result<(StatusCode, String), PublishError> {
        let mut attempt = 0;
        loop {
            let mut request = self.http.request(method.clone(), url.clone());
            if authorized {
                request = request.header("Authorization", format!("Bot {}", self.token));
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request
                .send()
                .await
                .map_err(|e| PublishError::Transport(e.to_string()))?;
            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|e| PublishError::Transport(e.to_string()))?;

            if status == StatusCode::TOO_MANY_REQUESTS && attempt < MAX_RATE_LIMIT_RETRIES {
                attempt += 1;
                let wait = retry_after(&text).min(MAX_RETRY_AFTER);
                warn!("Rate limited on {method} {url}, retrying in {wait:?}");
                tokio::time::sleep(wait).await;
                continue;
            }
            return Ok((status, text));
        }
    }
}

/// Seconds to wait from a 429 body; one second when absent.
fn retry_after(body: &str) -> Duration {
    serde_json::from_str::<RateLimited>(body)
        .ok()
        .filter(|r| r.retry_after.is_finite() && r.retry_after >= 0.0)
        .map_or(Duration::from_secs(1), |r| Duration::from_secs_f64(r.retry_after))
}

fn expect_success(status: StatusCode, body: String) -> Result<String, PublishError> {
    if status.is_success() {
        Ok(body)
    } else {
        Err(PublishError::Rejected {
            status: status.as_u16(),
            message: body,
        })
    }
}

#[async_trait]
impl PageSink for DiscordRest {
    async fn update_page(&self, id: &MessageId, page: &RenderedPage) -> Result<(), PublishError> {
        let url = self.url(&["channels", &self.channel_id, "messages", id.as_str()])?;
        let body = self.style.message(page, Utc::now());
        let (status, text) = self.send(Method::PATCH, url, Some(&body), true).await?;
        if status == StatusCode::NOT_FOUND {
            return Err(PublishError::Missing(id.clone()));
        }
        expect_success(status, text)?;
        debug!(%id, page = page.number, "edited leaderboard message");
        Ok(())
    }

    async fn create_page(&self, page: &RenderedPage) -> Result<MessageId, PublishError> {
        let url = self.url(&["channels", &self.channel_id, "messages"])?;
        let body = self.style.message(page, Utc::now());
        let (status, text) = self.send(Method::POST, url, Some(&body), true).await?;
        let text = expect_success(status, text)?;
        let created: CreatedMessage = serde_json::from_str(&text)
            .map_err(|e| PublishError::Transport(format!("unexpected create response: {e}")))?;
        debug!(id = %created.id, page = page.number, "posted leaderboard message");
        Ok(MessageId::new(created.id))
    }

    async fn delete_page(&self, id: &MessageId) -> Result<(), PublishError> {
        let url = self.url(&["channels", &self.channel_id, "messages", id.as_str()])?;
        let (status, text) = self.send(Method::DELETE, url, None, true).await?;
        if status == StatusCode::NOT_FOUND {
            return Err(PublishError::Missing(id.clone()));
        }
        expect_success(status, text)?;
        Ok(())
    }
}

#[async_trait]
impl InteractionApi for DiscordRest {
    async fn defer_ephemeral(&self, interaction: &Interaction) -> Result<(), PublishError> {
        let url = self.url(&["interactions", &interaction.id, &interaction.token, "callback"])?;
        let body = json!({
            "type": DEFERRED_CHANNEL_MESSAGE,
            "data": { "flags": EPHEMERAL_FLAG },
        });
        // Interaction endpoints authenticate through the token in the path.
        let (status, text) = self.send(Method::POST, url, Some(&body), false).await?;
        expect_success(status, text)?;
        Ok(())
    }

    async fn edit_reply(&self, interaction: &Interaction, content: &str) -> Result<(), PublishError> {
        let url = self.url(&[
            "webhooks",
            &interaction.application_id,
            &interaction.token,
            "messages",
            "@original",
        ])?;
        let body = json!({ "content": content });
        let (status, text) = self.send(Method::PATCH, url, Some(&body), false).await?;
        expect_success(status, text)?;
        Ok(())
    }

    async fn register_commands(&self, application_id: &str, commands: &Value) -> Result<(), PublishError> {
        let url = self.url(&["applications", application_id, "commands"])?;
        let (status, body) = self.send(Method::PUT, url, Some(commands), true).await?;
        expect_success(status, body)?;
        info!("Registered slash commands for application {application_id}");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
