// src/platforms/helix.rs - Twitch Helix API as a stream status source

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::PollerConfig;
use crate::platforms::poller::{StreamStatus, StreamStatusSource};

#[derive(Debug, Deserialize)]
struct HelixResponse<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct HelixError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct HelixStream {
    #[serde(rename = "type", default)]
    stream_type: String,
    #[serde(default)]
    viewer_count: u32,
    #[serde(default)]
    title: String,
    #[serde(default)]
    game_name: String,
}

#[derive(Debug, Deserialize)]
struct HelixUser {
    id: String,
}

#[derive(Debug, Deserialize)]
struct HelixFollower {
    user_login: String,
}

pub struct HelixStatusSource {
    http_client: reqwest::Client,
    api_base: String,
    client_id: String,
    access_token: String,
    broadcaster_id: Mutex<Option<String>>,
}

impl HelixStatusSource {
    /// `oauth_token` may carry the IRC-style `oauth:` prefix
    pub fn new(config: &PollerConfig, oauth_token: &str) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            access_token: oauth_token.trim_start_matches("oauth:").to_string(),
            broadcaster_id: Mutex::new(None),
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<HelixResponse<T>> {
        let url = format!("{}/{}", self.api_base, path);
        debug!(target: "poller", "GET {}", url);

        let response = self
            .http_client
            .get(&url)
            .header("Client-Id", &self.client_id)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .context("Failed to reach Twitch Helix API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow::anyhow!("Helix API error {}: {}", status, error_message(&error_text)));
        }

        response.json().await.context("Failed to parse Helix response")
    }

    async fn broadcaster_id(&self, channel: &str) -> Result<String> {
        let cached = self.broadcaster_id.lock().clone();
        if let Some(id) = cached {
            return Ok(id);
        }

        let users: HelixResponse<HelixUser> = self
            .get(&format!("users?login={}", urlencoding::encode(channel)))
            .await?;
        let id = users
            .data
            .into_iter()
            .next()
            .map(|user| user.id)
            .with_context(|| format!("No Twitch user named {}", channel))?;

        *self.broadcaster_id.lock() = Some(id.clone());
        Ok(id)
    }
}

#[async_trait]
impl StreamStatusSource for HelixStatusSource {
    async fn fetch_status(&self, channel: &str) -> Result<StreamStatus> {
        let streams: HelixResponse<HelixStream> = self
            .get(&format!("streams?user_login={}", urlencoding::encode(channel)))
            .await?;
        Ok(stream_status(streams.data.into_iter().next()))
    }

    async fn fetch_followers(&self, channel: &str) -> Result<Vec<String>> {
        let id = self.broadcaster_id(channel).await?;
        let followers: HelixResponse<HelixFollower> = self
            .get(&format!("channels/followers?broadcaster_id={}&first=100", urlencoding::encode(&id)))
            .await?;
        Ok(followers.data.into_iter().map(|f| f.user_login).collect())
    }
}

/// Helix errors carry a JSON body with a `message`; fall back to the raw text
fn error_message(body: &str) -> String {
    match serde_json::from_str::<HelixError>(body) {
        Ok(error) if !error.message.is_empty() => error.message,
        _ => body.to_string(),
    }
}

/// An absent stream entry means offline
fn stream_status(stream: Option<HelixStream>) -> StreamStatus {
    match stream {
        Some(stream) if stream.stream_type == "live" => StreamStatus {
            live: true,
            viewers: stream.viewer_count,
            title: stream.title,
            game: stream.game_name,
        },
        _ => StreamStatus::default(),
    }
}
