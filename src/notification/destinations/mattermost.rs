//! Mattermost 目标（兼容 Slack 格式的 incoming webhook）

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::post_json;
use super::slack::{Attachment, DEFAULT_USERNAME};
use crate::config::{Config, ConfigError};
use crate::notification::destination::{Destination, MarkupStyle};
use crate::notification::error::SendError;
use crate::notification::message::Message;
use crate::notification::router::ChannelRouter;

/// 默认头像（Flux logo）
pub const DEFAULT_ICON_URL: &str =
    "https://user-images.githubusercontent.com/27962005/35868977-0d5f85f6-0b2c-11e8-9fa8-8e4eaf35161a.png";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MattermostMessage {
    pub channel: String,
    pub username: String,
    pub icon_url: String,
    pub attachments: Vec<Attachment>,
}

/// Mattermost 目标配置
#[derive(Debug, Clone)]
pub struct MattermostConfig {
    pub url: String,
    pub channels: ChannelRouter,
    pub username: String,
    pub icon_url: String,
}

impl MattermostConfig {
    pub fn from_config(config: &dyn Config) -> Result<Self, ConfigError> {
        Ok(Self {
            url: config.required("mattermost_url")?,
            channels: ChannelRouter::parse(&config.required("mattermost_channel")?)?,
            username: config.optional("mattermost_username", DEFAULT_USERNAME),
            icon_url: config.optional("mattermost_icon_url", DEFAULT_ICON_URL),
        })
    }
}

pub struct MattermostDestination {
    client: Client,
    config: MattermostConfig,
}

impl MattermostDestination {
    pub fn new(client: Client, config: MattermostConfig) -> Self {
        Self { client, config }
    }

    pub fn build_message(&self, message: &Message, channel: &str) -> MattermostMessage {
        MattermostMessage {
            channel: channel.to_string(),
            username: self.config.username.clone(),
            icon_url: self.config.icon_url.clone(),
            attachments: vec![Attachment::from_message(message)],
        }
    }
}

impl MarkupStyle for MattermostDestination {}

#[async_trait]
impl Destination for MattermostDestination {
    fn name(&self) -> &str {
        "Mattermost"
    }

    fn channel_router(&self) -> Option<&ChannelRouter> {
        Some(&self.config.channels)
    }

    async fn send(&self, message: &Message, channel: Option<&str>) -> Result<(), SendError> {
        let payload = self.build_message(message, channel.unwrap_or_default());
        post_json(self.name(), self.client.post(&self.config.url), &payload).await
    }
}
