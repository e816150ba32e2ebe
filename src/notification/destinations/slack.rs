//! Slack 目标（incoming webhook，按频道寻址）

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::post_json;
use crate::config::{Config, ConfigError};
use crate::notification::destination::{Destination, MarkupStyle};
use crate::notification::error::SendError;
use crate::notification::message::Message;
use crate::notification::router::ChannelRouter;

/// 附件颜色
pub const ATTACHMENT_COLOR: &str = "#4286f4";

pub const DEFAULT_USERNAME: &str = "Flux Deployer";
pub const DEFAULT_ICON_EMOJI: &str = ":star-struck:";

/// Slack 附件，Mattermost 共用
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attachment {
    pub color: String,
    pub title: String,
    pub title_link: String,
    pub text: String,
}

impl Attachment {
    pub fn from_message(message: &Message) -> Self {
        Self {
            color: ATTACHMENT_COLOR.to_string(),
            title: message.title.clone(),
            title_link: message.title_link.clone(),
            text: message.body.clone(),
        }
    }
}

/// 发往 Slack 的消息
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlackMessage {
    pub channel: String,
    pub icon_emoji: String,
    pub username: String,
    pub attachments: Vec<Attachment>,
}

/// Slack 目标配置
#[derive(Debug, Clone)]
pub struct SlackConfig {
    /// Webhook URL
    pub url: String,
    /// 频道映射
    pub channels: ChannelRouter,
    /// 可选的 Bearer token
    pub token: Option<String>,
    pub username: String,
    pub icon_emoji: String,
}

impl SlackConfig {
    pub fn from_config(config: &dyn Config) -> Result<Self, ConfigError> {
        let url = config.required("slack_url")?;
        let channels = ChannelRouter::parse(&config.required("slack_channel")?)?;
        let token = Some(config.optional("slack_token", "")).filter(|t| !t.is_empty());

        Ok(Self {
            url,
            channels,
            token,
            username: config.optional("slack_username", DEFAULT_USERNAME),
            icon_emoji: config.optional("slack_icon_emoji", DEFAULT_ICON_EMOJI),
        })
    }
}

/// Slack 目标
pub struct SlackDestination {
    client: Client,
    config: SlackConfig,
}

impl SlackDestination {
    pub fn new(client: Client, config: SlackConfig) -> Self {
        Self { client, config }
    }

    /// 为某个频道构造消息
    pub fn build_message(&self, message: &Message, channel: &str) -> SlackMessage {
        SlackMessage {
            channel: channel.to_string(),
            icon_emoji: self.config.icon_emoji.clone(),
            username: self.config.username.clone(),
            attachments: vec![Attachment::from_message(message)],
        }
    }
}

impl MarkupStyle for SlackDestination {}

#[async_trait]
impl Destination for SlackDestination {
    fn name(&self) -> &str {
        "Slack"
    }

    fn channel_router(&self) -> Option<&ChannelRouter> {
        Some(&self.config.channels)
    }

    async fn send(&self, message: &Message, channel: Option<&str>) -> Result<(), SendError> {
        let payload = self.build_message(message, channel.unwrap_or_default());

        let mut request = self.client.post(&self.config.url);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        post_json(self.name(), request, &payload).await
    }
}
