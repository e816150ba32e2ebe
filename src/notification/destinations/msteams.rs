//! Microsoft Teams 目标（MessageCard webhook）

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::post_json;
use crate::config::{Config, ConfigError};
use crate::notification::destination::{Destination, MarkupStyle};
use crate::notification::error::SendError;
use crate::notification::message::Message;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageCard {
    #[serde(rename = "@context")]
    pub context: String,
    #[serde(rename = "@type")]
    pub card_type: String,
    #[serde(rename = "themeColor")]
    pub theme_color: String,
    pub title: String,
    pub text: String,
    #[serde(rename = "potentialAction")]
    pub potential_action: Vec<CardAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardAction {
    #[serde(rename = "@type")]
    pub action_type: String,
    pub name: String,
    pub targets: Vec<ActionTarget>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionTarget {
    pub os: String,
    pub uri: String,
}

#[derive(Debug, Clone)]
pub struct MsTeamsConfig {
    pub url: String,
}

impl MsTeamsConfig {
    pub fn from_config(config: &dyn Config) -> Result<Self, ConfigError> {
        Ok(Self {
            url: config.required("msteams_url")?,
        })
    }
}

pub struct MsTeamsDestination {
    client: Client,
    config: MsTeamsConfig,
}

impl MsTeamsDestination {
    pub fn new(client: Client, config: MsTeamsConfig) -> Self {
        Self { client, config }
    }

    pub fn build_card(message: &Message) -> MessageCard {
        MessageCard {
            context: "https://schema.org/extensions".to_string(),
            card_type: "MessageCard".to_string(),
            theme_color: "4286f4".to_string(),
            title: message.title.clone(),
            text: message.body.clone(),
            potential_action: vec![CardAction {
                action_type: "OpenUri".to_string(),
                name: "Open related GIT repository".to_string(),
                targets: vec![ActionTarget {
                    os: "default".to_string(),
                    uri: message.title_link.clone(),
                }],
            }],
        }
    }
}

impl MarkupStyle for MsTeamsDestination {
    fn format_link(&self, url: &str, label: &str) -> String {
        format!("[{}]({})", label, url)
    }
}

#[async_trait]
impl Destination for MsTeamsDestination {
    fn name(&self) -> &str {
        "MS Teams"
    }

    async fn send(&self, message: &Message, _channel: Option<&str>) -> Result<(), SendError> {
        let card = Self::build_card(message);
        post_json(self.name(), self.client.post(&self.config.url), &card).await
    }
}
