//! 通用 Webhook 目标 - 直接 POST 消息 JSON

use async_trait::async_trait;
use reqwest::Client;

use super::post_json;
use crate::config::{Config, ConfigError};
use crate::notification::destination::{Destination, MarkupStyle};
use crate::notification::error::SendError;
use crate::notification::message::Message;

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub url: String,
}

impl WebhookConfig {
    pub fn from_config(config: &dyn Config) -> Result<Self, ConfigError> {
        Ok(Self {
            url: config.required("webhook_url")?,
        })
    }
}

pub struct WebhookDestination {
    client: Client,
    config: WebhookConfig,
}

impl WebhookDestination {
    pub fn new(client: Client, config: WebhookConfig) -> Self {
        Self { client, config }
    }
}

impl MarkupStyle for WebhookDestination {}

#[async_trait]
impl Destination for WebhookDestination {
    fn name(&self) -> &str {
        "Webhook"
    }

    async fn send(&self, message: &Message, _channel: Option<&str>) -> Result<(), SendError> {
        post_json(self.name(), self.client.post(&self.config.url), message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::destinations::test_support::{client, sync_message};
    use mockito::Matcher;
    use serde_json::json;

    #[tokio::test]
    async fn test_posts_message_json() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/flux")
            .match_header("content-type", "application/json")
            .match_body(Matcher::PartialJson(json!({
                "TitleLink": "https://github.com/commit/810c2e6f22ac5ab7c831fe0dd697fe32997b098f",
                "Title": "Applied flux changes to cluster",
                "Type": "sync",
                "Event": {"serviceIDs": ["default:deployment/test"]}
            })))
            .with_status(200)
            .create_async()
            .await;

        let webhook = WebhookDestination::new(client(), WebhookConfig { url: format!("{}/flux", server.url()) });
        webhook.send(&sync_message(&webhook), None).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_accepts_any_2xx() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("POST", "/flux").with_status(204).create_async().await;

        let webhook = WebhookDestination::new(client(), WebhookConfig { url: format!("{}/flux", server.url()) });
        assert!(webhook.send(&sync_message(&webhook), None).await.is_ok());
    }

    #[tokio::test]
    async fn test_transport_error() {
        // 端口 1 上不会有服务
        let webhook = WebhookDestination::new(client(), WebhookConfig { url: "http://127.0.0.1:1/flux".to_string() });
        let err = webhook.send(&sync_message(&webhook), None).await.unwrap_err();
        assert!(matches!(err, SendError::Transport(_)));
    }
}
