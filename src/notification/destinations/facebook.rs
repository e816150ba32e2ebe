//! Facebook Workplace 目标（Graph API 群聊消息）

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use url::Url;

use super::{parse_url, post_json};
use crate::config::{Config, ConfigError};
use crate::notification::destination::{Destination, MarkupStyle};
use crate::notification::error::SendError;
use crate::notification::message::Message;

pub const DEFAULT_BASE_URL: &str = "https://graph.facebook.com/v5.0/me/messages";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacebookMessage {
    pub recipient: Recipient,
    pub message: Text,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recipient {
    pub thread_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Text {
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct FacebookConfig {
    pub thread_key: String,
    pub access_token: String,
    pub base_url: String,
}

impl FacebookConfig {
    pub fn from_config(config: &dyn Config) -> Result<Self, ConfigError> {
        Ok(Self {
            thread_key: config.required("facebook_thread_key")?,
            access_token: config.required("facebook_access_token")?,
            base_url: config.optional("facebook_base_url", DEFAULT_BASE_URL),
        })
    }
}

pub struct FacebookDestination {
    client: Client,
    url: Url,
    thread_key: String,
}

impl FacebookDestination {
    pub fn new(client: Client, config: FacebookConfig) -> Result<Self, ConfigError> {
        let mut url = parse_url("facebook_base_url", &config.base_url)?;
        url.query_pairs_mut()
            .append_pair("access_token", &config.access_token);

        Ok(Self {
            client,
            url,
            thread_key: config.thread_key,
        })
    }
}

impl MarkupStyle for FacebookDestination {
    /// Workplace 不支持链接标记，只保留 URL
    fn format_link(&self, url: &str, _label: &str) -> String {
        url.to_string()
    }
}

#[async_trait]
impl Destination for FacebookDestination {
    fn name(&self) -> &str {
        "Facebook"
    }

    async fn send(&self, message: &Message, _channel: Option<&str>) -> Result<(), SendError> {
        let payload = FacebookMessage {
            recipient: Recipient {
                thread_key: self.thread_key.clone(),
            },
            message: Text {
                text: message.body.clone(),
            },
        };
        post_json(self.name(), self.client.post(self.url.clone()), &payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapConfig;
    use crate::notification::destinations::test_support::{client, sync_message};
    use mockito::Matcher;
    use serde_json::json;

    fn config(base_url: &str) -> FacebookConfig {
        FacebookConfig::from_config(
            &MapConfig::new()
                .with("facebook_thread_key", "t_123")
                .with("facebook_access_token", "secret")
                .with("facebook_base_url", base_url),
        )
        .unwrap()
    }

    #[test]
    fn test_links_are_bare_urls() {
        let facebook = FacebookDestination::new(client(), config(DEFAULT_BASE_URL)).unwrap();
        let message = sync_message(&facebook);
        assert!(message.body.contains(
            "* https://github.com/commit/810c2e6f22ac5ab7c831fe0dd697fe32997b098f: change test image"
        ));
    }

    #[test]
    fn test_access_token_in_query() {
        let facebook = FacebookDestination::new(client(), config(DEFAULT_BASE_URL)).unwrap();
        assert_eq!(
            facebook.url.as_str(),
            "https://graph.facebook.com/v5.0/me/messages?access_token=secret"
        );

        assert!(matches!(
            FacebookDestination::new(client(), config("::nope")),
            Err(ConfigError::InvalidUrl { .. })
        ));
    }

    #[tokio::test]
    async fn test_send() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/me/messages")
            .match_query(Matcher::UrlEncoded("access_token".to_string(), "secret".to_string()))
            .match_body(Matcher::PartialJson(json!({
                "recipient": {"thread_key": "t_123"}
            })))
            .with_status(200)
            .create_async()
            .await;

        let facebook = FacebookDestination::new(client(), config(&format!("{}/me/messages", server.url()))).unwrap();
        facebook.send(&sync_message(&facebook), None).await.unwrap();

        mock.assert_async().await;
    }
}
