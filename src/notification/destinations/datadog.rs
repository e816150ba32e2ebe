//! Datadog 事件目标 - 每个资源 ID 发送一个事件

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use url::Url;

use super::{parse_url, post_json};
use crate::config::{Config, ConfigError};
use crate::notification::destination::{Destination, MarkupStyle};
use crate::notification::error::SendError;
use crate::notification::message::Message;

pub const DEFAULT_API_URL: &str = "https://api.datadoghq.com";

/// Datadog 事件
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatadogEvent {
    pub title: String,
    pub text: String,
    pub tags: Vec<String>,
    pub source_type_name: String,
}

#[derive(Debug, Clone)]
pub struct DatadogConfig {
    pub api_key: String,
    pub app_key: String,
    /// 附加到每个事件的标签
    pub additional_tags: Vec<String>,
    pub url: String,
}

impl DatadogConfig {
    pub fn from_config(config: &dyn Config) -> Result<Self, ConfigError> {
        let additional_tags = config
            .optional("datadog_additional_tags", "")
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            api_key: config.required("datadog_api_key")?,
            app_key: config.required("datadog_app_key")?,
            additional_tags,
            url: config.optional("datadog_url", DEFAULT_API_URL),
        })
    }
}

pub struct DatadogDestination {
    client: Client,
    events_url: Url,
    config: DatadogConfig,
}

impl DatadogDestination {
    pub fn new(client: Client, config: DatadogConfig) -> Result<Self, ConfigError> {
        let mut events_url = parse_url("datadog_url", &config.url)?;
        events_url
            .path_segments_mut()
            .map_err(|_| ConfigError::InvalidUrl {
                key: "DATADOG_URL".to_string(),
                source: url::ParseError::RelativeUrlWithCannotBeABaseBase,
            })?
            .pop_if_empty()
            .extend(["api", "v1", "events"]);

        Ok(Self {
            client,
            events_url,
            config,
        })
    }

    /// 每个资源 ID 一个事件
    pub fn build_events(&self, message: &Message) -> Vec<DatadogEvent> {
        let Some(event) = &message.event else {
            return Vec::new();
        };

        event
            .service_ids
            .iter()
            .map(|id| {
                let (namespace, kind, name) = id.components();
                let mut tags = vec![
                    "application:flux".to_string(),
                    format!("fluxEventType:{}", event.event_type),
                    format!("fluxnamespace:{}", namespace),
                    format!("fluxkind:{}", kind),
                    format!("fluxresourcename:{}", name),
                ];
                tags.extend(self.config.additional_tags.iter().cloned());

                DatadogEvent {
                    title: message.title.clone(),
                    text: message.body.clone(),
                    tags,
                    source_type_name: "API".to_string(),
                }
            })
            .collect()
    }
}

impl MarkupStyle for DatadogDestination {}

#[async_trait]
impl Destination for DatadogDestination {
    fn name(&self) -> &str {
        "Datadog Events"
    }

    async fn send(&self, message: &Message, _channel: Option<&str>) -> Result<(), SendError> {
        for event in self.build_events(message) {
            let request = self
                .client
                .post(self.events_url.clone())
                .header("DD-API-KEY", &self.config.api_key)
                .header("DD-APPLICATION-KEY", &self.config.app_key);
            post_json(self.name(), request, &event).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapConfig;
    use crate::notification::destinations::test_support::{client, sync_message};
    use mockito::Matcher;
    use serde_json::json;

    fn config(url: &str) -> DatadogConfig {
        DatadogConfig::from_config(
            &MapConfig::new()
                .with("datadog_api_key", "api")
                .with("datadog_app_key", "app")
                .with("datadog_additional_tags", "env:prod, team:platform")
                .with("datadog_url", url),
        )
        .unwrap()
    }

    #[test]
    fn test_from_config_defaults() {
        let config = DatadogConfig::from_config(
            &MapConfig::new()
                .with("datadog_api_key", "api")
                .with("datadog_app_key", "app"),
        )
        .unwrap();
        assert_eq!(config.url, DEFAULT_API_URL);
        assert!(config.additional_tags.is_empty());

        let missing = MapConfig::new().with("datadog_api_key", "api");
        assert!(DatadogConfig::from_config(&missing).is_err());
    }

    #[test]
    fn test_build_events_tags() {
        let datadog = DatadogDestination::new(client(), config(DEFAULT_API_URL)).unwrap();
        let events = datadog.build_events(&sync_message(&datadog));

        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].tags,
            vec![
                "application:flux",
                "fluxEventType:sync",
                "fluxnamespace:default",
                "fluxkind:deployment",
                "fluxresourcename:test",
                "env:prod",
                "team:platform",
            ]
        );
        assert_eq!(events[0].source_type_name, "API");
        assert!(datadog.build_events(&Message::empty()).is_empty());
    }

    #[test]
    fn test_events_url_keeps_base_path() {
        let datadog = DatadogDestination::new(client(), config(DEFAULT_API_URL)).unwrap();
        assert_eq!(datadog.events_url.as_str(), "https://api.datadoghq.com/api/v1/events");

        for base in ["https://proxy.example.com/dd", "https://proxy.example.com/dd/"] {
            let datadog = DatadogDestination::new(client(), config(base)).unwrap();
            assert_eq!(
                datadog.events_url.as_str(),
                "https://proxy.example.com/dd/api/v1/events"
            );
        }

        assert!(matches!(
            DatadogDestination::new(client(), config("mailto:ops@example.com")),
            Err(ConfigError::InvalidUrl { .. })
        ));
    }

    #[tokio::test]
    async fn test_send_with_api_keys() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/events")
            .match_header("dd-api-key", "api")
            .match_header("dd-application-key", "app")
            .match_body(Matcher::PartialJson(json!({
                "title": "Applied flux changes to cluster",
                "source_type_name": "API"
            })))
            .with_status(202)
            .expect(1)
            .create_async()
            .await;

        let datadog = DatadogDestination::new(client(), config(&server.url())).unwrap();
        datadog.send(&sync_message(&datadog), None).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_stops_at_first_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v1/events")
            .with_status(403)
            .create_async()
            .await;

        let datadog = DatadogDestination::new(client(), config(&server.url())).unwrap();
        let err = datadog.send(&sync_message(&datadog), None).await.unwrap_err();
        assert!(matches!(err, SendError::Status { status: 403, .. }));
    }
}
