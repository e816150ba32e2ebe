//! 通知系统构建器 - 根据配置创建分发器和目标

use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::destination::Destination;
use super::destinations::{
    DatadogConfig, DatadogDestination, FacebookConfig, FacebookDestination, MatrixConfig,
    MatrixDestination, MattermostConfig, MattermostDestination, MsTeamsConfig, MsTeamsDestination,
    SlackConfig, SlackDestination, WebhookConfig, WebhookDestination,
};
use super::dispatcher::Dispatcher;
use super::formatter::Formatter;
use crate::config::{Config, ConfigError, Settings};

/// 出站请求超时
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

/// 支持的目标类型
pub const DESTINATION_TYPES: &[&str] = &[
    "slack",
    "mattermost",
    "msteams",
    "matrix",
    "webhook",
    "datadog",
    "facebook",
];

/// 创建所有目标共享的 HTTP 客户端
pub fn http_client() -> Result<Client, ConfigError> {
    Ok(Client::builder().timeout(HTTP_TIMEOUT).build()?)
}

/// 分发器构建器
///
/// 任何配置错误都会让构建失败，不会以部分配置启动。
pub struct DispatcherBuilder<'a> {
    config: &'a dyn Config,
    dry_run: bool,
    client: Option<Client>,
}

impl<'a> DispatcherBuilder<'a> {
    pub fn new(config: &'a dyn Config) -> Self {
        Self {
            config,
            dry_run: false,
            client: None,
        }
    }

    /// 设置 dry-run 模式
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// 使用自定义 HTTP 客户端
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// 从配置读取 [`Settings`] 并构建
    pub fn build(self) -> Result<Dispatcher, ConfigError> {
        let settings = Settings::from_config(self.config)?;
        self.build_with(&settings)
    }

    /// 使用已解析的 [`Settings`] 构建
    pub fn build_with(self, settings: &Settings) -> Result<Dispatcher, ConfigError> {
        let client = match self.client {
            Some(client) => client,
            None => http_client()?,
        };

        let formatter = Formatter::new(&settings.formatter)?;
        let mut dispatcher = Dispatcher::new(formatter).with_dry_run(self.dry_run);

        for kind in &settings.exporters {
            let destination = create_destination(kind, self.config, client.clone())?;
            info!(destination = destination.name(), kind = %kind, "Configured destination");
            dispatcher.register_destination(destination);
        }

        Ok(dispatcher)
    }
}

/// 按类型创建目标
pub fn create_destination(
    kind: &str,
    config: &dyn Config,
    client: Client,
) -> Result<Arc<dyn Destination>, ConfigError> {
    let destination: Arc<dyn Destination> = match kind {
        "slack" => Arc::new(SlackDestination::new(client, SlackConfig::from_config(config)?)),
        "mattermost" => Arc::new(MattermostDestination::new(
            client,
            MattermostConfig::from_config(config)?,
        )),
        "msteams" => Arc::new(MsTeamsDestination::new(client, MsTeamsConfig::from_config(config)?)),
        "matrix" => Arc::new(MatrixDestination::new(client, &MatrixConfig::from_config(config)?)?),
        "webhook" => Arc::new(WebhookDestination::new(client, WebhookConfig::from_config(config)?)),
        "datadog" => Arc::new(DatadogDestination::new(client, DatadogConfig::from_config(config)?)?),
        "facebook" => Arc::new(FacebookDestination::new(
            client,
            FacebookConfig::from_config(config)?,
        )?),
        other => return Err(ConfigError::UnknownExporter(other.to_string())),
    };

    Ok(destination)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapConfig;

    fn base_config() -> MapConfig {
        MapConfig::new().with("github_url", "https://github.com/org/repo")
    }

    #[test]
    fn test_build_default_slack() {
        let config = base_config()
            .with("slack_url", "https://hooks.slack.com/services/x")
            .with("slack_channel", "#deploys");
        let dispatcher = DispatcherBuilder::new(&config).build().unwrap();

        assert_eq!(dispatcher.destination_names(), vec!["Slack"]);
        assert!(!dispatcher.is_dry_run());
        assert_eq!(dispatcher.formatter().vcs_link(), "https://github.com/org/repo");
    }

    #[test]
    fn test_build_every_destination_type() {
        let config = base_config()
            .with("exporter_type", DESTINATION_TYPES.join(","))
            .with("slack_url", "https://hooks.slack.com/services/x")
            .with("slack_channel", "#deploys")
            .with("mattermost_url", "https://chat.example.com/hooks/x")
            .with("mattermost_channel", "town-square=*")
            .with("msteams_url", "https://outlook.office.com/webhook/x")
            .with("matrix_url", "https://matrix.example.org")
            .with("matrix_token", "token")
            .with("matrix_room_id", "!room:example.org")
            .with("webhook_url", "https://example.com/flux")
            .with("datadog_api_key", "api")
            .with("datadog_app_key", "app")
            .with("facebook_thread_key", "t_1")
            .with("facebook_access_token", "secret");

        let dispatcher = DispatcherBuilder::new(&config).dry_run(true).build().unwrap();

        assert!(dispatcher.is_dry_run());
        assert_eq!(
            dispatcher.destination_names(),
            vec![
                "Slack",
                "Mattermost",
                "MS Teams",
                "Matrix",
                "Webhook",
                "Datadog Events",
                "Facebook"
            ]
        );
    }

    #[test]
    fn test_unknown_destination_type() {
        let config = base_config().with("exporter_type", "pager");
        let err = DispatcherBuilder::new(&config).build().err().unwrap();
        assert!(matches!(err, ConfigError::UnknownExporter(kind) if kind == "pager"));
    }

    #[test]
    fn test_missing_destination_setting() {
        let config = base_config().with("exporter_type", "webhook");
        let err = DispatcherBuilder::new(&config).build().err().unwrap();
        assert_eq!(err.to_string(), "required setting WEBHOOK_URL not set");
    }

    #[test]
    fn test_malformed_channel_mapping_fails_build() {
        let config = base_config()
            .with("slack_url", "https://hooks.slack.com/services/x")
            .with("slack_channel", "#bad channel=!!");
        let err = DispatcherBuilder::new(&config).build().err().unwrap();
        assert!(matches!(err, ConfigError::InvalidChannelMapping(_)));
    }

    #[test]
    fn test_malformed_template_fails_build() {
        let config = base_config()
            .with("exporter_type", "webhook")
            .with("webhook_url", "https://example.com/flux")
            .with("body_template", "{% for x in %}");
        let err = DispatcherBuilder::new(&config).build().err().unwrap();
        assert!(matches!(err, ConfigError::InvalidTemplate { name: "body", .. }));
    }
}
