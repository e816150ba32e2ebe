//! 具体目标实现

pub mod datadog;
pub mod facebook;
pub mod matrix;
pub mod mattermost;
pub mod msteams;
pub mod slack;
pub mod webhook;

pub use datadog::{DatadogConfig, DatadogDestination};
pub use facebook::{FacebookConfig, FacebookDestination};
pub use matrix::{MatrixConfig, MatrixDestination};
pub use mattermost::{MattermostConfig, MattermostDestination};
pub use msteams::{MsTeamsConfig, MsTeamsDestination};
pub use slack::{SlackConfig, SlackDestination};
pub use webhook::{WebhookConfig, WebhookDestination};

use reqwest::header::CONTENT_TYPE;
use reqwest::RequestBuilder;
use serde::Serialize;

use super::error::SendError;
use crate::config::ConfigError;

/// 以 JSON 发送请求体，非 2xx 视为失败
pub(crate) async fn post_json<T: Serialize + ?Sized>(
    destination: &str,
    request: RequestBuilder,
    body: &T,
) -> Result<(), SendError> {
    let body = serde_json::to_vec(body)?;
    let response = request
        .header(CONTENT_TYPE, "application/json")
        .body(body)
        .send()
        .await?;

    SendError::check_status(destination, &response)
}

/// 解析配置中的 URL
pub(crate) fn parse_url(key: &str, raw: &str) -> Result<url::Url, ConfigError> {
    url::Url::parse(raw).map_err(|source| ConfigError::InvalidUrl {
        key: key.to_uppercase(),
        source,
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::config::FormatterSettings;
    use crate::event::Event;
    use crate::notification::destination::MarkupStyle;
    use crate::notification::formatter::Formatter;
    use crate::notification::message::Message;

    pub const SYNC: &str = include_str!("../../../tests/fixtures/sync.json");

    /// 用目标自己的标记风格渲染 sync 事件
    pub fn sync_message<M: MarkupStyle>(style: &M) -> Message {
        let formatter = Formatter::new(&FormatterSettings::new("https://github.com")).unwrap();
        formatter.format_event(&Event::from_json(SYNC).unwrap(), style)
    }

    pub fn client() -> reqwest::Client {
        reqwest::Client::new()
    }
}
