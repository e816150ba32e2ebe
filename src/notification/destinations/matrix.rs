//! Matrix 目标（client-server API 发送房间消息）

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use url::Url;

use super::{parse_url, post_json};
use crate::config::{Config, ConfigError};
use crate::notification::destination::{Destination, MarkupStyle};
use crate::notification::error::SendError;
use crate::notification::message::Message;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatrixMessage {
    pub msgtype: String,
    pub format: String,
    pub formatted_body: String,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct MatrixConfig {
    /// Homeserver 地址
    pub url: String,
    pub token: String,
    pub room_id: String,
}

impl MatrixConfig {
    pub fn from_config(config: &dyn Config) -> Result<Self, ConfigError> {
        Ok(Self {
            url: config.required("matrix_url")?,
            token: config.required("matrix_token")?,
            room_id: config.required("matrix_room_id")?,
        })
    }

    /// 房间消息发送地址，token 作为查询参数
    pub fn send_url(&self) -> Result<Url, ConfigError> {
        let mut url = parse_url("matrix_url", &self.url)?;

        let invalid = || ConfigError::InvalidUrl {
            key: "MATRIX_URL".to_string(),
            source: url::ParseError::RelativeUrlWithCannotBeABaseBase,
        };
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .extend(["_matrix", "client", "r0", "rooms", self.room_id.as_str(), "send", "m.room.message"]);
        url.query_pairs_mut().append_pair("access_token", &self.token);

        Ok(url)
    }
}

pub struct MatrixDestination {
    client: Client,
    url: Url,
}

impl MatrixDestination {
    pub fn new(client: Client, config: &MatrixConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            client,
            url: config.send_url()?,
        })
    }

    pub fn build_message(&self, message: &Message) -> MatrixMessage {
        MatrixMessage {
            msgtype: "m.text".to_string(),
            format: "org.matrix.custom.html".to_string(),
            formatted_body: format!(
                "{}{}{}",
                self.format_link(&message.title_link, &message.title),
                self.new_line(),
                message.body
            ),
            body: message.title.clone(),
        }
    }
}

impl MarkupStyle for MatrixDestination {
    fn new_line(&self) -> &str {
        "<br>"
    }

    fn format_link(&self, url: &str, label: &str) -> String {
        format!("<a href='{}'>{}</a>", url, label)
    }
}

#[async_trait]
impl Destination for MatrixDestination {
    fn name(&self) -> &str {
        "Matrix"
    }

    async fn send(&self, message: &Message, _channel: Option<&str>) -> Result<(), SendError> {
        let payload = self.build_message(message);
        post_json(self.name(), self.client.post(self.url.clone()), &payload).await
    }
}
