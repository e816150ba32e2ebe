//! Flux 事件模型
//!
//! 事件由上游以 JSON 推送，`metadata` 的结构取决于 `type`，
//! 解码时按类型分派到 [`EventMetadata`] 的对应变体。

pub mod metadata;
pub mod resource_id;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use metadata::{
    short_revision, AutoReleaseMetadata, Commit, CommitMetadata, ContainerUpdate, EventMetadata,
    ReleaseCause, ReleaseMetadata, ReleaseResult, ResourceError, SyncMetadata, WorkloadResult,
};
pub use resource_id::ResourceId;

/// 事件解码错误
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid event JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid resource id: {0:?}")]
    ResourceId(String),
    #[error("invalid metadata for {event_type} event: {source}")]
    Metadata {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },
}

/// 事件类型
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    Sync,
    Commit,
    Release,
    AutoRelease,
    Automate,
    Deautomate,
    Lock,
    Unlock,
    UpdatePolicy,
    Other(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            EventType::Sync => "sync",
            EventType::Commit => "commit",
            EventType::Release => "release",
            EventType::AutoRelease => "autorelease",
            EventType::Automate => "automate",
            EventType::Deautomate => "deautomate",
            EventType::Lock => "lock",
            EventType::Unlock => "unlock",
            EventType::UpdatePolicy => "update_policy",
            EventType::Other(name) => name,
        }
    }
}

impl From<String> for EventType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "sync" => EventType::Sync,
            "commit" => EventType::Commit,
            "release" => EventType::Release,
            "autorelease" => EventType::AutoRelease,
            "automate" => EventType::Automate,
            "deautomate" => EventType::Deautomate,
            "lock" => EventType::Lock,
            "unlock" => EventType::Unlock,
            "update_policy" | "update-policy" => EventType::UpdatePolicy,
            _ => EventType::Other(value),
        }
    }
}

impl From<EventType> for String {
    fn from(value: EventType) -> Self {
        match value {
            EventType::Other(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一次 CD 操作的事件记录，解码后不可变
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub id: i64,
    #[serde(rename = "serviceIDs")]
    pub service_ids: Vec<ResourceId>,
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(rename = "startedAt")]
    pub started_at: DateTime<Utc>,
    #[serde(rename = "endedAt")]
    pub ended_at: DateTime<Utc>,
    #[serde(rename = "logLevel")]
    pub log_level: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(skip_serializing_if = "EventMetadata::is_none")]
    pub metadata: EventMetadata,
}

/// 线上格式，metadata 延迟到知道类型后再解码
#[derive(Deserialize)]
struct WireEvent {
    #[serde(default)]
    id: i64,
    #[serde(rename = "serviceIDs", default)]
    service_ids: Option<Vec<ResourceId>>,
    #[serde(rename = "type")]
    event_type: EventType,
    #[serde(rename = "startedAt")]
    started_at: DateTime<Utc>,
    #[serde(rename = "endedAt")]
    ended_at: DateTime<Utc>,
    #[serde(rename = "logLevel", default)]
    log_level: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

impl Event {
    /// 从请求体解码事件
    pub fn from_slice(body: &[u8]) -> Result<Self, DecodeError> {
        let wire: WireEvent = serde_json::from_slice(body)?;
        Self::from_wire(wire)
    }

    pub fn from_json(body: &str) -> Result<Self, DecodeError> {
        Self::from_slice(body.as_bytes())
    }

    fn from_wire(wire: WireEvent) -> Result<Self, DecodeError> {
        let metadata = decode_metadata(&wire.event_type, wire.metadata)?;

        Ok(Self {
            id: wire.id,
            service_ids: wire.service_ids.unwrap_or_default(),
            event_type: wire.event_type,
            started_at: wire.started_at,
            ended_at: wire.ended_at,
            log_level: wire.log_level,
            message: wire.message,
            metadata,
        })
    }

    /// 服务 ID 的字符串形式
    pub fn service_id_strings(&self) -> Vec<String> {
        self.service_ids.iter().map(ToString::to_string).collect()
    }

    /// 事件的一行摘要
    ///
    /// 有 `message` 时直接使用，否则按事件类型生成。
    pub fn summary(&self) -> String {
        if !self.message.is_empty() {
            return self.message.clone();
        }

        let ids = self.service_id_strings().join(", ");

        match &self.event_type {
            EventType::Sync => {
                let commits = self.metadata.commits();
                let revision = match commits.len() {
                    0 => "<no revision>".to_string(),
                    1 | 2 => commits[0].short_revision().to_string(),
                    n => format!(
                        "{}..{}",
                        commits[n - 1].short_revision(),
                        commits[0].short_revision()
                    ),
                };
                let workloads = if ids.is_empty() {
                    "no workloads changed".to_string()
                } else {
                    ids
                };
                format!("Sync: {}, {}", revision, workloads)
            }
            EventType::Commit => {
                let revision = match &self.metadata {
                    EventMetadata::Commit(meta) => short_revision(&meta.revision),
                    _ => "",
                };
                let workloads = if ids.is_empty() {
                    "<no changes>".to_string()
                } else {
                    ids
                };
                format!("Commit: {}, {}", revision, workloads)
            }
            EventType::Release => {
                let mut summary = format!("Released: {} to {}", self.images_or_none(), ids);
                if let EventMetadata::Release(meta) = &self.metadata {
                    if !meta.cause.user.is_empty() {
                        summary.push_str(&format!(", by {}", meta.cause.user));
                    }
                    if !meta.cause.message.is_empty() {
                        summary.push_str(&format!(", with message {:?}", meta.cause.message));
                    }
                }
                summary
            }
            EventType::AutoRelease => format!("Automated release of {}", self.images_or_none()),
            EventType::Automate => format!("Automated: {}", ids),
            EventType::Deautomate => format!("Deautomated: {}", ids),
            EventType::Lock => format!("Locked: {}", ids),
            EventType::Unlock => format!("Unlocked: {}", ids),
            EventType::UpdatePolicy => format!("Updated policies: {}", ids),
            EventType::Other(name) => format!("Unknown event: {}", name),
        }
    }

    fn images_or_none(&self) -> String {
        let images = self.metadata.changed_images();
        if images.is_empty() {
            "no image changes".to_string()
        } else {
            images.join(", ")
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

fn decode_metadata(
    event_type: &EventType,
    raw: Option<serde_json::Value>,
) -> Result<EventMetadata, DecodeError> {
    let raw = match raw {
        Some(serde_json::Value::Null) | None => serde_json::Value::Object(Default::default()),
        Some(value) => value,
    };

    let wrap = |source| DecodeError::Metadata {
        event_type: event_type.to_string(),
        source,
    };

    let metadata = match event_type {
        EventType::Sync => EventMetadata::Sync(serde_json::from_value(raw).map_err(wrap)?),
        EventType::Commit => EventMetadata::Commit(serde_json::from_value(raw).map_err(wrap)?),
        EventType::Release => EventMetadata::Release(serde_json::from_value(raw).map_err(wrap)?),
        EventType::AutoRelease => {
            EventMetadata::AutoRelease(serde_json::from_value(raw).map_err(wrap)?)
        }
        _ => EventMetadata::None,
    };

    Ok(metadata)
}
