//! 渲染后的通知消息

use serde::Serialize;

use crate::event::{Event, EventType};

/// 与目标无关的通知消息，每个 (事件, 目标) 渲染一次
///
/// 序列化字段名与 webhook 目标的线上格式一致。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Message {
    /// 标题链接（首个提交或 VCS 基础链接）
    pub title_link: String,
    pub title: String,
    pub body: String,
    /// 事件类型
    #[serde(rename = "Type")]
    pub event_type: Option<EventType>,
    /// 原始事件
    pub event: Option<Event>,
}

impl Message {
    /// 空消息，表示"无需发送"
    pub fn empty() -> Self {
        Self::default()
    }

    /// 标题或正文为空时视为空消息
    pub fn is_empty(&self) -> bool {
        self.title.is_empty() || self.body.is_empty()
    }
}
