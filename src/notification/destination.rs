//! 通知目标 trait 定义

use async_trait::async_trait;

use super::error::SendError;
use super::message::Message;
use super::router::ChannelRouter;

/// 目标的标记风格：换行符与链接格式
///
/// 格式化器只依赖这部分能力。
pub trait MarkupStyle {
    /// 换行符
    fn new_line(&self) -> &str {
        "\n"
    }

    /// 超链接
    fn format_link(&self, url: &str, label: &str) -> String {
        format!("<{}|{}>", url, label)
    }
}

/// 发送结果
#[derive(Debug, Clone, PartialEq)]
pub enum SendResult {
    /// 发送成功
    Sent,
    /// 跳过（空消息、无匹配频道或 dry-run）
    Skipped(String),
    /// 发送失败
    Failed(String),
}

/// 通知目标 trait
#[async_trait]
pub trait Destination: MarkupStyle + Send + Sync {
    /// 目标名称（仅用于日志）
    fn name(&self) -> &str;

    /// 按频道寻址的目标返回其频道路由
    fn channel_router(&self) -> Option<&ChannelRouter> {
        None
    }

    /// 发送一条消息，不在内部重试
    ///
    /// `channel` 仅对按频道寻址的目标有值。
    async fn send(&self, message: &Message, channel: Option<&str>) -> Result<(), SendError>;
}
