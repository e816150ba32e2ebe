//! 通知分发器 - 将一个事件依次发送到所有目标

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::destination::{Destination, SendResult};
use super::formatter::Formatter;
use super::message::Message;
use crate::event::Event;

/// 一次分发的结果，按目标顺序记录
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchOutcome {
    pub results: Vec<(String, SendResult)>,
}

impl DispatchOutcome {
    /// 是否有目标发送失败
    pub fn any_failed(&self) -> bool {
        self.results
            .iter()
            .any(|(_, r)| matches!(r, SendResult::Failed(_)))
    }

    pub fn sent_count(&self) -> usize {
        self.results
            .iter()
            .filter(|(_, r)| *r == SendResult::Sent)
            .count()
    }

    pub fn failed_destinations(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|(_, r)| matches!(r, SendResult::Failed(_)))
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// 为某个目标渲染好的消息（不发送）
#[derive(Debug, Clone, Serialize)]
pub struct RenderedMessage {
    pub destination: String,
    /// 按频道寻址的目标会发往的频道
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<Vec<String>>,
    pub message: Message,
}

/// 通知分发器
///
/// 目标按注册顺序依次发送，单个目标失败不影响后续目标。
pub struct Dispatcher {
    formatter: Arc<Formatter>,
    destinations: Vec<Arc<dyn Destination>>,
    /// 是否为 dry-run 模式
    dry_run: bool,
}

impl Dispatcher {
    pub fn new(formatter: Formatter) -> Self {
        Self {
            formatter: Arc::new(formatter),
            destinations: Vec::new(),
            dry_run: false,
        }
    }

    /// 设置 dry-run 模式
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// 注册目标
    pub fn register_destination(&mut self, destination: Arc<dyn Destination>) {
        info!(destination = destination.name(), "Registering notification destination");
        self.destinations.push(destination);
    }

    pub fn formatter(&self) -> &Formatter {
        &self.formatter
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// 获取已注册的目标数量
    pub fn destination_count(&self) -> usize {
        self.destinations.len()
    }

    /// 获取已注册的目标名称
    pub fn destination_names(&self) -> Vec<&str> {
        self.destinations.iter().map(|d| d.name()).collect()
    }

    /// 为每个目标渲染消息，不发送；空消息不返回
    pub fn render(&self, event: &Event) -> Vec<RenderedMessage> {
        self.destinations
            .iter()
            .filter_map(|destination| {
                let message = self.formatter.format_event(event, destination.as_ref());
                if message.is_empty() {
                    return None;
                }
                Some(RenderedMessage {
                    destination: destination.name().to_string(),
                    channels: destination
                        .channel_router()
                        .map(|router| router.route(&event.service_ids)),
                    message,
                })
            })
            .collect()
    }

    /// 把事件分发到所有目标
    pub async fn dispatch(&self, event: &Event) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();

        for destination in &self.destinations {
            let name = destination.name().to_string();
            let message = self.formatter.format_event(event, destination.as_ref());

            if message.is_empty() {
                debug!(destination = %name, event_id = event.id, "Nothing to send");
                outcome
                    .results
                    .push((name, SendResult::Skipped("empty message".to_string())));
                continue;
            }

            let result = match destination.channel_router() {
                Some(router) => {
                    let channels = router.route(&event.service_ids);
                    self.send_to_channels(destination.as_ref(), &message, &channels)
                        .await
                }
                None => self.send_one(destination.as_ref(), &message, None).await,
            };

            outcome.results.push((name, result));
        }

        if outcome.any_failed() {
            warn!(
                event_id = event.id,
                failed = ?outcome.failed_destinations(),
                "Event dispatch finished with failures"
            );
        } else {
            info!(
                event_id = event.id,
                sent = outcome.sent_count(),
                "Event dispatched"
            );
        }

        outcome
    }

    async fn send_to_channels(
        &self,
        destination: &dyn Destination,
        message: &Message,
        channels: &[String],
    ) -> SendResult {
        if channels.is_empty() {
            debug!(destination = destination.name(), "No channel matches the event namespaces");
            return SendResult::Skipped("no matching channel".to_string());
        }

        let mut failures = Vec::new();
        let mut skipped = None;

        for channel in channels {
            match self.send_one(destination, message, Some(channel)).await {
                SendResult::Sent => {}
                SendResult::Skipped(reason) => skipped = Some(reason),
                SendResult::Failed(reason) => failures.push(format!("{}: {}", channel, reason)),
            }
        }

        if !failures.is_empty() {
            SendResult::Failed(failures.join("; "))
        } else if let Some(reason) = skipped {
            SendResult::Skipped(reason)
        } else {
            SendResult::Sent
        }
    }

    async fn send_one(
        &self,
        destination: &dyn Destination,
        message: &Message,
        channel: Option<&str>,
    ) -> SendResult {
        let name = destination.name();

        if self.dry_run {
            info!(
                destination = name,
                channel = channel.unwrap_or("-"),
                title = %message.title,
                "[DRY-RUN] Would send message"
            );
            return SendResult::Skipped("dry-run".to_string());
        }

        match destination.send(message, channel).await {
            Ok(()) => {
                debug!(destination = name, channel = channel.unwrap_or("-"), "Message sent");
                SendResult::Sent
            }
            Err(e) => {
                warn!(
                    destination = name,
                    channel = channel.unwrap_or("-"),
                    error = %e,
                    "Destination send failed"
                );
                SendResult::Failed(e.to_string())
            }
        }
    }
}
