//! 频道路由 - 按命名空间把事件映射到目标频道

use regex::Regex;
use std::sync::LazyLock;

use crate::config::ConfigError;
use crate::event::ResourceId;

/// 匹配所有命名空间
pub const ANY_NAMESPACE: &str = "*";

static CHANNEL_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([#A-Za-z0-9][A-Za-z0-9._-]*)\s*=\s*([a-z0-9*][-A-Za-z0-9_.]*)$")
        .expect("channel mapping pattern is valid")
});

/// 频道与命名空间的对应规则
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRule {
    pub channel: String,
    /// 命名空间，`*` 表示全部
    pub namespace: String,
}

impl ChannelRule {
    pub fn new(channel: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            namespace: namespace.into(),
        }
    }

    pub fn matches(&self, namespace: &str) -> bool {
        self.namespace == ANY_NAMESPACE || self.namespace == namespace
    }
}

/// 频道路由，构造后只读
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRouter {
    rules: Vec<ChannelRule>,
}

impl ChannelRouter {
    pub fn new(rules: Vec<ChannelRule>) -> Self {
        Self { rules }
    }

    /// 解析频道配置
    ///
    /// 支持两种形式：
    /// - `#channel`：单个频道，匹配所有命名空间
    /// - `#a=ns1,#b=ns2,#c=*`：按命名空间映射
    ///
    /// 任意一项格式错误则整体失败。
    pub fn parse(config: &str) -> Result<Self, ConfigError> {
        let config = config.trim();

        if !config.contains('=') {
            if config.is_empty() {
                return Err(ConfigError::InvalidChannelMapping(config.to_string()));
            }
            return Ok(Self::new(vec![ChannelRule::new(config, ANY_NAMESPACE)]));
        }

        let rules = config
            .split(',')
            .map(|pair| {
                let pair = pair.trim();
                CHANNEL_PAIR
                    .captures(pair)
                    .map(|caps| ChannelRule::new(&caps[1], &caps[2]))
                    .ok_or_else(|| ConfigError::InvalidChannelMapping(pair.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(rules))
    }

    pub fn rules(&self) -> &[ChannelRule] {
        &self.rules
    }

    /// 计算需要通知的频道（去重，保持首次出现顺序）
    ///
    /// 外层按服务 ID 顺序，内层按规则顺序。
    pub fn route(&self, service_ids: &[ResourceId]) -> Vec<String> {
        let mut channels: Vec<String> = Vec::new();

        for id in service_ids {
            for rule in self.rules.iter().filter(|r| r.matches(id.namespace())) {
                if !channels.contains(&rule.channel) {
                    channels.push(rule.channel.clone());
                }
            }
        }

        channels
    }
}
