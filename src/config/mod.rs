//! 配置层
//!
//! 配置来源抽象为 [`Config`] trait：生产环境从环境变量读取（[`EnvConfig`]），
//! 测试和嵌入场景使用内存实现（[`MapConfig`]）。启动时一次性构建
//! [`Settings`]，之后只读。

use std::collections::HashMap;

use crate::notification::template::TemplateError;

/// 默认监听地址
pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0:3031";

/// 默认启用的目标
pub const DEFAULT_EXPORTER_TYPE: &str = "slack";

/// 配置错误，启动阶段即失败
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("required setting {0} not set")]
    Missing(String),
    #[error("could not parse channel/namespace configuration: {0:?}")]
    InvalidChannelMapping(String),
    #[error("invalid {name} template: {source}")]
    InvalidTemplate {
        name: &'static str,
        #[source]
        source: TemplateError,
    },
    #[error("unknown exporter type: {0:?}")]
    UnknownExporter(String),
    #[error("invalid URL in {key}: {source}")]
    InvalidUrl {
        key: String,
        #[source]
        source: url::ParseError,
    },
    #[error("failed to create HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// 配置来源
pub trait Config: Send + Sync {
    /// 读取可选配置，未设置（或为空）时返回默认值
    fn optional(&self, key: &str, default: &str) -> String;

    /// 读取必需配置
    fn required(&self, key: &str) -> Result<String, ConfigError>;
}

/// 从环境变量读取配置，key 统一转为大写
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvConfig;

impl EnvConfig {
    pub fn new() -> Self {
        Self
    }

    fn lookup(key: &str) -> Option<String> {
        std::env::var(key.to_uppercase())
            .ok()
            .filter(|v| !v.is_empty())
    }
}

impl Config for EnvConfig {
    fn optional(&self, key: &str, default: &str) -> String {
        Self::lookup(key).unwrap_or_else(|| default.to_string())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        Self::lookup(key).ok_or_else(|| ConfigError::Missing(key.to_uppercase()))
    }
}

/// 内存配置
#[derive(Debug, Default, Clone)]
pub struct MapConfig {
    settings: HashMap<String, String>,
}

impl MapConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// 链式设置
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.settings.insert(key.to_uppercase(), value.into());
    }

    fn lookup(&self, key: &str) -> Option<&str> {
        self.settings
            .get(&key.to_uppercase())
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

impl Config for MapConfig {
    fn optional(&self, key: &str, default: &str) -> String {
        self.lookup(key).unwrap_or(default).to_string()
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.lookup(key)
            .map(str::to_string)
            .ok_or_else(|| ConfigError::Missing(key.to_uppercase()))
    }
}

/// 格式化相关配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatterSettings {
    /// VCS 基础链接，如 https://github.com/org/repo
    pub vcs_link: String,
    /// 标题模板覆盖
    pub title_template: Option<String>,
    /// 正文模板覆盖
    pub body_template: Option<String>,
    /// 提交链接模板覆盖
    pub commit_template: Option<String>,
}

impl FormatterSettings {
    pub fn new(vcs_link: impl Into<String>) -> Self {
        Self {
            vcs_link: vcs_link.into(),
            title_template: None,
            body_template: None,
            commit_template: None,
        }
    }
}

/// 启动时构建的全局配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub formatter: FormatterSettings,
    /// 按配置顺序排列的目标类型
    pub exporters: Vec<String>,
    pub listen_address: String,
}

impl Settings {
    pub fn from_config(config: &dyn Config) -> Result<Self, ConfigError> {
        let vcs_link = match config.optional("vcs_root_url", "") {
            link if !link.is_empty() => link,
            _ => config.required("github_url")?,
        };

        let non_empty = |key: &str| Some(config.optional(key, "")).filter(|v| !v.is_empty());

        let exporters = config
            .optional("exporter_type", DEFAULT_EXPORTER_TYPE)
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            formatter: FormatterSettings {
                vcs_link,
                title_template: non_empty("title_template"),
                body_template: non_empty("body_template"),
                commit_template: non_empty("commit_template"),
            },
            exporters,
            listen_address: config.optional("listen_address", DEFAULT_LISTEN_ADDRESS),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_config_optional_and_required() {
        let config = MapConfig::new().with("git_url", "github.com").with("empty", "");

        assert_eq!(config.optional("GIT_URL", "hello"), "github.com");
        assert_eq!(config.optional("missing", "hello"), "hello");
        assert_eq!(config.optional("empty", "hello"), "hello");

        assert_eq!(config.required("git_url").unwrap(), "github.com");
        let err = config.required("empty").unwrap_err();
        assert_eq!(err.to_string(), "required setting EMPTY not set");
    }

    #[test]
    fn test_env_config_reads_uppercase_keys() {
        std::env::set_var("FLUX_NOTIFY_TEST_ENV_KEY", "value");
        let config = EnvConfig::new();
        assert_eq!(config.optional("flux_notify_test_env_key", "d"), "value");
        assert_eq!(config.required("flux_notify_test_env_key").unwrap(), "value");
        assert!(config.required("flux_notify_test_env_unset").is_err());
        std::env::remove_var("FLUX_NOTIFY_TEST_ENV_KEY");
    }

    #[test]
    fn test_settings_defaults() {
        let config = MapConfig::new().with("github_url", "https://github.com/org/repo");
        let settings = Settings::from_config(&config).unwrap();

        assert_eq!(settings.formatter, FormatterSettings::new("https://github.com/org/repo"));
        assert_eq!(settings.exporters, vec!["slack"]);
        assert_eq!(settings.listen_address, DEFAULT_LISTEN_ADDRESS);
    }

    #[test]
    fn test_settings_overrides() {
        let config = MapConfig::new()
            .with("github_url", "https://github.com/org/repo")
            .with("vcs_root_url", "https://gitlab.com/org/repo")
            .with("exporter_type", "Slack, webhook,,datadog")
            .with("title_template", "Deployed {{ event_type }}")
            .with("listen_address", "127.0.0.1:9000");
        let settings = Settings::from_config(&config).unwrap();

        assert_eq!(settings.formatter.vcs_link, "https://gitlab.com/org/repo");
        assert_eq!(settings.formatter.title_template.as_deref(), Some("Deployed {{ event_type }}"));
        assert_eq!(settings.formatter.body_template, None);
        assert_eq!(settings.exporters, vec!["slack", "webhook", "datadog"]);
        assert_eq!(settings.listen_address, "127.0.0.1:9000");
    }

    #[test]
    fn test_settings_requires_vcs_link() {
        let err = Settings::from_config(&MapConfig::new()).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(ref key) if key == "GITHUB_URL"));
    }
}
