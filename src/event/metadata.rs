//! 事件元数据 - 按事件类型区分的负载

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// 工作负载发布成功的状态值
pub const RELEASE_STATUS_SUCCESS: &str = "success";

/// 一次 Git 提交
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    #[serde(default)]
    pub revision: String,
    #[serde(default)]
    pub message: String,
}

impl Commit {
    /// 展示用的短 revision（前 7 个字符）
    pub fn short_revision(&self) -> &str {
        short_revision(&self.revision)
    }
}

/// 截取 revision 前 7 个字符，不足 7 个时原样返回
pub fn short_revision(revision: &str) -> &str {
    match revision.char_indices().nth(7) {
        Some((idx, _)) => &revision[..idx],
        None => revision,
    }
}

/// 同步时某个资源应用失败的信息
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceError {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(rename = "Path", default)]
    pub path: String,
    #[serde(rename = "Error", default)]
    pub error: String,
}

/// 单个容器的镜像变更
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerUpdate {
    #[serde(rename = "Container", default)]
    pub container: String,
    #[serde(rename = "Current", default)]
    pub current: String,
    #[serde(rename = "Target", default)]
    pub target: String,
}

/// 单个工作负载的发布结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadResult {
    #[serde(rename = "Status", default)]
    pub status: String,
    #[serde(rename = "Error", default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    #[serde(rename = "PerContainer", default)]
    pub per_container: Option<Vec<ContainerUpdate>>,
}

/// 发布结果：资源 ID -> 工作负载结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReleaseResult(pub BTreeMap<String, WorkloadResult>);

impl ReleaseResult {
    /// 成功发布的目标镜像（去重、排序）
    pub fn changed_images(&self) -> Vec<String> {
        let images: BTreeSet<&str> = self
            .0
            .values()
            .filter(|w| w.status == RELEASE_STATUS_SUCCESS)
            .flat_map(|w| w.per_container.iter().flatten())
            .map(|c| c.target.as_str())
            .collect();
        images.into_iter().map(str::to_string).collect()
    }
}

/// 触发发布的原因
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseCause {
    #[serde(rename = "Message", default)]
    pub message: String,
    #[serde(rename = "User", default)]
    pub user: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommitMetadata {
    #[serde(default)]
    pub revision: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ReleaseResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncMetadata {
    #[serde(default)]
    pub commits: Vec<Commit>,
    #[serde(default)]
    pub includes: BTreeMap<String, bool>,
    #[serde(rename = "initialSync", default)]
    pub initial_sync: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ResourceError>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleaseMetadata {
    #[serde(default)]
    pub result: ReleaseResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<serde_json::Value>,
    #[serde(default)]
    pub cause: ReleaseCause,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoReleaseMetadata {
    #[serde(default)]
    pub result: ReleaseResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

/// 按事件类型区分的元数据
///
/// 只通过下面的提取函数访问，类型不匹配时返回空值，不会失败。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EventMetadata {
    #[default]
    None,
    Sync(SyncMetadata),
    Commit(CommitMetadata),
    Release(ReleaseMetadata),
    AutoRelease(AutoReleaseMetadata),
}

impl EventMetadata {
    /// 提交列表：commit 事件给出单个 revision，sync 事件给出全部提交
    pub fn commits(&self) -> Vec<Commit> {
        match self {
            EventMetadata::Commit(meta) => vec![Commit {
                revision: meta.revision.clone(),
                message: String::new(),
            }],
            EventMetadata::Sync(meta) => meta.commits.clone(),
            _ => Vec::new(),
        }
    }

    /// 同步错误列表，仅 sync 事件有
    pub fn errors(&self) -> Vec<ResourceError> {
        match self {
            EventMetadata::Sync(meta) => meta.errors.clone(),
            _ => Vec::new(),
        }
    }

    /// 变更的镜像，仅 release / autorelease 事件有
    pub fn changed_images(&self) -> Vec<String> {
        match self {
            EventMetadata::Release(meta) => meta.result.changed_images(),
            EventMetadata::AutoRelease(meta) => meta.result.changed_images(),
            _ => Vec::new(),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, EventMetadata::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workload(status: &str, targets: &[&str]) -> WorkloadResult {
        WorkloadResult {
            status: status.to_string(),
            error: String::new(),
            per_container: Some(
                targets
                    .iter()
                    .map(|t| ContainerUpdate {
                        container: "app".to_string(),
                        current: "old".to_string(),
                        target: t.to_string(),
                    })
                    .collect(),
            ),
        }
    }

    #[test]
    fn test_short_revision() {
        assert_eq!(short_revision("810c2e6f22ac5ab7c831fe0dd697fe32997b098f"), "810c2e6");
        assert_eq!(short_revision("abc"), "abc");
        assert_eq!(short_revision("1234567"), "1234567");
        assert_eq!(short_revision(""), "");
    }

    #[test]
    fn test_changed_images_only_successful_and_sorted() {
        let mut results = BTreeMap::new();
        results.insert("default:deployment/b".to_string(), workload("success", &["img:2", "img:1"]));
        results.insert("default:deployment/a".to_string(), workload("success", &["img:1"]));
        results.insert("default:deployment/c".to_string(), workload("failed", &["img:3"]));
        let result = ReleaseResult(results);

        assert_eq!(result.changed_images(), vec!["img:1", "img:2"]);
    }

    #[test]
    fn test_extraction_defaults_for_mismatched_variant() {
        let meta = EventMetadata::None;
        assert!(meta.commits().is_empty());
        assert!(meta.errors().is_empty());
        assert!(meta.changed_images().is_empty());

        let commit = EventMetadata::Commit(CommitMetadata {
            revision: "d644e1a05db6881abf0cdb78299917b95f442036".to_string(),
            ..Default::default()
        });
        assert_eq!(commit.commits().len(), 1);
        assert!(commit.errors().is_empty());
        assert!(commit.changed_images().is_empty());
    }
}
