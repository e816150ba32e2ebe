//! 资源 ID - Flux 上报的 Kubernetes 资源标识
//!
//! 支持三种文本形式：
//! - `namespace:kind/name`
//! - `<cluster>:kind/name`：集群级资源
//! - 旧格式 `namespace/name`，kind 固定为 `service`

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use super::DecodeError;

static RESOURCE_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(<cluster>|[a-zA-Z0-9_-]+):([a-zA-Z0-9_-]+)/([a-zA-Z0-9_.:-]+)$")
        .expect("resource id pattern is valid")
});

static LEGACY_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-zA-Z0-9_-]+)/([a-zA-Z0-9_-]+)$").expect("legacy id pattern is valid")
});

/// 集群级资源使用的命名空间占位符
pub const CLUSTER_SCOPE: &str = "<cluster>";

/// 资源标识，拆分为命名空间、类型和名称
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId {
    namespace: String,
    kind: String,
    name: String,
    legacy: bool,
}

impl ResourceId {
    pub fn new(
        namespace: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            kind: kind.into(),
            name: name.into(),
            legacy: false,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `(namespace, kind, name)`
    pub fn components(&self) -> (&str, &str, &str) {
        (&self.namespace, &self.kind, &self.name)
    }

    pub fn is_cluster_scoped(&self) -> bool {
        self.namespace == CLUSTER_SCOPE
    }
}

impl FromStr for ResourceId {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(caps) = RESOURCE_ID.captures(s) {
            return Ok(Self::new(&caps[1], caps[2].to_lowercase(), &caps[3]));
        }

        if let Some(caps) = LEGACY_ID.captures(s) {
            return Ok(Self {
                namespace: caps[1].to_string(),
                kind: "service".to_string(),
                name: caps[2].to_string(),
                legacy: true,
            });
        }

        Err(DecodeError::ResourceId(s.to_string()))
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.legacy {
            write!(f, "{}/{}", self.namespace, self.name)
        } else {
            write!(f, "{}:{}/{}", self.namespace, self.kind, self.name)
        }
    }
}

impl Serialize for ResourceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ResourceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
