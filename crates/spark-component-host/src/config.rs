//! # 宿主配置
//!
//! ## 核心意图（Why）
//! - 以一份 TOML 文件描述日志过滤规则与各组件的启用开关、属性覆盖；
//! - 解析与校验集中在加载阶段完成，运行期只读取已经类型化的快照。
//!
//! ## 行为契约（What）
//! - 文件结构：
//!   ```toml
//!   [logging]
//!   filter = "info,spark_component=debug"
//!
//!   [components.web]
//!   enabled = true
//!   properties = { port = 8080, tags = ["a", "b"] }
//!   ```
//! - 未知字段直接拒绝，避免拼写错误静默失效；
//! - 属性值只接受布尔、整数、浮点、字符串及其数组，嵌套表视为解析错误。

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::Deserialize;
use spark_component::Properties;
use thiserror::Error;

/// 默认日志过滤规则。
pub const DEFAULT_LOG_FILTER: &str = "info";

/// 加载宿主配置时的错误。
#[derive(Debug, Error)]
pub enum HostConfigError {
    #[error("failed to read host config `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid host config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// 宿主配置根节点。
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    pub logging: LoggingConfig,
    pub components: BTreeMap<String, ComponentConfig>,
}

/// `[logging]` 段。
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// `EnvFilter` 语法的过滤规则；`RUST_LOG` 存在时以环境变量为准。
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_owned(),
        }
    }
}

/// `[components.<name>]` 段。
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ComponentConfig {
    /// 覆盖元数据中的默认启用开关；缺省时沿用元数据。
    pub enabled: Option<bool>,
    /// 覆盖元数据默认值的属性。
    pub properties: Properties,
}

impl HostConfig {
    /// 从文件加载配置。
    pub fn load(path: impl AsRef<Path>) -> Result<Self, HostConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| HostConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        text.parse()
    }

    pub fn component(&self, name: &str) -> Option<&ComponentConfig> {
        self.components.get(name)
    }

    /// 计算组件最终是否启用：配置覆盖优先，其次是元数据默认值。
    pub fn is_enabled(&self, name: &str, default: bool) -> bool {
        self.component(name)
            .and_then(|component| component.enabled)
            .unwrap_or(default)
    }

    /// 配置中为组件提供的属性；未配置时为空。
    pub fn properties_for(&self, name: &str) -> Properties {
        self.component(name)
            .map(|component| component.properties.clone())
            .unwrap_or_default()
    }
}

impl FromStr for HostConfig {
    type Err = HostConfigError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Ok(toml::from_str(text)?)
    }
}
