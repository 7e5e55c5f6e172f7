//! 组件属性：值类型、只读视图与外部配置存储接口。

use std::{collections::BTreeMap, fmt, ops::Deref, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::metadata::ComponentMetadata;

/// 组件名称属性键。
pub const COMPONENT_NAME: &str = "component.name";
/// 组件标识属性键。
pub const COMPONENT_ID: &str = "component.id";

/// 属性值。
///
/// 反序列化时按变体顺序尝试匹配，因此 TOML 中的整数落入 `Integer`，浮点数落入 `Float`。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<PropertyValue>),
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(value) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(value) => write!(f, "{value}"),
            PropertyValue::Integer(value) => write!(f, "{value}"),
            PropertyValue::Float(value) => write!(f, "{value}"),
            PropertyValue::String(value) => f.write_str(value),
            PropertyValue::List(values) => {
                f.write_str("[")?;
                for (position, value) in values.iter().enumerate() {
                    if position > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{value}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_owned())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Integer(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Float(value)
    }
}

/// 有序属性表，`BTreeMap` 保证遍历顺序稳定。
pub type Properties = BTreeMap<String, PropertyValue>;

/// 属性的只读视图。
///
/// # 契约说明 (What)
/// - 内部持有 `Arc<Properties>`，克隆成本为一次引用计数；
/// - 只实现 `Deref<Target = Properties>`，调用方无法就地修改，组件拿到的永远是激活时刻的快照。
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PropertiesView {
    inner: Arc<Properties>,
}

impl PropertiesView {
    pub fn new(properties: Properties) -> Self {
        Self {
            inner: Arc::new(properties),
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.inner.get(key).and_then(PropertyValue::as_str)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.inner.get(key).and_then(PropertyValue::as_i64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.inner.get(key).and_then(PropertyValue::as_bool)
    }

    /// 复制出一份可独立修改的属性表。
    pub fn to_properties(&self) -> Properties {
        self.inner.as_ref().clone()
    }
}

impl Deref for PropertiesView {
    type Target = Properties;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl From<Properties> for PropertiesView {
    fn from(value: Properties) -> Self {
        Self::new(value)
    }
}

impl From<Arc<Properties>> for PropertiesView {
    fn from(inner: Arc<Properties>) -> Self {
        Self { inner }
    }
}

/// 外部配置存储接口：为指定组件给出只读键值表。
///
/// - **契约 (What)**：返回值覆盖在组件默认属性之上；未配置的组件返回空表即可；
/// - **线程模型**：可能在任意组件管理器的串行化线程上被调用，实现需满足 `Send + Sync`。
pub trait PropertiesProvider: Send + Sync {
    fn properties_for(&self, component: &ComponentMetadata) -> Properties;
}

/// 不提供任何外部属性的默认实现。
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptyProperties;

impl PropertiesProvider for EmptyProperties {
    fn properties_for(&self, _component: &ComponentMetadata) -> Properties {
        Properties::new()
    }
}

impl<F> PropertiesProvider for F
where
    F: Fn(&ComponentMetadata) -> Properties + Send + Sync,
{
    fn properties_for(&self, component: &ComponentMetadata) -> Properties {
        self(component)
    }
}

/// 按优先级合并属性：默认值 ← 外部配置 ← 实例属性，最后写入运行时保留键。
pub(crate) fn merge(
    defaults: &Properties,
    configured: Properties,
    instance: &Properties,
    component_name: &str,
    component_id: u64,
) -> Properties {
    let mut merged = defaults.clone();
    merged.extend(configured);
    merged.extend(instance.iter().map(|(key, value)| (key.clone(), value.clone())));
    merged.insert(COMPONENT_NAME.to_owned(), component_name.into());
    merged.insert(COMPONENT_ID.to_owned(), PropertyValue::Integer(component_id as i64));
    merged
}
