//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 为组件运行时对外暴露的错误语义提供集中定义；
//! - 区分“实例构造失败”“激活钩子失败”“元数据非法”“宿主调用错误”等类别，便于日志与排障。
//!
//! ## 设计要求（What）
//! - 所有错误类型派生 `thiserror::Error`，兼容 `std::error::Error`；
//! - 构造与激活失败只影响单个激活上下文，由组件管理器记录并回滚，不会向宿主抛出；
//! - 依赖丢失不是错误，由状态机按正常跃迁处理，因此不在此处建模。

use thiserror::Error;

/// 运行时统一使用的 `Result` 别名。
pub type Result<T, E = ComponentError> = core::result::Result<T, E>;

/// 组件运行时错误域。
///
/// # 教案式说明
/// - **契约 (What)**：
///   - 所有变体均满足 `Send + Sync + 'static`，可跨线程传播；
///   - 变体携带组件名等可读上下文，日志中无需再额外拼装；
/// - **风险 (Trade-offs)**：上下文以 `String` 保存，换取易读性。
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ComponentError {
    /// 构造策略无法创建实现对象：缺少无参构造器，或构造过程返回错误 / panic。
    #[error("failed to instantiate `{class}` for component `{component}`: {detail}")]
    Instantiation {
        component: String,
        class: String,
        detail: String,
    },

    /// 实现对象的激活钩子返回错误或 panic。
    #[error("activation hook of component `{component}` failed: {detail}")]
    ActivationHook { component: String, detail: String },

    /// 元数据校验失败，例如引用名称重复。
    #[error("invalid metadata for component `{component}`: {detail}")]
    InvalidMetadata { component: String, detail: String },

    /// 按名称操作组件时未命中。
    #[error("component `{name}` is not registered")]
    UnknownComponent { name: String },

    /// 同名组件重复注册。
    #[error("component `{name}` is already registered")]
    DuplicateComponent { name: String },

    /// 工厂组件尚未满足依赖，无法创建新实例。
    #[error("component `{name}` is not satisfied; cannot create a new instance")]
    NotSatisfied { name: String },

    /// 对单例组件调用了工厂接口。
    #[error("component `{name}` is not a factory component")]
    NotAFactory { name: String },

    /// 组件已进入终态 `Disposed`。
    #[error("component `{name}` has been disposed")]
    Disposed { name: String },

    /// 组件未声明提供的服务，无法设置服务属性。
    #[error("component `{name}` does not provide a service")]
    NoProvidedService { name: String },

    /// 上下文所属的运行时或管理器已被释放。
    #[error("component runtime is no longer available")]
    RuntimeUnavailable,
}

impl ComponentError {
    /// 构造 [`ComponentError::Instantiation`] 的便捷入口。
    pub fn instantiation(
        component: impl Into<String>,
        class: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::Instantiation {
            component: component.into(),
            class: class.into(),
            detail: detail.into(),
        }
    }

    /// 构造 [`ComponentError::ActivationHook`] 的便捷入口。
    pub fn activation(component: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::ActivationHook {
            component: component.into(),
            detail: detail.into(),
        }
    }
}

/// 将 panic 负载转换为可读文本。
pub(crate) fn panic_message(payload: &(dyn core::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with non-string payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_component_context() {
        assert_eq!(
            ComponentError::instantiation("web", "Web", "boom").to_string(),
            "failed to instantiate `Web` for component `web`: boom"
        );
        assert_eq!(
            ComponentError::NoProvidedService {
                name: "web".to_owned()
            }
            .to_string(),
            "component `web` does not provide a service"
        );
    }

    #[test]
    fn panic_payloads_are_rendered() {
        let payload: Box<dyn core::any::Any + Send> = Box::new("static boom");
        assert_eq!(panic_message(payload.as_ref()), "static boom");
        let payload: Box<dyn core::any::Any + Send> = Box::new(String::from("owned boom"));
        assert_eq!(panic_message(payload.as_ref()), "owned boom");
        let payload: Box<dyn core::any::Any + Send> = Box::new(7_u8);
        assert_eq!(
            panic_message(payload.as_ref()),
            "panic with non-string payload"
        );
    }
}
