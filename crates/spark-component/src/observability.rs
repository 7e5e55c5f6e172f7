//! 可观测性：组件日志器与生命周期监听。
//!
//! 引擎内部直接使用 `tracing` 输出结构化事件；[`ComponentLogger`] 是交给构造策略与实现对象的
//! 窄接口，自动附带 `component` 字段。

use std::{fmt, sync::Arc};

use crate::manager::{ComponentId, ComponentState};

/// 日志级别。
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// 附带组件上下文的日志器。
#[derive(Clone)]
pub struct ComponentLogger {
    component: Arc<str>,
    component_id: ComponentId,
}

impl ComponentLogger {
    pub fn new(component: impl Into<Arc<str>>, component_id: ComponentId) -> Self {
        Self {
            component: component.into(),
            component_id,
        }
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn component_id(&self) -> ComponentId {
        self.component_id
    }

    /// 当前订阅者是否会记录该级别。
    pub fn is_enabled(&self, level: LogLevel) -> bool {
        match level {
            LogLevel::Error => tracing::enabled!(tracing::Level::ERROR),
            LogLevel::Warn => tracing::enabled!(tracing::Level::WARN),
            LogLevel::Info => tracing::enabled!(tracing::Level::INFO),
            LogLevel::Debug => tracing::enabled!(tracing::Level::DEBUG),
            LogLevel::Trace => tracing::enabled!(tracing::Level::TRACE),
        }
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        let component = &*self.component;
        let component_id = self.component_id.get();
        match level {
            LogLevel::Error => tracing::error!(component, component_id, "{message}"),
            LogLevel::Warn => tracing::warn!(component, component_id, "{message}"),
            LogLevel::Info => tracing::info!(component, component_id, "{message}"),
            LogLevel::Debug => tracing::debug!(component, component_id, "{message}"),
            LogLevel::Trace => tracing::trace!(component, component_id, "{message}"),
        }
    }

    /// 记录带错误源的日志。
    pub fn log_error(&self, level: LogLevel, message: &str, error: &dyn std::error::Error) {
        let component = &*self.component;
        let component_id = self.component_id.get();
        match level {
            LogLevel::Error => tracing::error!(component, component_id, error = %error, "{message}"),
            LogLevel::Warn => tracing::warn!(component, component_id, error = %error, "{message}"),
            LogLevel::Info => tracing::info!(component, component_id, error = %error, "{message}"),
            LogLevel::Debug => tracing::debug!(component, component_id, error = %error, "{message}"),
            LogLevel::Trace => tracing::trace!(component, component_id, error = %error, "{message}"),
        }
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }
}

impl fmt::Debug for ComponentLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentLogger")
            .field("component", &self.component)
            .field("component_id", &self.component_id)
            .finish()
    }
}

/// 一次组件级状态跃迁。
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StateChange {
    pub component: Arc<str>,
    pub from: ComponentState,
    pub to: ComponentState,
}

/// 生命周期监听器。
///
/// - 回调发生在组件管理器的串行化线程上，且不持有任何管理器内部锁；
/// - 回调内可以安全地调用 `enable` / `disable`，请求会排队到当前跃迁之后执行。
pub trait LifecycleListener: Send + Sync {
    fn state_changed(&self, change: &StateChange);
}

impl<F> LifecycleListener for F
where
    F: Fn(&StateChange) + Send + Sync,
{
    fn state_changed(&self, change: &StateChange) {
        self(change)
    }
}
