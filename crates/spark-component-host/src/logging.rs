//! 进程级日志安装。
//!
//! # 教案式说明
//! - **意图（Why）**：引擎内部只发出 `tracing` 事件，是否输出、输出到哪里由宿主决定；
//! - **逻辑（How）**：组装 `fmt + EnvFilter` 订阅者并设为全局默认，`OnceLock` 保证只安装一次；
//! - **契约（What）**：`RUST_LOG` 存在时优先使用，否则使用配置中的过滤规则；
//!   重复调用返回 [`LoggingError::AlreadyInstalled`]，外部已设置订阅者时返回
//!   [`LoggingError::SubscriberAlreadySet`]。

use std::sync::OnceLock;

use thiserror::Error;
use tracing::dispatcher;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt};

use crate::config::LoggingConfig;

static INSTALLED: OnceLock<String> = OnceLock::new();

/// 日志安装错误。
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("component host logging is already installed")]
    AlreadyInstalled,
    #[error("a global tracing subscriber is already set")]
    SubscriberAlreadySet,
    #[error("invalid log filter `{filter}`: {source}")]
    InvalidFilter {
        filter: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },
    #[error("failed to set global tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// 按配置安装全局订阅者。
pub fn install(config: &LoggingConfig) -> Result<(), LoggingError> {
    if INSTALLED.get().is_some() {
        return Err(LoggingError::AlreadyInstalled);
    }
    if dispatcher::has_been_set() {
        return Err(LoggingError::SubscriberAlreadySet);
    }

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => build_filter(&config.filter)?,
    };
    let rendered = filter.to_string();
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer());
    tracing::subscriber::set_global_default(subscriber)?;

    if INSTALLED.set(rendered.clone()).is_err() {
        return Err(LoggingError::AlreadyInstalled);
    }
    tracing::info!(filter = %rendered, "component host logging installed");
    Ok(())
}

/// 已安装的过滤规则；尚未安装时为 `None`。
pub fn installed_filter() -> Option<&'static str> {
    INSTALLED.get().map(String::as_str)
}

/// 解析 `EnvFilter` 规则。
pub fn build_filter(filter: &str) -> Result<EnvFilter, LoggingError> {
    EnvFilter::try_new(filter).map_err(|source| LoggingError::InvalidFilter {
        filter: filter.to_owned(),
        source,
    })
}
