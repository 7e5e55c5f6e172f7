#![deny(unsafe_code)]
#![doc = "spark-component-host: 组件运行时的宿主装配工具。"]
#![doc = ""]
#![doc = "负责把 TOML 配置、日志订阅者与 `ComponentRuntime` 装配在一起，"]
#![doc = "并提供启动、配置重载与按逆序关闭的宿主流程。"]

pub mod builder;
pub mod config;
pub mod host;
pub mod logging;
pub mod properties;
pub mod shutdown;

pub use builder::{HostBuildError, HostBuilder};
pub use config::{ComponentConfig, HostConfig, HostConfigError, LoggingConfig};
pub use host::{Host, ReloadReport};
pub use logging::LoggingError;
pub use properties::ConfiguredProperties;
pub use shutdown::{ShutdownRecord, ShutdownReport};
