use std::{fmt, sync::Arc};

use parking_lot::Mutex;
use spark_component::{
    ComponentDescription, ComponentError, ComponentManager, ComponentRuntime, ServiceRegistry,
};

use crate::{
    builder::HostBuildError,
    config::HostConfig,
    logging,
    properties::ConfiguredProperties,
    shutdown::{ShutdownReport, shutdown_runtime},
};

/// 一次配置重载对组件产生的影响。
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ReloadReport {
    /// 由禁用转为启用的组件。
    pub enabled: Vec<String>,
    /// 由启用转为禁用的组件。
    pub disabled: Vec<String>,
    /// 属性变化而重启的组件。
    pub restarted: Vec<String>,
}

impl ReloadReport {
    pub fn is_empty(&self) -> bool {
        self.enabled.is_empty() && self.disabled.is_empty() && self.restarted.is_empty()
    }
}

/// `Host` 持有组件运行时与配置，是宿主进程与组件世界之间的唯一入口。
///
/// # 教案级注释
/// - **设计目的 (Why)**
///   - 把运行时、属性提供者与启动 / 重载 / 关闭流程收拢到一个结构体，宿主主循环只需持有它；
/// - **关键要素 (How)**
///   - `runtime`：全部组件管理器，按注册顺序排列；
///   - `properties`：与运行时共享的 [`ConfiguredProperties`]，重载时原子替换；
///   - `lifecycle`：串行化 `start` / `reload` / `shutdown`，避免两次重载交错地启停同一组件。
/// - **契约说明 (What)**
///   - [`Self::start`] 按“配置覆盖优先，其次元数据默认值”启用组件；
///   - [`Self::reload`] 先校验组件名再替换配置，校验失败时旧配置保持生效；
///   - [`Self::shutdown`] 消费宿主，按注册逆序处置全部组件。
/// - **风险提示 (Trade-offs)**
///   - 属性只在激活时读取，所以属性变化通过“禁用再启用”生效，期间组件短暂不可用。
pub struct Host {
    runtime: Arc<ComponentRuntime>,
    properties: ConfiguredProperties,
    lifecycle: Mutex<()>,
}

impl Host {
    pub(crate) fn new(runtime: Arc<ComponentRuntime>, properties: ConfiguredProperties) -> Self {
        Self {
            runtime,
            properties,
            lifecycle: Mutex::new(()),
        }
    }

    pub fn runtime(&self) -> &Arc<ComponentRuntime> {
        &self.runtime
    }

    pub fn registry(&self) -> &Arc<dyn ServiceRegistry> {
        self.runtime.registry()
    }

    /// 当前生效的配置快照。
    pub fn config(&self) -> Arc<HostConfig> {
        self.properties.snapshot()
    }

    pub fn manager(&self, name: &str) -> Option<ComponentManager> {
        self.runtime.manager(name)
    }

    /// 按配置启用组件，返回被启用的组件名。
    pub fn start(&self) -> Vec<String> {
        let _lifecycle = self.lifecycle.lock();
        let config = self.properties.snapshot();
        let mut started = Vec::new();
        for manager in self.runtime.managers() {
            let default = manager.metadata().is_enabled_by_default();
            if config.is_enabled(manager.name(), default) {
                manager.enable();
                started.push(manager.name().to_owned());
            }
        }
        tracing::info!(
            started = started.len(),
            registered = self.runtime.component_names().len(),
            "component host started"
        );
        started
    }

    pub fn enable(&self, name: &str) -> Result<(), ComponentError> {
        self.runtime.enable(name)
    }

    pub fn disable(&self, name: &str) -> Result<(), ComponentError> {
        self.runtime.disable(name)
    }

    /// 应用新配置。
    ///
    /// - **前置条件**：`next` 中的组件名必须全部已注册；
    /// - **后置条件**：新配置对之后的激活可见；启用开关与属性变化已反映到各组件；
    /// - **判定依据**：“是否在运行”取 [`ComponentManager::is_enable_requested`]，
    ///   而非可能滞后于并发排空的 `state()`。
    pub fn reload(&self, next: HostConfig) -> Result<ReloadReport, HostBuildError> {
        let _lifecycle = self.lifecycle.lock();
        for name in next.components.keys() {
            if self.runtime.manager(name).is_none() {
                return Err(HostBuildError::UnknownComponent { name: name.clone() });
            }
        }

        let previous = self.properties.replace(next);
        let current = self.properties.snapshot();
        let mut report = ReloadReport::default();
        for manager in self.runtime.managers() {
            let name = manager.name();
            let default = manager.metadata().is_enabled_by_default();
            let wanted = current.is_enabled(name, default);
            // 以最近提交的启停请求为准：组件可能在激活回调中自行禁用，
            // 此时 `state()` 仍停在中间状态，而请求标志已经落定。
            let running = manager.is_enable_requested();

            if wanted && !running {
                manager.enable();
                report.enabled.push(name.to_owned());
            } else if !wanted && running {
                manager.disable();
                report.disabled.push(name.to_owned());
            } else if wanted && previous.properties_for(name) != current.properties_for(name) {
                manager.disable();
                manager.enable();
                report.restarted.push(name.to_owned());
            }
        }

        tracing::info!(
            enabled = report.enabled.len(),
            disabled = report.disabled.len(),
            restarted = report.restarted.len(),
            "component host config reloaded"
        );
        Ok(report)
    }

    pub fn describe(&self) -> Vec<ComponentDescription> {
        self.runtime.describe()
    }

    /// 关闭宿主：按注册逆序处置全部组件。
    pub fn shutdown(self) -> ShutdownReport {
        let _lifecycle = self.lifecycle.lock();
        shutdown_runtime(&self.runtime)
    }
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("components", &self.runtime.component_names())
            .field("log_filter", &logging::installed_filter())
            .finish_non_exhaustive()
    }
}
