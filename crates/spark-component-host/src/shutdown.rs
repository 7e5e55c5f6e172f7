#![allow(clippy::module_name_repetitions)]

use std::fmt;

use spark_component::{ComponentRuntime, ComponentState, DeactivationReason};

/// 单个组件的关闭记录。
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ShutdownRecord {
    pub component: String,
    /// 关闭前的状态。
    pub previous: ComponentState,
    /// 关闭后的状态；正常情况下为 `Disposed`。
    pub outcome: ComponentState,
}

/// 宿主关闭报告，记录顺序即处置顺序。
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ShutdownReport {
    records: Vec<ShutdownRecord>,
}

impl ShutdownReport {
    pub fn records(&self) -> &[ShutdownRecord] {
        &self.records
    }

    /// 按处置顺序排列的组件名。
    pub fn order(&self) -> Vec<&str> {
        self.records
            .iter()
            .map(|record| record.component.as_str())
            .collect()
    }

    pub fn all_disposed(&self) -> bool {
        self.records
            .iter()
            .all(|record| record.outcome == ComponentState::Disposed)
    }

    /// 关闭前处于 `Active` 的组件数。
    pub fn active_before(&self) -> usize {
        self.records
            .iter()
            .filter(|record| record.previous == ComponentState::Active)
            .count()
    }
}

impl fmt::Display for ShutdownReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} component(s) shut down, {} were active",
            self.records.len(),
            self.active_before()
        )
    }
}

/// 按注册逆序处置运行时中的全部组件。
///
/// # 教案式注解
/// - **意图 (Why)**：后注册的组件通常依赖先注册的组件发布的服务，逆序处置让消费者先于提供者退出，
///   避免提供者撤销服务时引发一轮无意义的失活与重建；
/// - **契约 (What)**：每个组件收到 [`DeactivationReason::Shutdown`]，返回的报告保留处置顺序；
///   已处置的组件同样出现在报告中，`previous == outcome == Disposed`。
pub(crate) fn shutdown_runtime(runtime: &ComponentRuntime) -> ShutdownReport {
    let mut records = Vec::new();
    for manager in runtime.managers().into_iter().rev() {
        let previous = manager.state();
        manager.dispose_with(DeactivationReason::Shutdown);
        let outcome = manager.state();
        if outcome != ComponentState::Disposed {
            tracing::warn!(
                component = manager.name(),
                state = outcome.as_str(),
                "component did not reach disposed during shutdown"
            );
        }
        tracing::debug!(
            component = manager.name(),
            from = previous.as_str(),
            "component shut down"
        );
        records.push(ShutdownRecord {
            component: manager.name().to_owned(),
            previous,
            outcome,
        });
    }
    let report = ShutdownReport { records };
    tracing::info!(
        components = report.records.len(),
        active = report.active_before(),
        "component host shut down"
    );
    report
}
