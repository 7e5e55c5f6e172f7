//! 绑定策略测试：静态 / 动态、勉强 / 贪婪、各基数下的绑定与解绑协议。
//!
//! # 教案级导览
//!
//! - **Why**：依赖管理器决定“服务到达 / 离开时组件看到什么”，任何偏差都会表现为多余的
//!   失活或错序的钩子调用；
//! - **How**：以 `support::Journal` 记录钩子序列，逐步发布 / 撤销服务并比对期望序列；
//! - **What**：覆盖基数下限判定、贪婪替换的“先绑后解”、勉强策略的保留、静态策略的整体重建，
//!   以及失活时的逆序解绑。

mod support;

use std::sync::Arc;

use spark_component::{
    Cardinality, ComponentState, DeactivationReason, Properties, ReferenceMetadata,
    ReferencePolicy, ReferencePolicyOption, TargetFilter,
};
use support::{Event, Fixture, assert_trackers_cleared};

fn dynamic(name: &str, interface: &str) -> ReferenceMetadata {
    ReferenceMetadata::new(name, interface).policy(ReferencePolicy::Dynamic)
}

fn lost(reference: &str) -> Event {
    Event::Deactivate(DeactivationReason::ReferenceLost(reference.to_owned()))
}

#[test]
fn satisfaction_follows_tracker_size_for_every_cardinality() {
    for cardinality in [
        Cardinality::OptionalUnary,
        Cardinality::MandatoryUnary,
        Cardinality::OptionalMultiple,
        Cardinality::MandatoryMultiple,
    ] {
        let fixture = Fixture::new();
        let manager = fixture.register("web", vec![dynamic("db", "Db").cardinality(cardinality)]);
        let dependency = manager.dependency_manager("db").expect("依赖已声明");

        let check = |step: &str| {
            for instance in manager.instances() {
                let context = instance.context();
                let bound = context.peek_edge_info(0).map_or(0, |tracker| tracker.len());
                let expected = cardinality.minimum() == 0 || bound >= cardinality.minimum();
                assert_eq!(
                    dependency.is_satisfied(context),
                    expected,
                    "{cardinality} 在 {step} 后的满足性应由追踪器大小决定"
                );
                if manager.state() == ComponentState::Active {
                    assert!(dependency.is_satisfied(context), "Active 组件的依赖必须满足");
                }
            }
        };

        manager.enable();
        check("enable");
        let first = fixture.publish("Db", 0);
        check("first publish");
        let second = fixture.publish("Db", 1);
        check("second publish");
        fixture.withdraw(&first);
        check("first withdraw");
        fixture.withdraw(&second);
        check("second withdraw");

        let expected = if cardinality.is_mandatory() {
            ComponentState::Unsatisfied
        } else {
            ComponentState::Active
        };
        assert_eq!(manager.state(), expected, "{cardinality} 最终状态");
    }
}

#[test]
fn greedy_single_switches_with_one_bind_then_one_unbind() {
    let fixture = Fixture::new();
    let manager = fixture.register(
        "web",
        vec![dynamic("db", "Db").policy_option(ReferencePolicyOption::Greedy)],
    );
    let low = fixture.publish("Db", 0);
    manager.enable();
    fixture.journal.take();

    fixture.publish("Db", -5);
    assert!(fixture.journal.events().is_empty(), "排序更低的服务不会触发切换");

    let high = fixture.publish("Db", 10);
    assert_eq!(
        fixture.journal.take(),
        vec![
            Event::Bind("db".to_owned(), high.id()),
            Event::Unbind("db".to_owned(), low.id())
        ],
        "贪婪替换必须恰好一次 bind 后接一次 unbind"
    );
    assert_eq!(manager.state(), ComponentState::Active);
    assert_eq!(
        manager.instances()[0].context().locate_service("db"),
        Some(high)
    );
}

#[test]
fn greedy_single_keeps_earlier_service_on_equal_ranking() {
    let fixture = Fixture::new();
    let manager = fixture.register(
        "web",
        vec![dynamic("db", "Db").policy_option(ReferencePolicyOption::Greedy)],
    );
    let earlier = fixture.publish("Db", 5);
    manager.enable();
    fixture.journal.take();

    fixture.publish("Db", 5);
    assert!(fixture.journal.events().is_empty(), "同等排序时先注册者优先");
    assert_eq!(
        manager.instances()[0].context().locate_service("db"),
        Some(earlier)
    );
}

#[test]
fn reluctant_single_keeps_binding_until_departure() {
    let fixture = Fixture::new();
    let manager = fixture.register("web", vec![dynamic("db", "Db")]);
    let a = fixture.publish("Db", 0);
    manager.enable();
    fixture.journal.take();

    let b = fixture.publish("Db", 10);
    assert!(fixture.journal.events().is_empty(), "勉强策略保留现有绑定");

    fixture.withdraw(&a);
    assert_eq!(
        fixture.journal.take(),
        vec![
            Event::Bind("db".to_owned(), b.id()),
            Event::Unbind("db".to_owned(), a.id())
        ]
    );
    assert_eq!(manager.state(), ComponentState::Active);
    assert_eq!(fixture.journal.deactivations(), 0);
    assert_eq!(
        manager.instances()[0].context().locate_service("db"),
        Some(b)
    );
}

#[test]
fn dynamic_mandatory_single_without_replacement_deactivates() {
    let fixture = Fixture::new();
    let manager = fixture.register("web", vec![dynamic("db", "Db")]);
    let a = fixture.publish("Db", 0);
    manager.enable();
    fixture.journal.take();

    fixture.withdraw(&a);
    assert_eq!(manager.state(), ComponentState::Unsatisfied);
    assert_eq!(
        fixture.journal.take(),
        vec![lost("db"), Event::Unbind("db".to_owned(), a.id())]
    );
    assert_trackers_cleared(&manager);

    let c = fixture.publish("Db", 0);
    assert_eq!(manager.state(), ComponentState::Active, "新服务到达后重新激活");
    assert_eq!(
        manager.instances()[0].context().locate_service("db"),
        Some(c)
    );
}

#[test]
fn dynamic_optional_single_binds_and_unbinds_in_place() {
    let fixture = Fixture::new();
    let manager = fixture.register(
        "web",
        vec![dynamic("cache", "Cache").cardinality(Cardinality::OptionalUnary)],
    );
    manager.enable();
    assert_eq!(manager.state(), ComponentState::Active, "可选依赖不阻塞激活");
    fixture.journal.take();

    let cache = fixture.publish("Cache", 0);
    fixture.withdraw(&cache);
    assert_eq!(
        fixture.journal.take(),
        vec![
            Event::Bind("cache".to_owned(), cache.id()),
            Event::Unbind("cache".to_owned(), cache.id())
        ]
    );
    assert_eq!(manager.state(), ComponentState::Active);
    assert!(manager.instances()[0].context().locate_service("cache").is_none());
}

#[test]
fn dynamic_multiple_tracks_every_service() {
    let fixture = Fixture::new();
    let manager = fixture.register(
        "web",
        vec![dynamic("plugins", "Plugin").cardinality(Cardinality::OptionalMultiple)],
    );
    manager.enable();
    let low = fixture.publish("Plugin", 0);
    let high = fixture.publish("Plugin", 9);
    let middle = fixture.publish("Plugin", 4);

    let context = manager.instances()[0].context().clone();
    assert_eq!(
        context.locate_services("plugins"),
        vec![high.clone(), middle.clone(), low.clone()],
        "多值绑定按排序从优到劣返回"
    );
    assert_eq!(
        context.locate_service_ref("plugins", &middle),
        Some(middle.clone())
    );

    fixture.withdraw(&middle);
    assert!(context.locate_service_ref("plugins", &middle).is_none());
    assert_eq!(fixture.journal.binds(), 3);
    assert_eq!(fixture.journal.unbinds(), 1);
    assert_eq!(fixture.journal.deactivations(), 0);
}

#[test]
fn dynamic_mandatory_multiple_deactivates_when_last_service_leaves() {
    let fixture = Fixture::new();
    let manager = fixture.register(
        "web",
        vec![dynamic("plugins", "Plugin").cardinality(Cardinality::MandatoryMultiple)],
    );
    let first = fixture.publish("Plugin", 0);
    let second = fixture.publish("Plugin", 0);
    manager.enable();
    fixture.journal.take();

    fixture.withdraw(&first);
    assert_eq!(manager.state(), ComponentState::Active);
    assert_eq!(
        fixture.journal.take(),
        vec![Event::Unbind("plugins".to_owned(), first.id())]
    );

    fixture.withdraw(&second);
    assert_eq!(manager.state(), ComponentState::Unsatisfied);
    assert_eq!(
        fixture.journal.take(),
        vec![lost("plugins"), Event::Unbind("plugins".to_owned(), second.id())]
    );
}

#[test]
fn static_mandatory_unbind_deactivates_exactly_once() {
    let fixture = Fixture::new();
    let manager = fixture.register("web", vec![ReferenceMetadata::new("db", "Db")]);
    let a = fixture.publish("Db", 0);
    let b = fixture.publish("Db", -1);
    manager.enable();
    fixture.journal.take();

    fixture.withdraw(&a);
    assert_eq!(
        fixture.journal.take(),
        vec![
            lost("db"),
            Event::Unbind("db".to_owned(), a.id()),
            Event::Construct,
            Event::Bind("db".to_owned(), b.id()),
            Event::Activate,
        ],
        "静态绑定不做局部修补，只做整体重建"
    );
    assert_eq!(manager.state(), ComponentState::Active);
}

#[test]
fn static_optional_defers_arrivals_until_next_activation() {
    let fixture = Fixture::new();
    let manager = fixture.register(
        "web",
        vec![ReferenceMetadata::new("cache", "Cache").cardinality(Cardinality::OptionalUnary)],
    );
    manager.enable();
    fixture.journal.take();

    let cache = fixture.publish("Cache", 0);
    assert!(fixture.journal.events().is_empty(), "静态依赖的新服务不会注入到运行中的实例");
    assert!(manager.instances()[0].context().locate_service("cache").is_none());

    manager.disable();
    manager.enable();
    assert_eq!(
        manager.instances()[0].context().locate_service("cache"),
        Some(cache.clone())
    );

    fixture.journal.take();
    fixture.withdraw(&cache);
    assert_eq!(fixture.journal.deactivations(), 1, "静态可选依赖的已绑定服务离开也要重建");
    assert_eq!(fixture.journal.activations(), 1);
    assert_eq!(manager.state(), ComponentState::Active);
}

#[test]
fn deactivation_unbinds_in_reverse_bind_order() {
    let fixture = Fixture::new();
    let manager = fixture.register(
        "web",
        vec![
            ReferenceMetadata::new("db", "Db"),
            dynamic("plugins", "Plugin").cardinality(Cardinality::OptionalMultiple),
        ],
    );
    let db = fixture.publish("Db", 0);
    let p1 = fixture.publish("Plugin", 0);
    manager.enable();
    let p2 = fixture.publish("Plugin", 0);
    fixture.journal.take();

    manager.disable();
    assert_eq!(
        fixture.journal.take(),
        vec![
            Event::Deactivate(DeactivationReason::Disabled),
            Event::Unbind("plugins".to_owned(), p2.id()),
            Event::Unbind("plugins".to_owned(), p1.id()),
            Event::Unbind("db".to_owned(), db.id()),
        ]
    );
}

#[test]
fn target_filter_restricts_candidates() {
    let fixture = Fixture::new();
    let manager = fixture.register(
        "web",
        vec![
            ReferenceMetadata::new("db", "Db")
                .target(TargetFilter::interface("Db").with_property("region", "eu")),
        ],
    );
    manager.enable();
    fixture.publish("Db", 0);
    assert_eq!(manager.state(), ComponentState::Unsatisfied);

    let mut properties = Properties::new();
    properties.insert("region".to_owned(), "eu".into());
    let eu = fixture
        .registry
        .register("Db", 0, properties, Arc::new(()));
    assert_eq!(manager.state(), ComponentState::Active);
    assert_eq!(
        manager
            .dependency_manager("db")
            .expect("依赖已声明")
            .candidates(),
        vec![eu]
    );
}
