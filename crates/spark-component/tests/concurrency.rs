//! 多线程下的组件生命周期测试。
//!
//! # 教案级导览
//!
//! - **Why**：服务注册、撤销与启停请求可能来自任意线程，每个组件的跃迁队列必须把它们串行化，
//!   既不丢失事件，也不在钩子之间交错；
//! - **How**：以 `std::thread` 构造真实竞争，线程结束后检查绑定集合、钩子计数与跃迁序列；
//! - **What**：覆盖服务抖动下持久服务不受影响、并发启停的最终一致性、工厂实例并发创建，
//!   以及撤销派发途中启用的组件不会绑定已撤销的服务。

mod support;

use std::collections::HashSet;
use std::sync::{Arc, Barrier, mpsc};
use std::thread;

use parking_lot::Mutex;
use spark_component::{
    Cardinality, ComponentMetadata, ComponentState, Properties, ReferenceMetadata,
    ReferencePolicy, ServiceEvent, ServiceListener, ServiceRegistry, TargetFilter,
};
use support::Fixture;

const THREADS: usize = 4;
const ROUNDS: usize = 50;

/// ## 测试一：服务抖动不影响持久绑定
///
/// - **意图 (Why)**：多值动态依赖在瞬时服务反复进出时，不应波及一直在册的服务；
/// - **逻辑 (How)**：持久服务先发布并完成激活，多个线程随后循环“发布即撤销”；
/// - **契约 (What)**：
///   - **后置条件**：组件保持 `Active`，仅持久服务仍被绑定，失活次数为零，
///     且 `bind` 次数恰好比 `unbind` 多一（持久服务那一次）。
#[test]
fn transient_churn_leaves_persistent_binding_intact() {
    let fixture = Arc::new(Fixture::new());
    let manager = fixture.register(
        "web",
        vec![
            ReferenceMetadata::new("db", "Db")
                .policy(ReferencePolicy::Dynamic)
                .cardinality(Cardinality::MandatoryMultiple),
        ],
    );
    let persistent = fixture.publish("Db", 0);
    manager.enable();
    assert_eq!(manager.state(), ComponentState::Active);

    let barrier = Arc::new(Barrier::new(THREADS));
    let workers: Vec<_> = (0..THREADS)
        .map(|worker| {
            let fixture = Arc::clone(&fixture);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for round in 0..ROUNDS {
                    let ranking = ((worker + round) % 7) as i32 - 3;
                    let transient = fixture.publish("Db", ranking);
                    fixture.withdraw(&transient);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("抖动线程不应 panic");
    }

    assert_eq!(manager.state(), ComponentState::Active);
    let context = manager.instances()[0].context().clone();
    assert_eq!(context.locate_services("db"), vec![persistent]);
    assert_eq!(fixture.journal.deactivations(), 0, "持久服务在册时不应失活");
    assert_eq!(fixture.journal.binds(), fixture.journal.unbinds() + 1);
}

/// ## 测试二：并发启停的最终一致性
///
/// - **意图 (Why)**：`enable` / `disable` 可能同时来自宿主与组件自身；
/// - **逻辑 (How)**：多个线程交替启停同一组件，结束后统一禁用并检查跃迁序列；
/// - **契约 (What)**：
///   - **后置条件**：监听器看到的跃迁首尾相接且均合法，禁用后钩子收支平衡，
///     再次启用可以正常激活。
#[test]
fn concurrent_enable_disable_converges() {
    let fixture = Arc::new(Fixture::new());
    let manager = fixture.register(
        "web",
        vec![ReferenceMetadata::new("db", "Db").policy(ReferencePolicy::Dynamic)],
    );
    fixture.publish("Db", 0);

    let barrier = Arc::new(Barrier::new(THREADS));
    let workers: Vec<_> = (0..THREADS)
        .map(|worker| {
            let manager = manager.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for round in 0..ROUNDS {
                    if (worker + round) % 2 == 0 {
                        manager.enable();
                    } else {
                        manager.disable();
                    }
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("启停线程不应 panic");
    }

    let state = manager.state();
    assert!(
        matches!(state, ComponentState::Active | ComponentState::Disabled),
        "静止时只可能停在 Active 或 Disabled，实际为 {state}"
    );

    manager.disable();
    assert_eq!(manager.state(), ComponentState::Disabled);
    assert_eq!(fixture.journal.binds(), fixture.journal.unbinds());
    assert_eq!(fixture.journal.activations(), fixture.journal.deactivations());

    let changes = fixture.states.changes();
    for window in changes.windows(2) {
        assert_eq!(window[0].2, window[1].1, "跃迁必须首尾相接");
    }
    for (_, from, to) in &changes {
        assert!(from.can_transition_to(*to), "非法跃迁 {from} -> {to}");
    }

    manager.enable();
    assert_eq!(manager.state(), ComponentState::Active);
}

/// ## 测试三：工厂实例的并发创建
///
/// - **意图 (Why)**：宿主可能从多个线程同时请求新实例；
/// - **逻辑 (How)**：每个线程创建若干实例并回传标识，结束后检查标识与追踪器；
/// - **契约 (What)**：
///   - **后置条件**：标识两两不同，全部实例处于激活态，各自持有独立追踪器。
#[test]
fn concurrent_factory_instances_are_isolated() {
    let fixture = Arc::new(Fixture::new());
    let metadata = ComponentMetadata::builder("worker", fixture.recording_class())
        .reference(
            ReferenceMetadata::new("queue", "Queue")
                .policy(ReferencePolicy::Dynamic)
                .cardinality(Cardinality::MandatoryMultiple),
        )
        .factory("worker.factory")
        .build()
        .expect("合法元数据");
    let manager = fixture.runtime.register(metadata).expect("注册成功");
    manager.enable();
    fixture.publish("Queue", 0);
    assert_eq!(manager.state(), ComponentState::Satisfied);

    const PER_THREAD: usize = 8;
    let barrier = Arc::new(Barrier::new(THREADS));
    let workers: Vec<_> = (0..THREADS)
        .map(|_| {
            let manager = manager.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                (0..PER_THREAD)
                    .map(|_| {
                        manager
                            .new_instance(Properties::new())
                            .expect("满足后可创建实例")
                            .id()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut ids = HashSet::new();
    for worker in workers {
        for id in worker.join().expect("创建线程不应 panic") {
            assert!(ids.insert(id), "实例标识 {id} 重复");
        }
    }
    assert_eq!(ids.len(), THREADS * PER_THREAD);

    let instances = manager.instances();
    assert_eq!(instances.len(), THREADS * PER_THREAD);
    assert_eq!(manager.state(), ComponentState::Active);

    let mut trackers = HashSet::new();
    for instance in &instances {
        let tracker = instance
            .context()
            .peek_edge_info(0)
            .expect("激活后追踪器已分配");
        assert_eq!(tracker.len(), 1);
        assert!(
            trackers.insert(Arc::as_ptr(&tracker) as usize),
            "追踪器不得跨实例共享"
        );
    }
}

/// 在 `Unregistering` 回调中停住撤销线程，直到测试放行。
struct Gate {
    entered: Mutex<mpsc::Sender<()>>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl ServiceListener for Gate {
    fn service_changed(&self, event: &ServiceEvent) {
        if matches!(event, ServiceEvent::Unregistering(_)) {
            self.entered.lock().send(()).expect("测试线程仍在等待");
            self.release.lock().recv().expect("测试线程会放行");
        }
    }
}

/// ## 测试四：撤销派发途中启用的组件
///
/// - **意图 (Why)**：撤销线程正在派发 `Unregistering` 时，另一线程启用依赖该服务的组件；
///   新订阅收不到这次派发，若候选快照仍包含该服务，组件会带着已撤销的绑定停在 `Active`；
/// - **逻辑 (How)**：先登记一个会在撤销回调里阻塞的监听器，在它阻塞期间启用组件，再放行；
/// - **契约 (What)**：
///   - **后置条件**：组件始终停在 `Unsatisfied`，从未构造实现对象，也不持有任何绑定。
#[test]
fn enable_during_withdrawal_never_binds_departing_service() {
    let fixture = Arc::new(Fixture::new());
    let manager = fixture.register("web", vec![ReferenceMetadata::new("db", "Db")]);
    let departing = fixture.publish("Db", 0);

    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    fixture.registry.subscribe(
        &TargetFilter::interface("Db"),
        Arc::new(Gate {
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        }),
    );

    let withdrawing = {
        let fixture = Arc::clone(&fixture);
        let departing = departing.clone();
        thread::spawn(move || fixture.registry.unregister(&departing))
    };
    entered_rx.recv().expect("撤销线程应进入回调");

    manager.enable();
    assert_eq!(manager.state(), ComponentState::Unsatisfied);
    assert!(
        fixture.registry.current_candidates(&TargetFilter::interface("Db")).is_empty(),
        "撤销派发期间服务已不在候选快照中"
    );

    release_tx.send(()).expect("撤销线程仍在等待放行");
    assert!(withdrawing.join().expect("撤销线程不应 panic"));

    assert_eq!(manager.state(), ComponentState::Unsatisfied);
    let dependency = manager.dependency_manager("db").expect("依赖已声明");
    assert!(dependency.candidates().is_empty(), "已撤销的服务不得成为候选");
    assert_eq!(fixture.journal.count(|event| matches!(event, support::Event::Construct)), 0);
    assert!(
        manager.instances().iter().all(|instance| instance.context().locate_service("db").is_none()),
        "不得持有已撤销的绑定"
    );
}
