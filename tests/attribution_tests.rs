//! Integration tests for self/total time attribution across nested calls and
//! deferred continuations (timers, tasks and event listeners)

use frametrack::clock::ManualClock;
use frametrack::config::ProfilerConfig;
use frametrack::context::ContinuationKind;
use frametrack::event_loop::EventLoop;
use frametrack::{Profiler, Trackable, Tracked};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[derive(Clone)]
struct Env {
    clock: ManualClock,
    profiler: Profiler,
    event_loop: EventLoop,
    events: Rc<Cell<u32>>,
}

impl Env {
    fn new() -> Self {
        let clock = ManualClock::new();
        let profiler = Profiler::new(ProfilerConfig::default(), clock.clone()).unwrap();
        profiler.track::<FirstModule>(None).unwrap();
        profiler.track::<SecondModule>(None).unwrap();
        profiler.track::<ThirdModule>(None).unwrap();
        Self {
            clock,
            profiler,
            event_loop: EventLoop::new(),
            events: Rc::new(Cell::new(0)),
        }
    }

    fn first(&self) -> Tracked<FirstModule> {
        Tracked::new(&self.profiler, FirstModule { env: self.clone() })
    }

    fn second(&self) -> Tracked<SecondModule> {
        Tracked::new(
            &self.profiler,
            SecondModule {
                env: self.clone(),
                sub: self.first(),
            },
        )
    }

    /// Run every pending job and report the class totals of the open frame
    fn drain(&self) -> frametrack::frames::FrameStats {
        self.event_loop.run_until_idle();
        self.profiler.close_frame().unwrap()
    }
}

struct FirstModule {
    env: Env,
}

impl Trackable for FirstModule {
    const CLASS_NAME: &'static str = "FirstModule";
    const METHODS: &'static [&'static str] = &[
        "simple_sync_task",
        "simple_async_task",
        "simple_promise_task",
        "simple_event_task",
    ];
}

fn simple_sync_task(m: &mut Tracked<FirstModule>) {
    m.invoke("simple_sync_task", |m, _| m.env.clock.advance(10.0));
}

fn simple_async_task(m: &mut Tracked<FirstModule>) {
    m.invoke("simple_async_task", |m, scope| {
        let clock = m.env.clock.clone();
        m.env
            .event_loop
            .set_timeout(1, scope.defer(ContinuationKind::Timer), move |_| {
                clock.advance(11.0)
            });
    });
}

fn simple_promise_task(m: &mut Tracked<FirstModule>) {
    m.invoke("simple_promise_task", |m, scope| {
        let clock = m.env.clock.clone();
        m.env
            .event_loop
            .queue_task(scope.defer(ContinuationKind::Task), move |_| {
                clock.advance(12.0)
            });
    });
}

/// Installs a listener and fires it from a timer; the listener's wait is
/// not attributed but the 13ms it spends inside the timer are
fn simple_event_task(m: &mut Tracked<FirstModule>) {
    m.invoke("simple_event_task", |m, scope| {
        let env = &m.env;
        env.events.set(env.events.get() + 1);
        let event = format!("test-event-{}", env.events.get());

        let clock = env.clock.clone();
        env.event_loop
            .add_listener(&event, scope.defer(ContinuationKind::Listener), move |_| {
                clock.advance(13.0)
            });
        let dispatcher = env.event_loop.clone();
        env.event_loop
            .set_timeout(2, scope.defer(ContinuationKind::Timer), move |_| {
                dispatcher.dispatch(&event)
            });
    });
}

struct SecondModule {
    env: Env,
    sub: Tracked<FirstModule>,
}

impl Trackable for SecondModule {
    const CLASS_NAME: &'static str = "SecondModule";
    const METHODS: &'static [&'static str] = &["complex_sync_task", "complex_async_task"];
}

fn complex_sync_task(m: &mut Tracked<SecondModule>) {
    m.invoke("complex_sync_task", |m, _| {
        m.env.clock.advance(20.0);
        simple_sync_task(&mut m.sub);
    });
}

fn complex_async_task(m: &mut Tracked<SecondModule>) {
    m.invoke("complex_async_task", |m, scope| {
        m.env.clock.advance(21.0);
        simple_async_task(&mut m.sub);
        simple_promise_task(&mut m.sub);
        let clock = m.env.clock.clone();
        m.env
            .event_loop
            .queue_task(scope.defer(ContinuationKind::Task), move |_| {
                clock.advance(22.0)
            });
        simple_event_task(&mut m.sub);
    });
}

struct ThirdModule {
    env: Env,
    sub1: Rc<RefCell<Tracked<FirstModule>>>,
    sub2: Rc<RefCell<Tracked<SecondModule>>>,
}

impl Trackable for ThirdModule {
    const CLASS_NAME: &'static str = "ThirdModule";
    const METHODS: &'static [&'static str] = &["complex_task"];
}

fn complex_task(m: &mut Tracked<ThirdModule>) {
    m.invoke("complex_task", |m, scope| {
        m.env.clock.advance(30.0);
        simple_sync_task(&mut m.sub1.borrow_mut());
        complex_sync_task(&mut m.sub2.borrow_mut());
        simple_promise_task(&mut m.sub1.borrow_mut());

        let clock = m.env.clock.clone();
        let sub1 = Rc::clone(&m.sub1);
        let sub2 = Rc::clone(&m.sub2);
        m.env
            .event_loop
            .queue_task(scope.defer(ContinuationKind::Task), move |_| {
                clock.advance(31.0);
                complex_async_task(&mut sub2.borrow_mut());
                simple_event_task(&mut sub1.borrow_mut());
            });
    });
}

#[test]
fn test_one_class_sync_and_async() {
    let env = Env::new();
    let mut inst = env.first();
    simple_sync_task(&mut inst);
    simple_async_task(&mut inst);
    simple_promise_task(&mut inst);

    let frame = env.drain();
    assert_eq!(frame.class_spent_ms("FirstModule"), 10.0 + 11.0 + 12.0);
    for method in ["simple_sync_task", "simple_async_task", "simple_promise_task"] {
        assert_eq!(frame.method("FirstModule", method).unwrap().call_count, 1);
    }
}

#[test]
fn test_one_class_with_event_task() {
    let env = Env::new();
    let mut inst = env.first();
    simple_sync_task(&mut inst);
    simple_event_task(&mut inst);

    let frame = env.drain();
    assert_eq!(frame.class_spent_ms("FirstModule"), 10.0 + 13.0);
    assert_eq!(
        frame.method("FirstModule", "simple_event_task").unwrap().spent_total_ms,
        13.0
    );
}

#[test]
fn test_two_instances_side_by_side() {
    let env = Env::new();
    let mut a = env.first();
    let mut b = env.first();
    simple_sync_task(&mut a);
    simple_sync_task(&mut a);
    simple_async_task(&mut a);
    simple_promise_task(&mut b);
    simple_async_task(&mut b);
    simple_event_task(&mut b);

    let frame = env.drain();
    assert_eq!(
        frame.class_spent_ms("FirstModule"),
        10.0 + 10.0 + 11.0 + 11.0 + 12.0 + 13.0
    );
    assert_eq!(frame.method("FirstModule", "simple_sync_task").unwrap().call_count, 2);
    assert_eq!(frame.method("FirstModule", "simple_async_task").unwrap().call_count, 2);
    assert_eq!(frame.classes["FirstModule"].instance_count, 2);
}

#[test]
fn test_two_nested_classes_sync() {
    let env = Env::new();
    let mut inst = env.second();
    complex_sync_task(&mut inst);

    let frame = env.drain();
    assert_eq!(frame.class_spent_ms("FirstModule"), 10.0);
    assert_eq!(frame.class_spent_ms("SecondModule"), 20.0);

    let outer = env
        .profiler
        .completed_invocations()
        .into_iter()
        .find(|s| s.method == "complex_sync_task")
        .unwrap();
    assert_eq!(outer.self_ms, 20.0);
    assert_eq!(outer.total_ms, 30.0);
}

#[test]
fn test_two_nested_classes_async() {
    let env = Env::new();
    let mut inst = env.second();
    let id = inst.invoke("complex_async_task", |_, scope| scope.identity());
    assert!(id.is_some());
    complex_async_task(&mut inst);

    let frame = env.drain();
    assert_eq!(frame.class_spent_ms("FirstModule"), 11.0 + 12.0 + 13.0);
    assert_eq!(frame.class_spent_ms("SecondModule"), 21.0 + 22.0);
    assert_eq!(
        frame.method("SecondModule", "complex_async_task").unwrap().call_count,
        2
    );
}

#[test]
fn test_nested_async_total_includes_descendants() {
    let env = Env::new();
    let mut inst = env.second();
    complex_async_task(&mut inst);
    env.event_loop.run_until_idle();

    // the installed listener keeps the invocation live
    let summary = env
        .profiler
        .invocation(frametrack::context::InvocationId::new(1))
        .unwrap();
    assert_eq!(summary.method, "complex_async_task");
    assert!(!summary.retired);
    assert_eq!(summary.self_ms, 21.0);
    assert_eq!(summary.total_ms, 21.0 + 11.0 + 12.0 + 22.0 + 13.0);
}

#[test]
fn test_three_nested_classes() {
    let env = Env::new();
    let mut inst = Tracked::new(
        &env.profiler,
        ThirdModule {
            env: env.clone(),
            sub1: Rc::new(RefCell::new(env.first())),
            sub2: Rc::new(RefCell::new(env.second())),
        },
    );
    complex_task(&mut inst);

    let frame = env.drain();
    assert_eq!(
        frame.class_spent_ms("FirstModule"),
        10.0 + 10.0 + 12.0 + 13.0 + 11.0 + 12.0 + 13.0
    );
    assert_eq!(frame.class_spent_ms("SecondModule"), 20.0 + 21.0 + 22.0);
    assert_eq!(frame.class_spent_ms("ThirdModule"), 30.0 + 31.0);

    let calls = |class: &str, method: &str| frame.method(class, method).unwrap().call_count;
    assert_eq!(calls("FirstModule", "simple_sync_task"), 2);
    assert_eq!(calls("FirstModule", "simple_async_task"), 1);
    assert_eq!(calls("FirstModule", "simple_promise_task"), 2);
    assert_eq!(calls("FirstModule", "simple_event_task"), 2);
    assert_eq!(calls("SecondModule", "complex_sync_task"), 1);
    assert_eq!(calls("SecondModule", "complex_async_task"), 1);
    assert_eq!(calls("ThirdModule", "complex_task"), 1);
}

#[test]
fn test_listener_wait_is_not_attributed() {
    let env = Env::new();
    let mut inst = env.first();
    inst.invoke("simple_event_task", |m, scope| {
        let clock = m.env.clock.clone();
        m.env
            .event_loop
            .add_listener("idle", scope.defer(ContinuationKind::Listener), move |_| {
                clock.advance(500.0)
            });
    });
    env.event_loop.emit("idle");

    let frame = env.drain();
    assert_eq!(frame.class_spent_ms("FirstModule"), 0.0);
}

#[test]
fn test_tracked_call_inside_listener_is_measured() {
    let env = Env::new();
    let listener_target = Rc::new(RefCell::new(env.first()));
    let mut inst = env.first();
    let target = Rc::clone(&listener_target);
    inst.invoke("simple_event_task", |m, scope| {
        m.env
            .event_loop
            .add_listener("click", scope.defer(ContinuationKind::Listener), move |_| {
                simple_sync_task(&mut target.borrow_mut())
            });
    });
    env.event_loop.emit("click");

    let frame = env.drain();
    assert_eq!(frame.class_spent_ms("FirstModule"), 10.0);
    assert_eq!(
        frame.method("FirstModule", "simple_event_task").unwrap().spent_total_ms,
        0.0
    );
}

#[test]
fn test_dropped_continuation_never_runs_or_counts() {
    let env = Env::new();
    let mut inst = env.first();
    let continuation = inst.invoke("simple_async_task", |m, scope| {
        m.env.clock.advance(1.0);
        scope.defer(ContinuationKind::Timer)
    });
    let origin = continuation.origin().unwrap();
    assert!(!env.profiler.invocation(origin).unwrap().retired);

    drop(continuation);
    let summary = env.profiler.invocation(origin).unwrap();
    assert!(summary.retired);
    assert_eq!(summary.total_ms, 1.0);
}

#[test]
fn test_recursive_calls_get_distinct_identities() {
    struct Walker;
    impl Trackable for Walker {
        const CLASS_NAME: &'static str = "Walker";
        const METHODS: &'static [&'static str] = &["walk"];
    }

    fn walk(w: &Tracked<Walker>, clock: &ManualClock, depth: u32) {
        w.call("walk", |_, _| {
            clock.advance(1.0);
            if depth > 0 {
                walk(w, clock, depth - 1);
            }
        });
    }

    let env = Env::new();
    env.profiler.track::<Walker>(None).unwrap();
    let walker = Tracked::new(&env.profiler, Walker);
    walk(&walker, &env.clock, 3);

    let summaries = env.profiler.completed_invocations();
    assert_eq!(summaries.len(), 4);
    let totals: Vec<f64> = summaries.iter().map(|s| s.total_ms).collect();
    assert_eq!(totals, vec![1.0, 2.0, 3.0, 4.0]);
    assert!(summaries.iter().all(|s| s.self_ms == 1.0));

    let frame = env.drain();
    assert_eq!(frame.class_spent_ms("Walker"), 4.0);
    assert_eq!(frame.method("Walker", "walk").unwrap().call_count, 4);
}
