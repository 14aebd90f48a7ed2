//! Bundle scheduling tests
//!
//! Tests for deferred bundle dispatch covering:
//! - Immediate time tags
//! - Future time tags (delay honoured)
//! - Past time tags (fire right away)
//! - Nested bundles with their own time tags
//! - Element order

use oscar_core::{Bundle, Message, Timetag};
use oscar_router::Dispatcher;
use oscar_test_utils::{MessageCollector, DEFAULT_TIMEOUT};
use std::time::{Duration, Instant, SystemTime};

fn collecting_dispatcher(addresses: &[&str]) -> (Dispatcher, MessageCollector) {
    let dispatcher = Dispatcher::new();
    let collector = MessageCollector::new();
    for address in addresses {
        dispatcher
            .register(address, collector.handler())
            .expect("register failed");
    }
    (dispatcher, collector)
}

#[tokio::test]
async fn test_immediate_bundle() {
    let (dispatcher, collector) = collecting_dispatcher(&["/now"]);

    let start = Instant::now();
    let scheduled = dispatcher.schedule(Bundle::immediate().element(Message::new("/now")));
    assert_eq!(scheduled.delay(), Duration::ZERO);

    scheduled.wait().await.expect("bundle never fired");
    assert_eq!(collector.count(), 1);
    assert!(start.elapsed() < Duration::from_millis(500));
}

#[tokio::test]
async fn test_dispatch_does_not_run_bundle_inline() {
    let (dispatcher, collector) = collecting_dispatcher(&["/later"]);

    let bundle = Bundle::new(Timetag::after(Duration::from_millis(300)))
        .element(Message::new("/later"));
    dispatcher.dispatch(bundle.into());

    assert_eq!(collector.count(), 0);
    assert!(collector.wait_for_count(1, DEFAULT_TIMEOUT).await);
}

#[tokio::test]
async fn test_future_bundle_is_deferred() {
    let (dispatcher, collector) = collecting_dispatcher(&["/deferred"]);

    let start = Instant::now();
    let bundle = Bundle::new(Timetag::after(Duration::from_secs(1)))
        .element(Message::new("/deferred").arg(1i32));
    let scheduled = dispatcher.schedule(bundle);

    assert!(scheduled.delay() > Duration::from_millis(900));
    scheduled.wait().await.expect("bundle never fired");

    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(900), "fired after {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(3), "fired after {:?}", elapsed);
    assert_eq!(collector.count(), 1);
}

#[tokio::test]
async fn test_past_bundle_fires_immediately() {
    let (dispatcher, collector) = collecting_dispatcher(&["/past"]);

    let past = Timetag::from_system_time(SystemTime::now() - Duration::from_secs(10));
    let scheduled = dispatcher.schedule(Bundle::new(past).element(Message::new("/past")));

    assert_eq!(scheduled.delay(), Duration::ZERO);
    scheduled.wait().await.unwrap();
    assert_eq!(collector.count(), 1);
}

#[tokio::test]
async fn test_elements_dispatched_in_order() {
    let (dispatcher, collector) = collecting_dispatcher(&["/seq/a", "/seq/b", "/seq/c"]);

    let bundle = Bundle::immediate()
        .element(Message::new("/seq/a"))
        .element(Message::new("/seq/b"))
        .element(Message::new("/seq/c"));
    dispatcher.schedule(bundle).wait().await.unwrap();

    let addresses: Vec<_> = collector
        .messages()
        .into_iter()
        .map(|m| m.address)
        .collect();
    assert_eq!(addresses, vec!["/seq/a", "/seq/b", "/seq/c"]);
}

#[tokio::test]
async fn test_nested_bundle_keeps_its_own_time_tag() {
    let (dispatcher, collector) = collecting_dispatcher(&["/outer", "/inner"]);

    let start = Instant::now();
    let inner = Bundle::new(Timetag::after(Duration::from_millis(400)))
        .element(Message::new("/inner"));
    let outer = Bundle::immediate()
        .element(Message::new("/outer"))
        .element(inner);

    dispatcher.schedule(outer).wait().await.unwrap();
    assert!(collector.has_address("/outer"));
    assert!(!collector.has_address("/inner"));

    assert!(collector.wait_for_count(2, DEFAULT_TIMEOUT).await);
    assert!(start.elapsed() >= Duration::from_millis(350));

    let stats = dispatcher.stats();
    assert_eq!(stats.bundles_scheduled, 2);
}

#[tokio::test]
async fn test_panic_inside_bundle_does_not_kill_scheduler() {
    let (dispatcher, collector) = collecting_dispatcher(&["/ok"]);
    dispatcher
        .register("/boom", |_: &Message| panic!("bundle element failure"))
        .unwrap();

    let bundle = Bundle::immediate()
        .element(Message::new("/boom"))
        .element(Message::new("/ok"));
    dispatcher.schedule(bundle).wait().await.unwrap();

    assert_eq!(collector.count(), 1);
    assert_eq!(dispatcher.stats().handler_panics, 1);
}

#[tokio::test(flavor = "current_thread")]
async fn test_slow_method_in_bundle_does_not_stall_runtime() {
    let dispatcher = Dispatcher::new();
    dispatcher
        .register("/slow", |_: &Message| {
            std::thread::sleep(Duration::from_millis(300));
        })
        .unwrap();

    let scheduled = dispatcher.schedule(Bundle::immediate().element(Message::new("/slow")));

    // Let the scheduler task start the bundle, then time a short timer
    tokio::task::yield_now().await;
    let start = Instant::now();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(start.elapsed() < Duration::from_millis(200));

    scheduled.wait().await.expect("bundle never fired");
}
