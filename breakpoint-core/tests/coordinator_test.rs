use breakpoint_core::{
    BreakController, BreakEvent, BreakpointCoordinator, BreakpointDefinition, BreakpointError,
    BreakpointPredicate, BreakpointRegistry, ChannelSink, Direction, DisplaySink, HoldPhase,
    HoldStatus, HttpMessage, ResponseData, UiContext,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

fn coordinator_with(sink: Arc<dyn DisplaySink>) -> Arc<BreakpointCoordinator> {
    let ui = UiContext::spawn("test-breakpoint-ui").unwrap();
    Arc::new(BreakpointCoordinator::new(sink, ui))
}

fn channel_coordinator() -> (Arc<BreakpointCoordinator>, Arc<ChannelSink>, mpsc::Receiver<BreakEvent>) {
    let (sink, rx) = ChannelSink::channel(64);
    let sink = Arc::new(sink);
    (coordinator_with(sink.clone()), sink, rx)
}

fn admin_breakpoint(coordinator: &BreakpointCoordinator) {
    coordinator.set_enabled_breakpoints(
        BreakpointRegistry::compile(&[BreakpointDefinition::url_contains("admin", "/admin")]).unwrap(),
    );
}

fn spawn_intercept(
    coordinator: &Arc<BreakpointCoordinator>,
    message: HttpMessage,
    direction: Direction,
) -> JoinHandle<(bool, HttpMessage)> {
    let coordinator = coordinator.clone();
    tokio::spawn(async move {
        let mut message = message;
        let forward = coordinator.intercept(&mut message, direction, false).await;
        (forward, message)
    })
}

async fn wait_for_status(controller: &BreakController, mut f: impl FnMut(&HoldStatus) -> bool) -> HoldStatus {
    let mut rx = controller.subscribe();
    let status = timeout(Duration::from_secs(5), rx.wait_for(|s| f(s)))
        .await
        .expect("timed out waiting for hold status")
        .expect("hold state closed");
    *status
}

async fn wait_displayed(controller: &BreakController, episode: u64) {
    wait_for_status(controller, |s| s.phase == HoldPhase::Displayed && s.episode == episode).await;
}

#[tokio::test]
async fn test_empty_registry_forwards_without_hold() {
    let (coordinator, _sink, mut events) = channel_coordinator();
    let mut msg = HttpMessage::new("GET", "https://example.com/admin");

    assert!(!coordinator.is_breakpoint(&msg, Direction::Request, false));
    let started = Instant::now();
    assert!(coordinator.handle_request(&mut msg, false).await);
    assert!(started.elapsed() < Duration::from_millis(100));

    assert!(events.try_recv().is_err(), "sink must not be touched");
    assert_eq!(coordinator.stats().held, 0);
}

#[tokio::test]
async fn test_out_of_scope_never_held() {
    let (coordinator, _sink, mut events) = channel_coordinator();
    admin_breakpoint(&coordinator);
    let controller = coordinator.controller();
    controller.set_break_on_all_requests(true);
    controller.set_stepping(true);

    let mut msg = HttpMessage::new("GET", "https://example.com/admin").with_scope(false);
    assert!(!coordinator.is_breakpoint(&msg, Direction::Request, true));
    assert!(coordinator.handle_request(&mut msg, true).await);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_admin_breakpoint_continue_and_drop() {
    let (coordinator, _sink, mut events) = channel_coordinator();
    admin_breakpoint(&coordinator);
    let controller = coordinator.controller();

    let msg = HttpMessage::new("GET", "https://example.com/admin");
    assert!(coordinator.is_breakpoint(&msg, Direction::Request, false));

    // Continue
    let task = spawn_intercept(&coordinator, msg.clone(), Direction::Request);
    wait_displayed(&controller, 1).await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!task.is_finished(), "proxy task must stay suspended while displayed");
    assert!(controller.resume());
    let (forward, _) = task.await.unwrap();
    assert!(forward);

    assert_eq!(events.recv().await.unwrap(), BreakEvent::Hit);
    match events.recv().await.unwrap() {
        BreakEvent::Displayed { message, direction } => {
            assert_eq!(message.id, msg.id);
            assert_eq!(direction, Direction::Request);
        }
        other => panic!("unexpected event {:?}", other),
    }

    // Drop
    let task = spawn_intercept(&coordinator, msg, Direction::Request);
    wait_displayed(&controller, 2).await;
    assert!(controller.drop_message());
    let (forward, _) = task.await.unwrap();
    assert!(!forward);

    let stats = coordinator.stats();
    assert_eq!(stats.held, 2);
    assert_eq!(stats.forwarded, 1);
    assert_eq!(stats.dropped, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_continue_releases_only_displayed_message() {
    let (coordinator, _sink, _events) = channel_coordinator();
    admin_breakpoint(&coordinator);
    let controller = coordinator.controller();

    let a = spawn_intercept(&coordinator, HttpMessage::new("GET", "https://a.com/admin"), Direction::Request);
    wait_displayed(&controller, 1).await;

    let b = spawn_intercept(&coordinator, HttpMessage::new("GET", "https://b.com/admin"), Direction::Response);
    wait_for_status(&controller, |s| s.hits == 2).await;

    assert!(controller.resume());
    let (forward_a, msg_a) = a.await.unwrap();
    assert!(forward_a);
    assert_eq!(msg_a.request.url, "https://a.com/admin");

    // B gets its own display episode and stays held
    wait_displayed(&controller, 2).await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!b.is_finished());

    assert!(controller.drop_message());
    let (forward_b, _) = b.await.unwrap();
    assert!(!forward_b);
}

#[tokio::test]
async fn test_stepping_holds_every_message() {
    let (coordinator, _sink, _events) = channel_coordinator();
    let controller = coordinator.controller();
    controller.set_stepping(true);

    let plain = HttpMessage::new("GET", "https://example.com/anything");
    assert!(coordinator.is_breakpoint(&plain, Direction::Request, false));
    assert!(coordinator.is_breakpoint(&plain, Direction::Response, false));

    let task = spawn_intercept(&coordinator, plain.clone(), Direction::Request);
    wait_displayed(&controller, 1).await;
    // Step keeps stepping on
    assert!(controller.step());
    assert!(task.await.unwrap().0);

    let task = spawn_intercept(&coordinator, plain, Direction::Response);
    wait_displayed(&controller, 2).await;
    assert!(controller.resume());
    assert!(task.await.unwrap().0);

    assert!(!controller.modes().stepping);
    let mut msg = HttpMessage::new("GET", "https://example.com/anything");
    assert!(coordinator.handle_request(&mut msg, false).await);
    assert_eq!(coordinator.stats().held, 2);
}

#[tokio::test]
async fn test_step_holds_next_unmatched_message() {
    let (coordinator, _sink, _events) = channel_coordinator();
    admin_breakpoint(&coordinator);
    let controller = coordinator.controller();

    let task = spawn_intercept(&coordinator, HttpMessage::new("GET", "https://x.com/admin"), Direction::Request);
    wait_displayed(&controller, 1).await;
    assert!(controller.step());
    assert!(task.await.unwrap().0);

    let task = spawn_intercept(&coordinator, HttpMessage::new("GET", "https://x.com/public"), Direction::Request);
    wait_displayed(&controller, 2).await;
    assert!(controller.resume());
    assert!(task.await.unwrap().0);
}

#[tokio::test]
async fn test_break_on_all_responses_only() {
    let (coordinator, _sink, _events) = channel_coordinator();
    let controller = coordinator.controller();
    controller.set_break_on_all_responses(true);

    let msg = HttpMessage::new("GET", "https://example.com/").with_response(ResponseData {
        status: 200,
        headers: HashMap::new(),
        body: Vec::new(),
    });
    assert!(!coordinator.is_breakpoint(&msg, Direction::Request, false));
    assert!(coordinator.is_breakpoint(&msg, Direction::Response, false));
}

#[tokio::test]
async fn test_operator_edits_applied() {
    let (coordinator, sink, mut events) = channel_coordinator();
    admin_breakpoint(&coordinator);
    let controller = coordinator.controller();

    let task = spawn_intercept(
        &coordinator,
        HttpMessage::new("POST", "https://example.com/admin").with_body("role=user"),
        Direction::Request,
    );

    let displayed = loop {
        match events.recv().await.unwrap() {
            BreakEvent::Displayed { message, .. } => break message,
            _ => continue,
        }
    };
    let mut edited = displayed.clone();
    edited.request.body = b"role=admin".to_vec();
    sink.submit_edit(Direction::Request, edited);

    assert!(controller.resume());
    let (forward, msg) = task.await.unwrap();
    assert!(forward);
    assert_eq!(msg.id, displayed.id);
    assert_eq!(msg.request.body, b"role=admin");

    // Editing UI is cleared afterwards
    loop {
        match events.recv().await.unwrap() {
            BreakEvent::Cleared { direction } => {
                assert_eq!(direction, Direction::Request);
                break;
            }
            _ => continue,
        }
    }
}

struct Failing;

impl BreakpointPredicate for Failing {
    fn name(&self) -> &str {
        "failing"
    }

    fn matches(&self, _message: &HttpMessage, _scope_only: bool) -> breakpoint_core::Result<bool> {
        Err(BreakpointError::evaluation("failing", "backend unavailable"))
    }
}

struct Panicking;

impl BreakpointPredicate for Panicking {
    fn name(&self) -> &str {
        "panicking"
    }

    fn matches(&self, _message: &HttpMessage, _scope_only: bool) -> breakpoint_core::Result<bool> {
        panic!("script error")
    }
}

#[tokio::test]
async fn test_broken_predicates_fail_open() {
    let (coordinator, _sink, _events) = channel_coordinator();
    coordinator.set_enabled_breakpoints(vec![Arc::new(Failing), Arc::new(Panicking)]);

    let mut msg = HttpMessage::new("GET", "https://example.com/admin");
    assert!(coordinator.handle_request(&mut msg, false).await);
    assert_eq!(coordinator.stats().predicate_failures, 2);
    assert_eq!(coordinator.stats().held, 0);

    // Later predicates are still consulted
    let mut list = BreakpointRegistry::compile(&[BreakpointDefinition::url_contains("admin", "/admin")]).unwrap();
    list.insert(0, Arc::new(Panicking));
    coordinator.set_enabled_breakpoints(list);
    assert!(coordinator.is_breakpoint(&msg, Direction::Request, false));
}

#[tokio::test]
async fn test_shutdown_releases_held_message() {
    let (coordinator, _sink, _events) = channel_coordinator();
    admin_breakpoint(&coordinator);
    let controller = coordinator.controller();

    let task = spawn_intercept(&coordinator, HttpMessage::new("GET", "https://example.com/admin"), Direction::Request);
    wait_displayed(&controller, 1).await;

    coordinator.shutdown();
    assert!(task.await.unwrap().0);

    // Matching traffic passes once shut down
    let mut msg = HttpMessage::new("GET", "https://example.com/admin");
    let forward = timeout(Duration::from_secs(1), coordinator.handle_request(&mut msg, false))
        .await
        .expect("must not hold after shutdown");
    assert!(forward);
}

#[tokio::test]
async fn test_cancelled_waiter_abandons_episode() {
    let (coordinator, _sink, _events) = channel_coordinator();
    admin_breakpoint(&coordinator);
    let controller = coordinator.controller();

    let task = spawn_intercept(&coordinator, HttpMessage::new("GET", "https://example.com/admin"), Direction::Request);
    wait_displayed(&controller, 1).await;
    task.abort();
    let _ = task.await;

    wait_for_status(&controller, |s| s.phase == HoldPhase::Idle).await;

    let next = spawn_intercept(&coordinator, HttpMessage::new("GET", "https://example.com/admin"), Direction::Request);
    wait_displayed(&controller, 2).await;
    assert!(controller.resume());
    assert!(next.await.unwrap().0);
}

struct BrokenDisplay;

impl DisplaySink for BrokenDisplay {
    fn display_message(&self, _message: &HttpMessage, _direction: Direction) -> breakpoint_core::Result<()> {
        panic!("display unavailable")
    }

    fn save_edits(&self, _message: &mut HttpMessage, _direction: Direction) {}

    fn clear_and_disable(&self, _direction: Direction) {}
}

#[tokio::test]
async fn test_display_failure_forwards_unedited() {
    let coordinator = coordinator_with(Arc::new(BrokenDisplay));
    admin_breakpoint(&coordinator);

    let original = HttpMessage::new("GET", "https://example.com/admin");
    let mut msg = original.clone();
    let forward = timeout(Duration::from_secs(2), coordinator.handle_request(&mut msg, false))
        .await
        .expect("UI failure must not hold the proxy");
    assert!(forward);
    assert_eq!(msg, original);
    assert_eq!(coordinator.stats().ui_failures, 1);
    assert!(!coordinator.controller().is_holding());
}

#[tokio::test]
async fn test_undeliverable_display_forwards_instead_of_holding() {
    // Room for the hit notification only
    let (sink, mut events) = ChannelSink::channel(1);
    let coordinator = coordinator_with(Arc::new(sink));
    let controller = coordinator.controller();
    controller.set_break_on_all_requests(true);

    let mut msg = HttpMessage::new("GET", "https://example.com/feed");
    let forward = timeout(Duration::from_secs(2), coordinator.handle_request(&mut msg, false))
        .await
        .expect("an undelivered display must not hold the proxy");
    assert!(forward);
    assert!(!controller.is_holding());
    assert_eq!(coordinator.stats().ui_failures, 1);

    assert_eq!(events.recv().await, Some(BreakEvent::Hit));
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_may_break_without_rules_or_modes() {
    let (coordinator, _sink, _events) = channel_coordinator();
    let controller = coordinator.controller();
    let msg = HttpMessage::new("GET", "https://example.com/stream");

    assert!(!coordinator.may_break(&msg, Direction::Response, false));

    controller.set_break_on_all_responses(true);
    assert!(coordinator.may_break(&msg, Direction::Response, false));
    assert!(!coordinator.may_break(&msg, Direction::Request, false));
    assert!(!coordinator.may_break(&msg.clone().with_scope(false), Direction::Response, true));

    controller.set_break_on_all_responses(false);
    admin_breakpoint(&coordinator);
    assert!(coordinator.may_break(&msg, Direction::Request, false));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_queued_messages_released_one_at_a_time() {
    let (coordinator, _sink, _events) = channel_coordinator();
    admin_breakpoint(&coordinator);
    let controller = coordinator.controller();

    let mut tasks = Vec::new();
    for i in 0..5 {
        let msg = HttpMessage::new("GET", format!("https://example.com/admin/{}", i));
        tasks.push(spawn_intercept(&coordinator, msg, Direction::Request));
    }
    wait_for_status(&controller, |s| s.hits == 5).await;

    for episode in 1..=5u64 {
        wait_displayed(&controller, episode).await;
        let finished = tasks.iter().filter(|t| t.is_finished()).count() as u64;
        assert!(finished < episode, "only released messages may finish");
        if episode % 2 == 0 {
            assert!(controller.drop_message());
        } else {
            assert!(controller.resume());
        }
    }

    let mut dropped = 0;
    for task in tasks {
        if !task.await.unwrap().0 {
            dropped += 1;
        }
    }
    assert_eq!(dropped, 2);
}
