//! Reconnection behavior end to end against the scripted dialer:
//! bounded retries, budget reset on success, cancellation on
//! intentional disconnect.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use jetty::transport::mock::{MockConnection, MockDialer};
use jetty::{Config, ConnectionManager, ConnectionStatus, SyncEvent, Target, topics};

fn manager_with_mock() -> (
    ConnectionManager,
    Arc<MockDialer>,
    mpsc::UnboundedReceiver<MockConnection>,
) {
    let (dialer, connections) = MockDialer::new();
    let dialer = Arc::new(dialer);
    let manager = ConnectionManager::new(Config::default(), dialer.clone());
    (manager, dialer, connections)
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Sleep past one reconnect delay so the pending timer fires and its
/// dial attempt completes.
async fn past_one_delay(manager: &ConnectionManager) {
    tokio::time::sleep(manager.config().reconnect.delay + Duration::from_millis(100)).await;
}

#[tokio::test(start_paused = true)]
async fn abnormal_close_reconnects_after_the_delay() {
    let (manager, _dialer, mut connections) = manager_with_mock();
    manager.connect(Target::workflow("wf-1"));
    let conn = connections.recv().await.expect("initial dial");
    settle().await;
    assert_eq!(manager.status(), ConnectionStatus::Connected);

    conn.close(1006);
    settle().await;
    assert_eq!(manager.status(), ConnectionStatus::Connecting);

    // No eager redial: nothing happens until the delay elapses.
    tokio::time::sleep(manager.config().reconnect.delay - Duration::from_millis(500)).await;
    assert!(connections.try_recv().is_err());

    tokio::time::sleep(Duration::from_millis(600)).await;
    let redial = connections.recv().await.expect("reconnect dial");
    assert_eq!(redial.url.path(), "/ws/workflow/wf-1/");
    settle().await;
    assert_eq!(manager.status(), ConnectionStatus::Connected);
}

#[tokio::test(start_paused = true)]
async fn budget_exhausts_after_consecutive_failures() {
    let (manager, dialer, mut connections) = manager_with_mock();
    let errors = Arc::new(Mutex::new(Vec::new()));
    {
        let errors = errors.clone();
        manager.on(topics::ERROR, move |event| {
            if let SyncEvent::Error { message } = event {
                errors.lock().push(message.clone());
            }
        });
    }

    manager.connect(Target::workflow("wf-1"));
    let conn = connections.recv().await.expect("initial dial");
    settle().await;

    // Every redial from here on is refused.
    dialer.refuse_next(100);
    conn.close(1006);
    settle().await;

    let max = manager.config().reconnect.max_attempts;
    for _ in 0..max {
        past_one_delay(&manager).await;
    }
    settle().await;

    assert_eq!(manager.status(), ConnectionStatus::Error);
    assert!(connections.try_recv().is_err(), "no dial ever succeeded");
    let errors = errors.lock();
    assert_eq!(
        errors
            .iter()
            .filter(|m| m.contains("reconnect attempts exhausted"))
            .count(),
        1
    );
    assert_eq!(
        errors
            .iter()
            .filter(|m| m.contains("connection refused"))
            .count() as u32,
        max
    );
    drop(errors);

    // Terminal: no further timers are pending.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(manager.status(), ConnectionStatus::Error);
    assert!(connections.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn successful_reconnect_resets_the_budget() {
    let (manager, dialer, mut connections) = manager_with_mock();
    manager.connect(Target::workflow("wf-1"));
    let conn = connections.recv().await.expect("initial dial");
    settle().await;

    // Burn all but the last attempt on refused dials, then let the
    // final one through.
    let max = manager.config().reconnect.max_attempts;
    dialer.refuse_next(max - 1);
    conn.close(1006);
    settle().await;
    for _ in 0..max {
        past_one_delay(&manager).await;
    }
    let recovered = connections.recv().await.expect("last attempt connects");
    settle().await;
    assert_eq!(manager.status(), ConnectionStatus::Connected);

    // The next abnormal close gets a fresh budget, so a reconnect is
    // scheduled rather than going straight to Error.
    recovered.close(1006);
    settle().await;
    assert_eq!(manager.status(), ConnectionStatus::Connecting);
    past_one_delay(&manager).await;
    let redial = connections.recv().await.expect("fresh budget redial");
    assert_eq!(redial.url.path(), "/ws/workflow/wf-1/");
}

#[tokio::test(start_paused = true)]
async fn disconnect_cancels_a_pending_reconnect() {
    let (manager, _dialer, mut connections) = manager_with_mock();
    manager.connect(Target::workflow("wf-1"));
    let conn = connections.recv().await.expect("initial dial");
    settle().await;

    conn.close(1006);
    settle().await;
    assert_eq!(manager.status(), ConnectionStatus::Connecting);

    manager.disconnect();
    assert_eq!(manager.status(), ConnectionStatus::Disconnected);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(connections.try_recv().is_err(), "cancelled timer must not dial");
    assert_eq!(manager.status(), ConnectionStatus::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn connect_after_exhaustion_starts_over() {
    let (manager, dialer, mut connections) = manager_with_mock();
    manager.connect(Target::workflow("wf-1"));
    let conn = connections.recv().await.expect("initial dial");
    settle().await;

    let max = manager.config().reconnect.max_attempts;
    dialer.refuse_next(100);
    conn.close(1006);
    settle().await;
    for _ in 0..max {
        past_one_delay(&manager).await;
    }
    settle().await;
    assert_eq!(manager.status(), ConnectionStatus::Error);

    // An explicit connect clears the error state and dials again.
    dialer.refuse_next(0);
    manager.connect(Target::workflow("wf-1"));
    let redial = connections.recv().await.expect("explicit reconnect");
    assert_eq!(redial.url.path(), "/ws/workflow/wf-1/");
    settle().await;
    assert_eq!(manager.status(), ConnectionStatus::Connected);
}
