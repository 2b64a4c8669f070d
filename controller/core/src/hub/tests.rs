use super::*;
use tokio::time;
use tokio_test::{assert_pending, assert_ready, task};

fn snapshot(version: &str) -> Snapshot {
    Snapshot {
        version: version.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn late_joiner_receives_current_snapshot() {
    let hub = Hub::shared();
    for v in ["v1", "v2", "v3"] {
        assert!(hub.publish(snapshot(v)));
    }

    let mut sub = hub.subscribe();
    assert_eq!(sub.current().version, "v3");

    // Nothing is pending until the next publish.
    let mut next = task::spawn(sub.next());
    assert_pending!(next.poll());
    drop(next);

    hub.publish(snapshot("v4"));
    let delivered = sub.next().await.expect("subscriber must be registered");
    assert_eq!(delivered.version, "v4");
}

#[tokio::test]
async fn subscribing_before_any_publish_yields_empty_snapshot() {
    let hub = Hub::shared();
    let sub = hub.subscribe();
    assert!(sub.current().is_empty());
}

#[tokio::test]
async fn unchanged_version_is_not_delivered() {
    let hub = Hub::shared();
    assert!(hub.publish(snapshot("v1")));

    let mut sub = hub.subscribe();
    assert!(!hub.publish(snapshot("v1")));
    assert_eq!(hub.publish_count(), 1);

    let mut next = task::spawn(sub.next());
    assert_pending!(next.poll());
}

#[tokio::test]
async fn stalled_subscriber_does_not_block_others() {
    let hub = Hub::shared();
    let _stalled = hub.subscribe();
    let mut active = hub.subscribe();

    for i in 0..100 {
        // Each publish completes immediately even though one subscriber never reads.
        assert!(hub.publish(snapshot(&format!("v{i}"))));
        let delivered = time::timeout(time::Duration::from_secs(1), active.next())
            .await
            .expect("delivery must not be blocked")
            .expect("subscriber must be registered");
        assert_eq!(delivered.version, format!("v{i}"));
    }
}

#[tokio::test]
async fn slow_subscriber_converges_on_latest() {
    let hub = Hub::shared();
    let mut sub = hub.subscribe();

    hub.publish(snapshot("v1"));
    hub.publish(snapshot("v2"));
    hub.publish(snapshot("v3"));

    let delivered = sub.next().await.expect("subscriber must be registered");
    assert_eq!(delivered.version, "v3");

    let mut next = task::spawn(sub.next());
    assert_pending!(next.poll());
}

#[tokio::test]
async fn dropping_subscription_unregisters() {
    let hub = Hub::shared();
    let a = hub.subscribe();
    let b = hub.subscribe();
    assert_ne!(a.id(), b.id());
    assert_eq!(hub.subscriber_count(), 2);

    drop(a);
    assert_eq!(hub.subscriber_count(), 1);
    drop(b);
    assert_eq!(hub.subscriber_count(), 0);

    // Publishing with no subscribers still updates the current snapshot.
    assert!(hub.publish(snapshot("v1")));
    assert_eq!(hub.current().version, "v1");
}

#[tokio::test]
async fn unsubscribed_receiver_ends() {
    let hub = Hub::shared();
    let mut sub = hub.subscribe();
    hub.unsubscribe(sub.id());

    let mut next = task::spawn(sub.next());
    assert!(assert_ready!(next.poll()).is_none());
}
