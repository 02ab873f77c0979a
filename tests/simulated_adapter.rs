use std::time::Duration;

use shelfd::adapters::SimulatedStorage;
use shelfd::core::{HardwareEvent, StorageAdapter};
use tokio::sync::mpsc;
use tokio::time::timeout;

#[tokio::test]
async fn attach_event_is_delivered() {
    let (adapter, controller) = SimulatedStorage::new();
    let (tx, mut rx) = mpsc::channel(32);

    adapter.start(tx);
    controller.attach_device("reader-1", 512);

    let event = timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timeout waiting for event")
        .expect("channel closed");

    match event {
        HardwareEvent::DeviceAttached(device) => {
            assert_eq!(device.id, "reader-1");
            assert_eq!(device.capacity, 512 * 1024 * 1024);
            assert!(device.label.contains("reader-1"));
        }
        _ => panic!("expected DeviceAttached event"),
    }
}

#[tokio::test]
async fn detach_event_is_delivered() {
    let (adapter, controller) = SimulatedStorage::new();
    let (tx, mut rx) = mpsc::channel(32);

    adapter.start(tx);
    controller.detach_device();

    let event = timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timeout waiting for event")
        .expect("channel closed");

    assert!(matches!(event, HardwareEvent::DeviceDetached));
}

#[tokio::test]
async fn events_arrive_in_order() {
    let (adapter, controller) = SimulatedStorage::new();
    let (tx, mut rx) = mpsc::channel(32);

    adapter.start(tx);
    controller.attach_device("a", 64);
    controller.detach_device();
    controller.attach_device("b", 64);

    let mut events = Vec::new();
    for _ in 0..3 {
        let event = timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timeout")
            .expect("channel closed");
        events.push(event);
    }

    assert!(matches!(events[0], HardwareEvent::DeviceAttached(_)));
    assert!(matches!(events[1], HardwareEvent::DeviceDetached));
    assert!(matches!(events[2], HardwareEvent::DeviceAttached(_)));
}

#[tokio::test]
async fn forced_mount_failure_applies_once() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path().join("reader");

    let (adapter, controller) = SimulatedStorage::new();
    let device = {
        let (tx, mut rx) = mpsc::channel(32);
        adapter.start(tx);
        controller.attach_device("reader-1", 512);
        match timeout(Duration::from_secs(1), rx.recv()).await {
            Ok(Some(HardwareEvent::DeviceAttached(device))) => device,
            other => panic!("expected attach event, got {other:?}"),
        }
    };

    controller.fail_next_mount();
    assert!(adapter.mount(&device, &root).is_err());
    // the failure is one-shot
    assert!(adapter.mount(&device, &root).is_ok());
    assert!(root.exists());
}
