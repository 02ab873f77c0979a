//! Reader session state machine, driven through the simulated storage
//! adapter. Attach/detach are asynchronous events, so assertions poll with
//! a deadline after the triggering call.

use std::sync::Arc;
use std::time::{Duration, Instant};

use shelfd::adapters::{SimulatedStorage, StorageController};
use shelfd::core::device::ReaderSession;
use shelfd::core::{
    ConnectionState, DeviceError, IndicatorHandle, IndicatorState, StorageAdapter,
};
use tokio_util::sync::CancellationToken;

struct Harness {
    session: ReaderSession,
    controller: StorageController,
    indicator: IndicatorHandle,
    cancel: CancellationToken,
    _temp: tempfile::TempDir,
}

fn harness() -> Harness {
    let temp = tempfile::tempdir().unwrap();
    let (adapter, controller) = SimulatedStorage::new();
    let adapter: Arc<dyn StorageAdapter> = Arc::new(adapter);

    let indicator = IndicatorHandle::new();
    let cancel = CancellationToken::new();
    let (session, hw_tx) = ReaderSession::spawn(
        Arc::clone(&adapter),
        temp.path().join("reader"),
        indicator.clone(),
        cancel.clone(),
    );
    adapter.start(hw_tx);

    Harness {
        session,
        controller,
        indicator,
        cancel,
        _temp: temp,
    }
}

async fn wait_until(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !check() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn attach_mounts_and_connects() {
    let h = harness();
    assert_eq!(h.session.connection_state(), ConnectionState::Disconnected);

    h.controller.attach_device("reader-1", 512);
    wait_until("device present", || h.session.is_present()).await;

    assert_eq!(h.session.connection_state(), ConnectionState::Connected);
    assert_eq!(h.indicator.current(), IndicatorState::DeviceConnected);
    h.cancel.cancel();
}

#[tokio::test]
async fn duplicate_attach_is_a_noop() {
    let h = harness();

    h.controller.attach_device("reader-1", 512);
    wait_until("device present", || h.session.is_present()).await;

    h.controller.attach_device("reader-1", 512);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(h.session.is_present());
    assert_eq!(h.indicator.current(), IndicatorState::DeviceConnected);
    h.cancel.cancel();
}

#[tokio::test]
async fn detach_disconnects_and_idles() {
    let h = harness();

    h.controller.attach_device("reader-1", 512);
    wait_until("device present", || h.session.is_present()).await;

    h.controller.detach_device();
    wait_until("device absent", || !h.session.is_present()).await;

    assert_eq!(h.session.connection_state(), ConnectionState::Disconnected);
    assert_eq!(h.indicator.current(), IndicatorState::Idle);
    h.cancel.cancel();
}

#[tokio::test]
async fn duplicate_detach_is_a_noop() {
    let h = harness();

    h.controller.detach_device();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(!h.session.is_present());
    h.cancel.cancel();
}

#[tokio::test]
async fn mount_failure_keeps_disconnected_and_flags_error() {
    let h = harness();

    h.controller.fail_next_mount();
    h.controller.attach_device("reader-1", 512);
    wait_until("error indicator", || {
        h.indicator.current() == IndicatorState::Error
    })
    .await;

    assert!(!h.session.is_present());
    assert_eq!(h.session.connection_state(), ConnectionState::Disconnected);

    // a later attach with a healthy mount recovers
    h.controller.detach_device();
    h.controller.attach_device("reader-1", 512);
    wait_until("device present", || h.session.is_present()).await;
    h.cancel.cancel();
}

#[tokio::test]
async fn connection_state_follows_the_last_event() {
    let h = harness();

    h.controller.attach_device("a", 64);
    wait_until("present", || h.session.is_present()).await;
    h.controller.detach_device();
    wait_until("absent", || !h.session.is_present()).await;
    h.controller.attach_device("b", 64);
    wait_until("present again", || h.session.is_present()).await;

    assert_eq!(h.session.connection_state(), ConnectionState::Connected);
    h.cancel.cancel();
}

#[tokio::test]
async fn eject_unmounts_and_blinks_feedback() {
    let h = harness();

    h.controller.attach_device("reader-1", 512);
    wait_until("device present", || h.session.is_present()).await;

    h.session.request_eject().await.expect("eject should succeed");

    assert!(!h.session.is_present());
    assert_eq!(h.indicator.current(), IndicatorState::EjectFeedback);
    h.cancel.cancel();
}

#[tokio::test]
async fn eject_without_device_is_reported() {
    let h = harness();

    let err = h.session.request_eject().await.unwrap_err();
    assert!(matches!(err, DeviceError::NotConnected));
    h.cancel.cancel();
}
