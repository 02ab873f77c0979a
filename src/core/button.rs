//! Physical eject button handling.
//!
//! The input is polled on a short interval and treated as a discrete press:
//! after the line asserts, the handler waits for de-assertion plus a
//! debounce delay before acting. A press with no device connected is a
//! logged no-op.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::device::ReaderSession;

/// Digital input line for the eject control.
pub trait ButtonInput: Send {
    fn is_pressed(&self) -> bool;
}

/// Settle time after release before the press is acted on.
const DEBOUNCE: Duration = Duration::from_millis(50);

pub async fn run(
    input: Box<dyn ButtonInput>,
    reader: Option<ReaderSession>,
    poll_interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        if !input.is_pressed() {
            continue;
        }

        // asserted: wait for release so a held button is one press
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }
            if !input.is_pressed() {
                break;
            }
        }
        tokio::time::sleep(DEBOUNCE).await;

        match &reader {
            Some(reader) if reader.is_present() => {
                info!("eject button pressed");
                if let Err(e) = reader.request_eject().await {
                    warn!(error = %e, "eject request failed");
                }
            }
            _ => debug!("eject button pressed with no device connected"),
        }
    }
}
