//! LED strip rendering of the overall system state.
//!
//! Every other component only ever writes `IndicatorState` through an
//! [`IndicatorHandle`]; the controller task is the single reader. The one
//! exception is `EjectFeedback`, which the controller itself reverts to
//! `Idle` after a fixed number of blink cycles.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Overall system state as shown on the strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorState {
    Init,
    Idle,
    DeviceConnected,
    Transferring,
    Error,
    Provisioning,
    EjectFeedback,
}

/// One RGB pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const OFF: Rgb = Rgb { r: 0, g: 0, b: 0 };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Addressable RGB strip. `set_pixel` stages, `refresh` latches the frame.
pub trait LedStrip: Send {
    fn len(&self) -> usize;
    fn set_pixel(&mut self, index: usize, color: Rgb);
    fn refresh(&mut self);
}

impl<S: LedStrip + ?Sized> LedStrip for Box<S> {
    fn len(&self) -> usize {
        (**self).len()
    }

    fn set_pixel(&mut self, index: usize, color: Rgb) {
        (**self).set_pixel(index, color)
    }

    fn refresh(&mut self) {
        (**self).refresh()
    }
}

/// Cloneable writer/reader for the shared indicator state.
///
/// Backed by a watch channel: writes are last-write-wins with no ordering
/// guarantee across tasks.
#[derive(Clone)]
pub struct IndicatorHandle {
    tx: Arc<watch::Sender<IndicatorState>>,
}

impl IndicatorHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(IndicatorState::Init);
        Self { tx: Arc::new(tx) }
    }

    pub fn set(&self, state: IndicatorState) {
        self.tx.send_replace(state);
    }

    pub fn current(&self) -> IndicatorState {
        *self.tx.borrow()
    }
}

impl Default for IndicatorHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Animation tick.
const TICK: Duration = Duration::from_millis(25);

/// Ticks per half blink of the eject pattern.
const EJECT_BLINK_TICKS: u32 = 4;

/// On/off cycles before `EjectFeedback` reverts to `Idle`.
const EJECT_BLINK_CYCLES: u32 = 3;

/// Renders the shared state onto a strip on a fixed tick.
pub struct IndicatorController<S: LedStrip> {
    strip: S,
    handle: IndicatorHandle,
    tick: Duration,
}

impl<S: LedStrip> IndicatorController<S> {
    pub fn new(strip: S, handle: IndicatorHandle) -> Self {
        Self {
            strip,
            handle,
            tick: TICK,
        }
    }

    /// Override the animation tick, mainly for the simulation profile.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut phase: u32 = 0;
        let mut eject_ticks: u32 = 0;
        let mut last = self.handle.current();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let state = self.handle.current();
            if state != last {
                debug!(?state, "indicator state changed");
                phase = 0;
                eject_ticks = 0;
                last = state;
            }

            match state {
                IndicatorState::Init => self.fill(Rgb::new(32, 32, 32)),
                IndicatorState::Idle => {
                    let level = triangle(phase, 80, 100);
                    self.fill(Rgb::new(0, 0, level));
                }
                IndicatorState::DeviceConnected => self.fill(Rgb::new(0, 128, 0)),
                IndicatorState::Transferring => {
                    let level = triangle(phase, 40, 150);
                    self.fill(Rgb::new(level, level, level));
                }
                IndicatorState::Error => self.fill(Rgb::new(128, 0, 0)),
                IndicatorState::Provisioning => {
                    let level = triangle(phase, 80, 120);
                    self.fill(Rgb::new(level, level / 2, 0));
                }
                IndicatorState::EjectFeedback => {
                    let on = (eject_ticks / EJECT_BLINK_TICKS) % 2 == 0;
                    self.fill(if on { Rgb::new(0, 120, 120) } else { Rgb::OFF });
                    eject_ticks += 1;
                    if eject_ticks >= EJECT_BLINK_TICKS * 2 * EJECT_BLINK_CYCLES {
                        self.handle.set(IndicatorState::Idle);
                    }
                }
            }

            self.strip.refresh();
            phase = phase.wrapping_add(1);
        }

        self.fill(Rgb::OFF);
        self.strip.refresh();
    }

    fn fill(&mut self, color: Rgb) {
        for i in 0..self.strip.len() {
            self.strip.set_pixel(i, color);
        }
    }
}

/// Triangle wave over `period` ticks peaking at `max`.
fn triangle(phase: u32, period: u32, max: u32) -> u8 {
    let pos = phase % period;
    let half = period / 2;
    let level = if pos < half {
        pos * max / half
    } else {
        (period - pos) * max / half
    };
    level.min(255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::SimulatedStrip;
    use std::time::Instant;

    #[test]
    fn triangle_rises_and_falls() {
        assert_eq!(triangle(0, 80, 100), 0);
        assert!(triangle(20, 80, 100) > triangle(5, 80, 100));
        assert!(triangle(60, 80, 100) < triangle(40, 80, 100));
        assert_eq!(triangle(80, 80, 100), 0);
    }

    #[test]
    fn handle_is_last_write_wins() {
        let handle = IndicatorHandle::new();
        assert_eq!(handle.current(), IndicatorState::Init);
        handle.set(IndicatorState::Idle);
        handle.set(IndicatorState::Error);
        assert_eq!(handle.current(), IndicatorState::Error);
    }

    #[tokio::test]
    async fn eject_feedback_reverts_to_idle() {
        let (strip, _probe) = SimulatedStrip::new(4);
        let handle = IndicatorHandle::new();
        let cancel = CancellationToken::new();

        let controller = IndicatorController::new(strip, handle.clone())
            .with_tick(Duration::from_millis(2));
        let task = tokio::spawn(controller.run(cancel.clone()));

        handle.set(IndicatorState::EjectFeedback);

        // the pattern is 3 on/off cycles of 4 ticks each; allow generous slack
        let deadline = Instant::now() + Duration::from_secs(2);
        while handle.current() != IndicatorState::Idle {
            assert!(Instant::now() < deadline, "eject feedback never reverted");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn renders_frames_on_tick() {
        let (strip, probe) = SimulatedStrip::new(4);
        let handle = IndicatorHandle::new();
        handle.set(IndicatorState::DeviceConnected);
        let cancel = CancellationToken::new();

        let controller = IndicatorController::new(strip, handle.clone())
            .with_tick(Duration::from_millis(2));
        let task = tokio::spawn(controller.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        task.await.unwrap();

        assert!(probe.refresh_count() > 0);
    }
}
