//! Collaborator-facing media traits.
//!
//! Cameras, microphones and network streams are opened by whatever platform
//! layer embeds the engine. Opening may finish later on another thread, so
//! each request returns an [`Acquisition`] that either carries the result
//! right away or a [`PendingAcquisition`] the channel polls once per tick.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;

use crate::error::AcquireError;

/// One RGBA8 frame with rows ordered top to bottom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl VideoFrame {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn is_well_formed(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.pixels.len() == self.width as usize * self.height as usize * 4
    }
}

/// A decoded video or camera feed.
pub trait FrameSource: Send {
    /// The current frame, only when it changed since the previous poll.
    fn poll_frame(&mut self, now: Instant) -> Option<VideoFrame>;

    fn stop(&mut self) {}
}

/// Live audio input.
pub trait AudioCapture: Send {
    fn sample_rate(&self) -> u32;

    /// Mono samples captured since the previous call.
    fn drain_samples(&mut self) -> Vec<f32>;

    fn stop(&mut self) {}
}

/// Keeps a network stream alive; frames arrive through a [`StreamFeed`].
pub trait StreamConnection: Send {
    fn close(&mut self);
}

/// Platform services that open live inputs.
pub trait MediaDevices {
    fn open_camera(&mut self, device: Option<&str>) -> Acquisition<Box<dyn FrameSource>>;

    fn open_microphone(&mut self) -> Acquisition<Box<dyn AudioCapture>>;

    fn connect_stream(
        &mut self,
        source: &str,
        feed: StreamFeed,
    ) -> Acquisition<Box<dyn StreamConnection>>;
}

/// Default devices for hosts without live inputs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMediaDevices;

impl MediaDevices for NoMediaDevices {
    fn open_camera(&mut self, _device: Option<&str>) -> Acquisition<Box<dyn FrameSource>> {
        Acquisition::Ready(Err(AcquireError::DeviceUnavailable(
            "no camera support in this host".into(),
        )))
    }

    fn open_microphone(&mut self) -> Acquisition<Box<dyn AudioCapture>> {
        Acquisition::Ready(Err(AcquireError::DeviceUnavailable(
            "no microphone support in this host".into(),
        )))
    }

    fn connect_stream(
        &mut self,
        source: &str,
        _feed: StreamFeed,
    ) -> Acquisition<Box<dyn StreamConnection>> {
        Acquisition::Ready(Err(AcquireError::DeviceUnavailable(format!(
            "cannot connect to '{source}': no stream support in this host"
        ))))
    }
}

pub type AcquireResult<T> = Result<T, AcquireError>;

/// Outcome of asking [`MediaDevices`] for a resource.
pub enum Acquisition<T> {
    Ready(AcquireResult<T>),
    Pending(PendingAcquisition<T>),
}

impl<T> Acquisition<T> {
    /// A pending acquisition and the handle that completes it.
    pub fn pending() -> (Self, Completer<T>) {
        let shared = Arc::new(Mutex::new(Handoff::Waiting));
        (
            Acquisition::Pending(PendingAcquisition {
                shared: Arc::clone(&shared),
            }),
            Completer { shared },
        )
    }
}

/// Hand-off point between a [`Completer`] and its [`PendingAcquisition`].
/// Every transition happens under one lock so a result is either delivered
/// or handed back, never dropped in between.
enum Handoff<T> {
    Waiting,
    Delivered(AcquireResult<T>),
    Abandoned,
    Cancelled,
}

/// Receiving side of an in-flight acquisition.
pub struct PendingAcquisition<T> {
    shared: Arc<Mutex<Handoff<T>>>,
}

impl<T> PendingAcquisition<T> {
    /// `None` while still in flight.
    pub fn poll(&self) -> Option<AcquireResult<T>> {
        let mut state = lock(&self.shared);
        match std::mem::replace(&mut *state, Handoff::Waiting) {
            Handoff::Delivered(result) => Some(result),
            Handoff::Abandoned => Some(Err(AcquireError::DeviceUnavailable(
                "acquisition abandoned before completing".into(),
            ))),
            Handoff::Waiting | Handoff::Cancelled => None,
        }
    }

    /// Gives up on the acquisition. A result that already arrived is returned
    /// so the caller can release it; later completions are handed back.
    pub fn cancel(self) -> Option<T> {
        let mut state = lock(&self.shared);
        match std::mem::replace(&mut *state, Handoff::Cancelled) {
            Handoff::Delivered(Ok(resource)) => Some(resource),
            _ => None,
        }
    }
}

/// Completes an acquisition from any thread.
pub struct Completer<T> {
    shared: Arc<Mutex<Handoff<T>>>,
}

impl<T> Completer<T> {
    /// Delivers the result. When the channel moved on in the meantime the
    /// result is handed back and the caller keeps ownership of the resource.
    pub fn complete(self, result: AcquireResult<T>) -> Result<(), AcquireResult<T>> {
        let mut state = lock(&self.shared);
        match *state {
            Handoff::Waiting => {
                *state = Handoff::Delivered(result);
                Ok(())
            }
            _ => Err(result),
        }
    }
}

impl<T> Drop for Completer<T> {
    fn drop(&mut self) {
        let mut state = lock(&self.shared);
        if matches!(*state, Handoff::Waiting) {
            *state = Handoff::Abandoned;
        }
    }
}

/// Push side of a network stream channel, cloneable across threads.
///
/// Only the newest frame is kept; a push overwrites any frame the channel has
/// not picked up yet.
#[derive(Debug, Clone)]
pub struct StreamFeed {
    latest: Weak<Mutex<Option<VideoFrame>>>,
}

impl StreamFeed {
    pub(crate) fn channel() -> (Self, LatestFrame) {
        let latest = LatestFrame::default();
        (
            Self {
                latest: Arc::downgrade(&latest.slot),
            },
            latest,
        )
    }

    /// Replaces the queued frame; returns false once the channel was torn down.
    pub fn push(&self, width: u32, height: u32, pixels: Vec<u8>) -> bool {
        match self.latest.upgrade() {
            Some(slot) => {
                *lock(&slot) = Some(VideoFrame::new(width, height, pixels));
                true
            }
            None => false,
        }
    }
}

/// Receiving side of a [`StreamFeed`], owned by the channel.
#[derive(Debug, Default)]
pub(crate) struct LatestFrame {
    slot: Arc<Mutex<Option<VideoFrame>>>,
}

impl LatestFrame {
    pub(crate) fn take(&self) -> Option<VideoFrame> {
        lock(&self.slot).take()
    }

    #[cfg(test)]
    pub(crate) fn is_queued(&self) -> bool {
        lock(&self.slot).is_some()
    }
}

// A panic on the other side leaves the data intact.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_acquisition_delivers_once_completed() {
        let (acquisition, completer) = Acquisition::<u32>::pending();
        let Acquisition::Pending(pending) = acquisition else {
            panic!("expected pending");
        };
        assert!(pending.poll().is_none());
        completer.complete(Ok(7)).unwrap();
        assert_eq!(pending.poll().unwrap().unwrap(), 7);
    }

    #[test]
    fn completion_after_cancel_is_handed_back() {
        let (acquisition, completer) = Acquisition::<u32>::pending();
        let Acquisition::Pending(pending) = acquisition else {
            panic!("expected pending");
        };
        assert!(pending.cancel().is_none());
        assert_eq!(completer.complete(Ok(3)), Err(Ok(3)));
    }

    #[test]
    fn cancel_returns_results_that_already_arrived() {
        let (acquisition, completer) = Acquisition::<u32>::pending();
        let Acquisition::Pending(pending) = acquisition else {
            panic!("expected pending");
        };
        completer.complete(Ok(9)).unwrap();
        assert_eq!(pending.cancel(), Some(9));
    }

    #[test]
    fn dropped_completer_fails_the_acquisition() {
        let (acquisition, completer) = Acquisition::<u32>::pending();
        let Acquisition::Pending(pending) = acquisition else {
            panic!("expected pending");
        };
        drop(completer);
        assert!(matches!(
            pending.poll(),
            Some(Err(AcquireError::DeviceUnavailable(_)))
        ));
    }

    #[test]
    fn completion_racing_a_cancel_is_never_lost() {
        for _ in 0..200 {
            let (acquisition, completer) = Acquisition::<u32>::pending();
            let Acquisition::Pending(pending) = acquisition else {
                panic!("expected pending");
            };
            let worker = std::thread::spawn(move || completer.complete(Ok(5)));
            let cancelled = pending.cancel();
            let completed = worker.join().unwrap();
            match (cancelled, completed) {
                (Some(5), Ok(())) | (None, Err(Ok(5))) => {}
                other => panic!("resource lost or duplicated: {other:?}"),
            }
        }
    }

    #[test]
    fn feed_reports_closed_channels() {
        let (feed, latest) = StreamFeed::channel();
        assert!(feed.push(1, 1, vec![0; 4]));
        drop(latest);
        assert!(!feed.push(1, 1, vec![0; 4]));
    }

    #[test]
    fn feed_keeps_only_the_newest_frame() {
        let (feed, latest) = StreamFeed::channel();
        for value in 0..500u32 {
            assert!(feed.push(64, 64, vec![(value % 251) as u8; 64 * 64 * 4]));
        }
        assert!(latest.is_queued());
        let frame = latest.take().expect("newest frame");
        assert_eq!(frame.pixels[0], (499 % 251) as u8);
        assert!(latest.take().is_none());
    }
}
