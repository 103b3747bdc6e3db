//! Single-slot frame store shared by the detection worker and HTTP viewers
//!
//! The store holds at most one annotated frame. Every publish replaces the
//! previous frame (last-write-wins); nothing is queued, so a slow viewer simply
//! picks up whatever is freshest on its next turn. Frames are kept behind
//! `Arc` so readers share the JPEG bytes instead of copying them, and the
//! lock only guards a pointer swap.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::detection::Detection;

/// Encoded frame ready for transmission
#[derive(Debug, Clone)]
pub struct AnnotatedFrame {
    /// Assigned by [`FrameStore::publish`], strictly increasing, starts at 1
    pub sequence: u64,
    /// Capture time of the source frame
    pub captured_at: SystemTime,
    /// JPEG bytes
    pub jpeg: Bytes,
    /// FPS estimate at the time the frame was produced
    pub fps: f32,
    /// Detections drawn onto this frame
    pub detections: Vec<Detection>,
}

impl AnnotatedFrame {
    pub fn new(jpeg: Bytes, captured_at: SystemTime) -> Self {
        Self {
            sequence: 0,
            captured_at,
            jpeg,
            fps: 0.0,
            detections: Vec::new(),
        }
    }

    pub fn with_fps(mut self, fps: f32) -> Self {
        self.fps = fps;
        self
    }

    pub fn with_detections(mut self, detections: Vec<Detection>) -> Self {
        self.detections = detections;
        self
    }
}

/// Last-write-wins frame slot
pub struct FrameStore {
    slot: Mutex<Option<Arc<AnnotatedFrame>>>,
    published: watch::Sender<u64>,
    closed: AtomicBool,
}

impl FrameStore {
    /// Create an empty store
    pub fn new() -> Self {
        let (published, _rx) = watch::channel(0);

        Self {
            slot: Mutex::new(None),
            published,
            closed: AtomicBool::new(false),
        }
    }

    /// Replace the held frame and wake every waiting subscriber
    ///
    /// Returns the sequence number assigned to the frame. The previous frame
    /// becomes unreachable for future readers.
    pub fn publish(&self, frame: AnnotatedFrame) -> u64 {
        let mut frame = frame;
        let sequence = {
            let mut slot = self.slot.lock();
            let sequence = slot.as_ref().map_or(1, |current| current.sequence + 1);
            frame.sequence = sequence;
            *slot = Some(Arc::new(frame));
            sequence
        };

        self.published.send_replace(sequence);
        debug!(sequence, "Frame published");

        sequence
    }

    /// Snapshot of the current frame, `None` until the first publish
    pub fn get(&self) -> Option<Arc<AnnotatedFrame>> {
        self.slot.lock().clone()
    }

    /// Subscribe to publish notifications
    ///
    /// The subscriber starts with nothing seen, so its first `next()` returns
    /// the current frame immediately if one exists.
    pub fn subscribe(self: &Arc<Self>) -> FrameSubscriber {
        FrameSubscriber {
            store: Arc::clone(self),
            notify: self.published.subscribe(),
            last_seen: 0,
        }
    }

    /// Number of frames published so far
    pub fn published_count(&self) -> u64 {
        *self.published.borrow()
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.published.receiver_count()
    }

    /// End every subscriber stream
    ///
    /// The held frame stays readable through [`FrameStore::get`].
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!(
                subscribers = self.subscriber_count(),
                "Frame store closed"
            );
            self.published.send_modify(|_| {});
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Default for FrameStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-viewer cursor into a [`FrameStore`]
///
/// Only remembers the last sequence handed out. A subscriber that sleeps
/// through several publishes wakes up to the newest frame only.
pub struct FrameSubscriber {
    store: Arc<FrameStore>,
    notify: watch::Receiver<u64>,
    last_seen: u64,
}

impl FrameSubscriber {
    /// Wait for a frame newer than the last one returned
    ///
    /// Returns `None` once the store is closed.
    pub async fn next(&mut self) -> Option<Arc<AnnotatedFrame>> {
        loop {
            // Mark the notification seen before reading the slot so a publish
            // racing with the read still wakes `changed()` below.
            let _ = self.notify.borrow_and_update();

            if self.store.is_closed() {
                return None;
            }

            if let Some(frame) = self.store.get() {
                if frame.sequence > self.last_seen {
                    self.last_seen = frame.sequence;
                    return Some(frame);
                }
            }

            if self.notify.changed().await.is_err() {
                return None;
            }
        }
    }

    /// Sequence of the last frame returned, 0 before the first
    pub fn last_seen(&self) -> u64 {
        self.last_seen
    }
}
